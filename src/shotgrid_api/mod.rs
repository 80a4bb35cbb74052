mod records;
mod rest;

#[cfg(test)]
pub mod fake;

#[cfg(test)]
mod test_server;

use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub use self::records::*;
pub use self::rest::RestClient;

/// The entity tables this tool touches. The REST API addresses these by their
/// plural lowercase name, while links and filters use the CamelCase type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Project,
    Asset,
    Version,
}

impl EntityType {
    pub fn type_name(self) -> &'static str {
        match self {
            EntityType::Project => "Project",
            EntityType::Asset => "Asset",
            EntityType::Version => "Version",
        }
    }

    pub fn api_name(self) -> &'static str {
        match self {
            EntityType::Project => "projects",
            EntityType::Asset => "assets",
            EntityType::Version => "versions",
        }
    }

    /// A `{"type": ..., "id": ...}` link, as used in filters and in the
    /// field map of a created entity.
    pub fn link(self, id: u64) -> Value {
        serde_json::json!({ "type": self.type_name(), "id": id })
    }
}

/// A single `[field, "is", value]` predicate. Serializes to a three element
/// JSON array, which is the shape the array-filter search endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter(pub String, pub &'static str, pub Value);

impl Filter {
    pub fn is(field: &str, value: impl Into<Value>) -> Self {
        Filter(field.to_owned(), "is", value.into())
    }
}

#[derive(Clone, Debug)]
pub struct ShotgridCredentials {
    pub server_url: String,
    pub script_name: String,
    pub api_key: Option<SecretString>,
}

#[async_trait]
pub trait ShotgridApiClient: Send + Sync {
    /// Every record of `entity` matching all of `filters`, with `fields`
    /// populated in each record's attributes.
    async fn find(
        &self,
        entity: EntityType,
        filters: &[Filter],
        fields: &[&str],
    ) -> Result<Vec<RawEntity>, ShotgridApiError>;

    async fn find_one(
        &self,
        entity: EntityType,
        filters: &[Filter],
        fields: &[&str],
    ) -> Result<Option<RawEntity>, ShotgridApiError> {
        Ok(self.find(entity, filters, fields).await?.into_iter().next())
    }

    async fn create(
        &self,
        entity: EntityType,
        data: Map<String, Value>,
    ) -> Result<RawEntity, ShotgridApiError>;

    /// Upload the file at `path` into the file/image field `field` of an
    /// existing record.
    async fn upload(
        &self,
        entity: EntityType,
        id: u64,
        path: &Path,
        field: &str,
    ) -> Result<(), ShotgridApiError>;

    /// Stream the attachment at `url` into `destination`, returning the number
    /// of bytes written.
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, ShotgridApiError>;
}

#[derive(Debug, Error)]
pub enum ShotgridApiError {
    #[error("ShotGrid API HTTP error")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("ShotGrid API error: {message}")]
    ApiError { message: String },

    #[error("ShotGrid API returned success, but had malformed JSON response: {body}")]
    BadResponseJson {
        body: String,
        source: serde_json::Error,
    },

    #[error("ShotGrid API returned HTTP {status} with body: {body}")]
    ResponseError { status: StatusCode, body: String },

    #[error("No ShotGrid script key was given; pass --api-key or set SHOTGRID_API_KEY")]
    MissingAuth,

    #[error("Access token response did not contain an access_token")]
    MissingAccessToken,

    #[error("ShotGrid returned a malformed {entity} record: {reason}")]
    MalformedResponse { entity: String, reason: String },

    #[error("Invalid ShotGrid server URL: {0}")]
    InvalidServerUrl(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub async fn get_client(
    credentials: ShotgridCredentials,
) -> Result<Box<dyn ShotgridApiClient>, ShotgridApiError> {
    if credentials.api_key.is_none() {
        return Err(ShotgridApiError::MissingAuth);
    }

    Ok(Box::new(RestClient::connect(credentials).await?))
}
