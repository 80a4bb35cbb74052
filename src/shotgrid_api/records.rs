//! Typed views over the loosely shaped records the REST API returns.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{EntityType, ShotgridApiError};

/// A record as the REST API returns it, before any fields are validated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEntity {
    pub id: u64,

    #[serde(rename = "type", default)]
    pub entity_type: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl RawEntity {
    /// Records without a `type` are accepted; anything else must name the
    /// table that was asked for.
    fn expect_type(&self, entity: EntityType) -> Result<(), ShotgridApiError> {
        if self.entity_type.is_empty() || self.entity_type == entity.type_name() {
            Ok(())
        } else {
            Err(ShotgridApiError::MalformedResponse {
                entity: entity.type_name().to_owned(),
                reason: format!("#{} is a {} record", self.id, self.entity_type),
            })
        }
    }

    fn required_str(&self, entity: EntityType, field: &str) -> Result<String, ShotgridApiError> {
        match self.attributes.get(field) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(other) => Err(ShotgridApiError::MalformedResponse {
                entity: entity.type_name().to_owned(),
                reason: format!("field '{}' of #{} is not a string: {}", field, self.id, other),
            }),
            None => Err(ShotgridApiError::MalformedResponse {
                entity: entity.type_name().to_owned(),
                reason: format!("field '{}' of #{} is missing", field, self.id),
            }),
        }
    }

    fn optional_str(&self, field: &str) -> Option<String> {
        self.attributes
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    fn attachment(&self, field: &str) -> Option<AttachmentRef> {
        self.attributes.get(field).and_then(AttachmentRef::from_value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: u64,
}

impl From<RawEntity> for Project {
    fn from(raw: RawEntity) -> Self {
        Project { id: raw.id }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: u64,
    pub code: String,

    /// Stored in `sg_asset_type`. Records created outside this tool may leave
    /// it empty.
    pub asset_type: Option<String>,
}

impl Asset {
    pub const FIELDS: &'static [&'static str] = &["code", "sg_asset_type"];
}

impl TryFrom<RawEntity> for Asset {
    type Error = ShotgridApiError;

    fn try_from(raw: RawEntity) -> Result<Self, Self::Error> {
        raw.expect_type(EntityType::Asset)?;

        Ok(Asset {
            id: raw.id,
            code: raw.required_str(EntityType::Asset, "code")?,
            asset_type: raw.optional_str("sg_asset_type"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub id: u64,
    pub code: String,
    pub image: Option<AttachmentRef>,
    pub uploaded_movie: Option<AttachmentRef>,
}

impl Version {
    pub const FIELDS: &'static [&'static str] = &["code", "image", "sg_uploaded_movie"];

    /// The attachment worth downloading: the image if there is one, otherwise
    /// the uploaded movie.
    pub fn preferred_attachment(&self) -> Option<&AttachmentRef> {
        self.image.as_ref().or(self.uploaded_movie.as_ref())
    }
}

impl TryFrom<RawEntity> for Version {
    type Error = ShotgridApiError;

    fn try_from(raw: RawEntity) -> Result<Self, Self::Error> {
        raw.expect_type(EntityType::Version)?;

        Ok(Version {
            id: raw.id,
            code: raw.required_str(EntityType::Version, "code")?,
            image: raw.attachment("image"),
            uploaded_movie: raw.attachment("sg_uploaded_movie"),
        })
    }
}

/// Where the bytes of a file or image field live. The REST API renders image
/// fields as a bare URL and file fields as an object carrying `url` among
/// other metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentRef {
    Url(String),
    File(Map<String, Value>),
    Unrecognized(Value),
}

impl AttachmentRef {
    /// `None` for null or empty values, which the API uses for unset fields.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(url) if url.is_empty() => None,
            Value::String(url) => Some(AttachmentRef::Url(url.clone())),
            Value::Object(map) if map.is_empty() => None,
            Value::Object(map) => Some(AttachmentRef::File(map.clone())),
            other => Some(AttachmentRef::Unrecognized(other.clone())),
        }
    }

    pub fn url(&self) -> Option<&str> {
        let url = match self {
            AttachmentRef::Url(url) => url.as_str(),
            AttachmentRef::File(map) => map.get("url")?.as_str()?,
            AttachmentRef::Unrecognized(_) => return None,
        };

        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }
}
