//! An in-memory stand-in for a ShotGrid site, used by tests to drive the
//! workflows without a network.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use fs_err as fs;
use reqwest::StatusCode;
use serde_json::{Map, Value};

use super::{EntityType, Filter, RawEntity, ShotgridApiClient, ShotgridApiError};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Find(EntityType),
    Create(EntityType),
    Upload {
        entity: EntityType,
        id: u64,
        path: PathBuf,
        field: String,
    },
    Download(String),
}

#[derive(Default)]
struct State {
    next_id: u64,
    records: HashMap<EntityType, Vec<RawEntity>>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeShotgrid {
    state: Mutex<State>,

    /// Creating this kind of entity fails with an API error.
    pub reject_create: Option<EntityType>,

    /// Uploads succeed but leave the field unset, like a site whose
    /// thumbnails are still processing.
    pub upload_leaves_field_empty: bool,

    /// Listing the versions linked to this asset fails with a 503.
    pub versions_unavailable_for: Option<u64>,
}

impl FakeShotgrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(name: &str) -> (Self, u64) {
        let fake = Self::new();
        let id = fake.insert(EntityType::Project, serde_json::json!({ "name": name }));
        (fake, id)
    }

    /// Seed a record directly, bypassing the call log.
    pub fn insert(&self, entity: EntityType, attributes: Value) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;

        let attributes = match attributes {
            Value::Object(map) => map,
            other => panic!("attributes must be an object, got {}", other),
        };

        state.records.entry(entity).or_default().push(RawEntity {
            id,
            entity_type: entity.type_name().to_owned(),
            attributes,
        });

        id
    }

    pub fn records(&self, entity: EntityType) -> Vec<RawEntity> {
        let state = self.state.lock().unwrap();
        state.records.get(&entity).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn create_count(&self, entity: EntityType) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::Create(entity))
            .count()
    }
}

fn matches(record: &RawEntity, filter: &Filter) -> bool {
    let Filter(field, relation, value) = filter;
    assert_eq!(*relation, "is", "fake only understands 'is'");

    if field == "id" {
        return value.as_u64() == Some(record.id);
    }

    record.attributes.get(field) == Some(value)
}

#[async_trait]
impl ShotgridApiClient for FakeShotgrid {
    async fn find(
        &self,
        entity: EntityType,
        filters: &[Filter],
        _fields: &[&str],
    ) -> Result<Vec<RawEntity>, ShotgridApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Find(entity));

        if let Some(asset_id) = self.versions_unavailable_for {
            let unavailable = EntityType::Asset.link(asset_id);
            let lists_unavailable_versions = entity == EntityType::Version
                && filters
                    .iter()
                    .any(|Filter(field, _, value)| field == "entity" && *value == unavailable);

            if lists_unavailable_versions {
                return Err(ShotgridApiError::ResponseError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "try again later".to_owned(),
                });
            }
        }

        Ok(state
            .records
            .get(&entity)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| filters.iter().all(|filter| matches(record, filter)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(
        &self,
        entity: EntityType,
        data: Map<String, Value>,
    ) -> Result<RawEntity, ShotgridApiError> {
        self.state.lock().unwrap().calls.push(Call::Create(entity));

        if self.reject_create == Some(entity) {
            return Err(ShotgridApiError::ApiError {
                message: format!("{} validation failed", entity.type_name()),
            });
        }

        let id = self.insert(entity, Value::Object(data));
        let records = self.records(entity);
        Ok(records
            .into_iter()
            .find(|record| record.id == id)
            .expect("inserted record"))
    }

    async fn upload(
        &self,
        entity: EntityType,
        id: u64,
        path: &Path,
        field: &str,
    ) -> Result<(), ShotgridApiError> {
        let contents = fs::read(path)?;

        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Upload {
            entity,
            id,
            path: path.to_owned(),
            field: field.to_owned(),
        });

        if self.upload_leaves_field_empty {
            return Ok(());
        }

        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        let record = state
            .records
            .get_mut(&entity)
            .and_then(|records| records.iter_mut().find(|record| record.id == id))
            .ok_or_else(|| ShotgridApiError::ResponseError {
                status: StatusCode::NOT_FOUND,
                body: format!("no {} #{}", entity.type_name(), id),
            })?;

        record.attributes.insert(
            field.to_owned(),
            Value::String(format!(
                "https://fake.shotgrid.test/files/{}/{}?bytes={}",
                id,
                file_name,
                contents.len()
            )),
        );

        Ok(())
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, ShotgridApiError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Download(url.to_owned()));

        if url.contains("missing") {
            return Err(ShotgridApiError::ResponseError {
                status: StatusCode::NOT_FOUND,
                body: "Not Found".to_owned(),
            });
        }

        fs::write(destination, url.as_bytes())?;
        Ok(url.len() as u64)
    }
}

/// Lets a test keep a handle on the fake after boxing it into a context.
#[async_trait]
impl ShotgridApiClient for Arc<FakeShotgrid> {
    async fn find(
        &self,
        entity: EntityType,
        filters: &[Filter],
        fields: &[&str],
    ) -> Result<Vec<RawEntity>, ShotgridApiError> {
        (**self).find(entity, filters, fields).await
    }

    async fn create(
        &self,
        entity: EntityType,
        data: Map<String, Value>,
    ) -> Result<RawEntity, ShotgridApiError> {
        (**self).create(entity, data).await
    }

    async fn upload(
        &self,
        entity: EntityType,
        id: u64,
        path: &Path,
        field: &str,
    ) -> Result<(), ShotgridApiError> {
        (**self).upload(entity, id, path, field).await
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, ShotgridApiError> {
        (**self).download(url, destination).await
    }
}
