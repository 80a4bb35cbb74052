use log::{info, warn};
use serde_json::{Map, Value};

use crate::{
    context::ProjectContext,
    error::WorkflowError,
    shotgrid_api::{Asset, EntityType, Filter},
};

pub const DEFAULT_ASSET_TYPE: &str = "Prop";

/// Find the asset named `code` in the context's project, creating it with
/// `asset_type` if there isn't one yet.
///
/// An existing asset is never modified, so `asset_type` only matters for a
/// freshly created asset. Two concurrent callers may both miss the lookup and
/// both create; the API offers no atomic upsert.
pub async fn resolve_or_create_asset(
    context: &ProjectContext,
    code: &str,
    asset_type: &str,
) -> Result<Asset, WorkflowError> {
    if code.is_empty() {
        return Err(WorkflowError::InvalidArgument(
            "asset name must not be empty".to_owned(),
        ));
    }

    let existing = context
        .client
        .find_one(
            EntityType::Asset,
            &[
                Filter::is("project", context.project_link()),
                Filter::is("code", code),
            ],
            Asset::FIELDS,
        )
        .await?;

    if let Some(raw) = existing {
        let asset = Asset::try_from(raw)?;
        info!("Found existing asset {} (ID: {})", asset.code, asset.id);

        if let Some(stored_type) = &asset.asset_type {
            if stored_type != asset_type {
                warn!(
                    "Asset {} already exists with type '{}'; ignoring requested type '{}'",
                    asset.code, stored_type, asset_type
                );
            }
        }

        return Ok(asset);
    }

    let mut data = Map::new();
    data.insert("project".to_owned(), context.project_link());
    data.insert("code".to_owned(), Value::String(code.to_owned()));
    data.insert(
        "sg_asset_type".to_owned(),
        Value::String(asset_type.to_owned()),
    );

    let created = context
        .client
        .create(EntityType::Asset, data)
        .await
        .map_err(|err| WorkflowError::AssetCreationFailed {
            code: code.to_owned(),
            reason: err.to_string(),
        })?;

    let asset = Asset::try_from(created).map_err(|err| WorkflowError::AssetCreationFailed {
        code: code.to_owned(),
        reason: err.to_string(),
    })?;

    info!("Created asset {} (ID: {})", asset.code, asset.id);

    Ok(asset)
}
