use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use clap::Args;
use log::{error, info};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    asset::{resolve_or_create_asset, DEFAULT_ASSET_TYPE},
    context::ProjectContext,
    error::WorkflowError,
    options::Global,
    shotgrid_api::{AttachmentRef, EntityType, Filter},
};

use super::{connect_or_report, CommandOutput};

pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".tiff", ".bmp"];

#[derive(Debug, Clone, Args)]
pub struct UploadImageOptions {
    /// The path to the image to upload.
    pub image_path: PathBuf,

    /// The code of the asset to attach the new version to. The asset is
    /// created if the project doesn't have one with this code.
    pub asset_name: String,

    /// The name to give the new version. Defaults to a timestamp like
    /// `v20250101_120000`.
    pub version_name: Option<String>,

    /// The type given to the asset if it has to be created.
    #[clap(default_value = DEFAULT_ASSET_TYPE)]
    pub asset_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedVersion {
    pub asset_id: u64,
    pub asset_name: String,
    pub asset_type: String,
    pub version_id: u64,
    pub version_name: String,
    pub image_url: String,
}

pub async fn upload(global: Global, options: UploadImageOptions) -> anyhow::Result<()> {
    match connect_or_report(&global).await {
        Ok(context) => upload_image(&context, &options).await.print(),
        Err(output) => output.print(),
    }
}

/// Upload `options.image_path` as a new version of the requested asset. Every
/// failure is reported through the returned output rather than as an error.
pub async fn upload_image(
    context: &ProjectContext,
    options: &UploadImageOptions,
) -> CommandOutput<UploadedVersion> {
    match try_upload_image(context, options).await {
        Ok(uploaded) => {
            info!(
                "Uploaded {} to asset {} as version {}",
                options.image_path.display(),
                uploaded.asset_name,
                uploaded.version_name
            );
            CommandOutput::success(uploaded)
        }
        Err(err) => {
            error!("Upload failed: {}", err.to_message());
            CommandOutput::failure(err.to_message())
        }
    }
}

async fn try_upload_image(
    context: &ProjectContext,
    options: &UploadImageOptions,
) -> Result<UploadedVersion, WorkflowError> {
    check_image_path(&options.image_path)?;

    let asset = resolve_or_create_asset(context, &options.asset_name, &options.asset_type).await?;

    let version_name = match options.version_name.as_deref() {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => timestamp_version_name(&Local::now()),
    };

    let mut data = Map::new();
    data.insert("project".to_owned(), context.project_link());
    data.insert("code".to_owned(), Value::String(version_name.clone()));
    data.insert("entity".to_owned(), EntityType::Asset.link(asset.id));
    data.insert(
        "description".to_owned(),
        Value::String(format!("Automatically uploaded image version: {}", version_name)),
    );

    let version = context.client.create(EntityType::Version, data).await?;
    info!("Created version {} (ID: {})", version_name, version.id);

    context
        .client
        .upload(EntityType::Version, version.id, &options.image_path, "image")
        .await?;
    info!("Uploaded image {}", options.image_path.display());

    let image_url = context
        .client
        .find_one(
            EntityType::Version,
            &[Filter::is("id", version.id)],
            &["image"],
        )
        .await?
        .and_then(|detail| detail.attributes.get("image").and_then(AttachmentRef::from_value))
        .and_then(|image| image.url().map(str::to_owned))
        .unwrap_or_default();

    Ok(UploadedVersion {
        asset_id: asset.id,
        asset_name: asset.code,
        asset_type: asset
            .asset_type
            .unwrap_or_else(|| options.asset_type.clone()),
        version_id: version.id,
        version_name,
        image_url,
    })
}

/// Checks that run before anything is sent to ShotGrid.
pub fn check_image_path(path: &Path) -> Result<(), WorkflowError> {
    if !path.is_file() {
        return Err(WorkflowError::FileNotFound(path.to_owned()));
    }

    let extension = path
        .extension()
        .map(|extension| format!(".{}", extension.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(WorkflowError::UnsupportedFileType {
            extension,
            allowed: ALLOWED_EXTENSIONS,
        });
    }

    Ok(())
}

/// A version name like `v20250101_120000`. Names only have second precision,
/// so two uploads within the same second collide.
pub fn timestamp_version_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("v{}", now.format("%Y%m%d_%H%M%S"))
}
