use std::path::{Path, PathBuf};

use log::{error, info, warn};
use percent_encoding::percent_decode_str;
use reqwest::Url;

use crate::{
    context::ProjectContext,
    error::WorkflowError,
    options::Global,
    shotgrid_api::{Asset, EntityType, Filter, RawEntity, Version},
};

use super::connect_or_report;

const DEFAULT_EXTENSION: &str = ".jpg";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub async fn download(global: Global) -> anyhow::Result<()> {
    // Logs share stdout in this mode, so the JSON failure is the only thing
    // written when connecting fails.
    let context = match connect_or_report(&global).await {
        Ok(context) => context,
        Err(output) => return output.print(),
    };

    download_all_assets(&context).await?;

    Ok(())
}

/// Download the attachment of every version of every asset in the project.
///
/// An asset whose versions can't be listed, or a version that can't be
/// downloaded, is logged and counted; only failing to list the project's
/// assets stops the sweep.
pub async fn download_all_assets(context: &ProjectContext) -> Result<DownloadSummary, WorkflowError> {
    let mut summary = DownloadSummary::default();

    let assets = context
        .client
        .find(
            EntityType::Asset,
            &[Filter::is("project", context.project_link())],
            Asset::FIELDS,
        )
        .await?;

    if assets.is_empty() {
        info!("Project {} has no assets", context.project_name);
        return Ok(summary);
    }

    for raw_asset in assets {
        let asset = match Asset::try_from(raw_asset) {
            Ok(asset) => asset,
            Err(err) => {
                warn!("Skipping asset: {}", err);
                summary.skipped += 1;
                continue;
            }
        };

        info!("Processing asset {} (ID: {})", asset.code, asset.id);

        let versions = match context
            .client
            .find(
                EntityType::Version,
                &[Filter::is("entity", EntityType::Asset.link(asset.id))],
                Version::FIELDS,
            )
            .await
        {
            Ok(versions) => versions,
            Err(err) => {
                error!(
                    "  Could not list versions: {}",
                    WorkflowError::from(err).to_message()
                );
                summary.failed += 1;
                continue;
            }
        };

        if versions.is_empty() {
            info!("  No versions");
            continue;
        }

        for raw_version in versions {
            match download_version(context, &asset, raw_version).await {
                Ok(Some(path)) => {
                    info!("  Downloaded {}", path.display());
                    summary.downloaded += 1;
                }
                Ok(None) => summary.skipped += 1,
                Err(err) => {
                    error!("  {}", err.to_message());
                    summary.failed += 1;
                }
            }
        }
    }

    info!(
        "Finished: {} downloaded, {} skipped, {} failed",
        summary.downloaded, summary.skipped, summary.failed
    );

    Ok(summary)
}

/// `Ok(None)` means the version had nothing to download.
async fn download_version(
    context: &ProjectContext,
    asset: &Asset,
    raw_version: RawEntity,
) -> Result<Option<PathBuf>, WorkflowError> {
    let version = Version::try_from(raw_version)?;

    let Some(attachment) = version.preferred_attachment() else {
        info!("  Version {} has no attachment, skipping", version.code);
        return Ok(None);
    };

    let Some(url) = attachment.url() else {
        warn!("  Version {} has no usable attachment URL, skipping", version.code);
        return Ok(None);
    };

    let path = context
        .directories
        .download_dir
        .join(local_file_name(&asset.code, &version.code, url));

    context
        .client
        .download(url, &path)
        .await
        .map_err(|source| WorkflowError::TransferFailed {
            url: url.to_owned(),
            source,
        })?;

    Ok(Some(path))
}

/// `{asset}_{version}{extension}`, with the extension taken from the
/// attachment URL's path.
pub fn local_file_name(asset_code: &str, version_code: &str, url: &str) -> String {
    sanitize_filename::sanitize(format!(
        "{}_{}{}",
        asset_code,
        version_code,
        url_extension(url)
    ))
}

fn url_extension(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_owned(),
        // Site-relative links don't parse on their own.
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_owned(),
    };

    let decoded = percent_decode_str(&path).decode_utf8_lossy();

    Path::new(decoded.as_ref())
        .extension()
        .map(|extension| format!(".{}", extension.to_string_lossy()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned())
}
