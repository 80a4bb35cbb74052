mod download_assets;
mod upload_image;

use std::io::{self, Write};

use clap::Subcommand;
use serde::Serialize;

use crate::{context::ProjectContext, options::Global};

pub use download_assets::*;
pub use upload_image::*;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a single image as a new version of an asset, creating the asset
    /// if needed. Prints a JSON result object to stdout.
    Upload(UploadImageOptions),
}

pub const USAGE: &str =
    "Usage: shotgrid-sync upload <image_path> <asset_name> [version_name] [asset_type]";

/// The single JSON document a command prints to stdout.
#[derive(Debug, Serialize)]
pub struct CommandOutput<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> CommandOutput<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Write this output as one line of JSON to stdout.
    pub fn print(&self) -> anyhow::Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        serde_json::to_writer(&mut handle, self)?;
        writeln!(handle)?;
        handle.flush()?;

        Ok(())
    }
}

impl CommandOutput<()> {
    pub fn usage_error(reason: &str) -> Self {
        Self::failure(format!("{}. {}", reason, USAGE))
    }
}

/// Connect to the configured project, or produce the failure output to print
/// in place of any result.
pub async fn connect_or_report(global: &Global) -> Result<ProjectContext, CommandOutput<()>> {
    ProjectContext::connect(global)
        .await
        .map_err(|err| CommandOutput::failure(err.to_message()))
}
