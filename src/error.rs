use std::path::PathBuf;

use thiserror::Error;

use crate::shotgrid_api::ShotgridApiError;

/// Everything that can stop an upload, or one item of a download sweep.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("File does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported file type: '{extension}', supported types: {}", .allowed.join(", "))]
    UnsupportedFileType {
        extension: String,
        allowed: &'static [&'static str],
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to create asset '{code}': {reason}")]
    AssetCreationFailed { code: String, reason: String },

    #[error("ShotGrid request failed")]
    ServiceUnavailable(#[source] ShotgridApiError),

    #[error("Failed to download {url}")]
    TransferFailed {
        url: String,
        #[source]
        source: ShotgridApiError,
    },

    #[error(transparent)]
    MalformedResponse(ShotgridApiError),

    #[error(transparent)]
    MissingCredentials(ShotgridApiError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl From<ShotgridApiError> for WorkflowError {
    fn from(err: ShotgridApiError) -> Self {
        match err {
            ShotgridApiError::MalformedResponse { .. } => WorkflowError::MalformedResponse(err),
            ShotgridApiError::MissingAuth | ShotgridApiError::MissingAccessToken => {
                WorkflowError::MissingCredentials(err)
            }
            other => WorkflowError::ServiceUnavailable(other),
        }
    }
}

impl WorkflowError {
    /// The error followed by each of its causes, on one line.
    pub fn to_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);

        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        message
    }
}
