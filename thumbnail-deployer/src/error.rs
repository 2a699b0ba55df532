//! Error types for deployment operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::aws::AwsError;

/// Errors that can occur while provisioning, packaging or tearing down.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Credentials file or deployment settings are invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An AWS call failed in a way the pipeline does not tolerate.
    #[error(transparent)]
    Aws(#[from] AwsError),

    /// Building the function archive failed.
    #[error("Packaging error: {0}")]
    Packaging(String),

    /// The source revision could not be resolved.
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// A filesystem operation failed.
    #[error("Failed to {operation} '{path}': {source}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the zip archive failed.
    #[error("Zip error: {0}")]
    Zip(#[from] s_zip::SZipError),

    /// A policy document or event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeployError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn packaging(message: impl Into<String>) -> Self {
        Self::Packaging(message.into())
    }

    pub fn io(operation: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
