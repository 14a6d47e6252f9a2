//! Error types for batchload core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in batchload core
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("URL list not found: {0}")]
    UrlListNotFound(PathBuf),

    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cannot derive a file name from URL: {0}")]
    InvalidFileName(String),

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Interrupted while waiting for {0}")]
    Interrupted(&'static str),
}

impl LoaderError {
    /// Whether this error aborts the whole batch rather than a single task
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LoaderError::InvalidConfig(_)
                | LoaderError::UrlListNotFound(_)
                | LoaderError::DirectoryCreation { .. }
        )
    }

    pub fn is_interruption(&self) -> bool {
        matches!(self, LoaderError::Interrupted(_))
    }
}
