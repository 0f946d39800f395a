//! Unified application error model and mapping helpers.
//! This module provides the common error enum surfaced by the orchestrator to
//! the HTTP frontend, along with the status mapping used by handlers. Leaf
//! causes are flattened to display strings so errors serialize cleanly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExploreError {
    /// The listing call to the file store failed.
    #[error("listing failed: {message}")]
    List { message: String },
    /// Content download failed for a specific file.
    #[error("fetch failed for '{file_id}': {message}")]
    Fetch { file_id: String, message: String },
    /// Downloaded bytes could not be interpreted as tabular data.
    #[error("could not parse '{name}' as tabular data: {message}")]
    Parse { name: String, message: String },
    /// The selected id was not present in the last known listing.
    #[error("unknown file id '{file_id}'")]
    UnknownFile { file_id: String },
    /// Bad or missing configuration.
    #[error("configuration error: {message}")]
    Config { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ExploreError {
    pub fn list(cause: impl std::fmt::Display) -> Self {
        ExploreError::List { message: cause.to_string() }
    }
    pub fn fetch(file_id: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        ExploreError::Fetch { file_id: file_id.into(), message: cause.to_string() }
    }
    pub fn parse(name: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        ExploreError::Parse { name: name.into(), message: cause.to_string() }
    }
    pub fn unknown_file(file_id: impl Into<String>) -> Self {
        ExploreError::UnknownFile { file_id: file_id.into() }
    }
    pub fn config(message: impl Into<String>) -> Self {
        ExploreError::Config { message: message.into() }
    }
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        ExploreError::Internal { message: cause.to_string() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            ExploreError::List { .. } => 502,
            ExploreError::Fetch { .. } => 502,
            ExploreError::Parse { .. } => 422,
            ExploreError::UnknownFile { .. } => 404,
            ExploreError::Config { .. } => 400,
            ExploreError::Internal { .. } => 500,
        }
    }
}

pub type ExploreResult<T> = Result<T, ExploreError>;

impl From<anyhow::Error> for ExploreError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: callers wrap leaf failures explicitly; anything
        // else is internal
        ExploreError::Internal { message: err.to_string() }
    }
}
