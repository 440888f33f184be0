//! Error types for the spec module.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for spec operations.
pub type SpecResult<T> = Result<T, SpecError>;

/// Errors that can occur while reading or interpreting suite definitions.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Suite not found at path: {0}")]
    NotFound(PathBuf),

    #[error("Invalid suite format in file {path}: {message}")]
    InvalidFormat { path: PathBuf, message: String },

    #[error("Invalid check '{check}': {message}")]
    InvalidCheck { check: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}
