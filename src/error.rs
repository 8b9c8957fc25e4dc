use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a generator run or a unit of its work.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rules document is not usable (top level is not an object, missing sections).
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to scan directory {path:?}: {reason}")]
    Scan { path: PathBuf, reason: String },

    #[error("Failed parsing {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid checker pattern: {0}")]
    InvalidPattern(String),

    #[error("Failed to start parse workers: {0}")]
    WorkerPool(String),

    #[error("Failed writing {path:?}: {reason}")]
    Output { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, GeneratorError>;
