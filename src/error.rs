//! SafeClaw Memory error types

use std::path::PathBuf;
use thiserror::Error;

/// SafeClaw Memory error type
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any storage mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Durable substrate failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Embedding capability failed or returned an unusable vector
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Another store instance holds the data directory
    #[error("Data directory is locked: {}", .0.display())]
    Locked(PathBuf),

    /// The store has been closed
    #[error("Memory store is closed")]
    Closed,

    /// Background consolidation worker error
    #[error("Worker error: {0}")]
    Worker(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error came from the durable substrate rather than the caller's input.
    pub fn is_substrate(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Io(_) | Error::Serialization(_) | Error::Locked(_)
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Result type alias for SafeClaw Memory operations
pub type Result<T> = std::result::Result<T, Error>;
