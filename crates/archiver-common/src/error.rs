//! Error types shared across the archiver crates

use thiserror::Error;

/// Result type alias for archiver operations
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Main error type for shared archiver functionality
#[derive(Error, Debug)]
pub enum ArchiverError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("Logging error: {0}")]
    Logging(String),
}
