//! Service error types
//!
//! Fatal errors (`ServiceError`) end the process with a non-zero exit code.
//! Per-message errors (`ProcessingError`) never leave the pipeline: they turn
//! into a negative acknowledgment.

use archiver_common::ArchiverError;
use thiserror::Error;

/// Result type alias for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors that stop the service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Pull error: {0}")]
    Pull(#[from] SourceError),

    #[error("Logging error: {0}")]
    Logging(#[from] ArchiverError),
}

impl ServiceError {
    /// Process exit code for this error. Every fatal error exits with 1.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Failure to turn one message into a stored object
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Malformed payload in message {message_id}: {source}")]
    Malformed {
        message_id: String,
        source: std::str::Utf8Error,
    },

    #[error("Failed to encode message {message_id}: {source}")]
    Serialization {
        message_id: String,
        source: ArchiverError,
    },

    #[error("Failed to write {key}: {source}")]
    StorageFailure { key: String, source: StorageError },
}

impl ProcessingError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProcessingError::Malformed { .. })
    }
}

/// Errors raised by a subscription source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Subscription not found: {0}")]
    NotFound(String),

    #[error("Subscription {operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
}

impl SourceError {
    pub fn request(operation: &'static str, message: impl Into<String>) -> Self {
        SourceError::Request {
            operation,
            message: message.into(),
        }
    }
}

/// Errors raised by a storage sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Storage {operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
}

impl StorageError {
    pub fn request(operation: &'static str, message: impl Into<String>) -> Self {
        StorageError::Request {
            operation,
            message: message.into(),
        }
    }
}
