//! Storage sinks
//!
//! The pipeline writes through [`StorageSink`] only; [`S3Storage`] talks to
//! S3 or MinIO, [`MemoryStorage`] keeps objects in memory.

use async_trait::async_trait;

use crate::error::StorageError;

pub mod config;
pub mod memory;
pub mod s3;

pub use memory::{MemoryStorage, StoredObject};
pub use s3::{S3Storage, UploadResult};

/// Blob store holding the archived messages
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Name of the destination bucket
    fn bucket(&self) -> &str;

    /// Existence check for the bucket; never writes.
    async fn bucket_exists(&self) -> Result<bool, StorageError>;

    /// Write `body` at `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;
}
