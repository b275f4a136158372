//! In-process blob store
//!
//! Objects live in a map keyed by object key. Writes can be delayed or made
//! to fail, and the bucket can be reported as absent.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::StorageSink;
use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

impl StoredObject {
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Default)]
struct BucketState {
    objects: BTreeMap<String, StoredObject>,
    put_count: usize,
    put_error: Option<StorageError>,
    failing_keys: Vec<String>,
    exists_error: Option<StorageError>,
}

#[derive(Debug)]
pub struct MemoryStorage {
    bucket: String,
    exists: bool,
    put_delay: Option<Duration>,
    in_flight_puts: AtomicUsize,
    max_concurrent_puts: AtomicUsize,
    state: Mutex<BucketState>,
}

impl MemoryStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            exists: true,
            put_delay: None,
            in_flight_puts: AtomicUsize::new(0),
            max_concurrent_puts: AtomicUsize::new(0),
            state: Mutex::new(BucketState::default()),
        }
    }

    /// A bucket the existence check reports as absent.
    pub fn missing(bucket: impl Into<String>) -> Self {
        Self {
            exists: false,
            ..Self::new(bucket)
        }
    }

    /// Hold every write for `delay` before it completes.
    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    /// Make every following write fail with `error`.
    pub fn fail_puts(&self, error: StorageError) {
        self.lock().put_error = Some(error);
    }

    /// Make writes to `key` fail; other keys are unaffected.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.lock().failing_keys.push(key.into());
    }

    /// Clear every injected write failure.
    pub fn recover(&self) {
        let mut state = self.lock();
        state.put_error = None;
        state.failing_keys.clear();
    }

    /// Make the existence check itself fail with `error`.
    pub fn fail_exists(&self, error: StorageError) {
        self.lock().exists_error = Some(error);
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// Number of successful writes, counting overwrites.
    pub fn put_count(&self) -> usize {
        self.lock().put_count
    }

    /// Highest number of writes seen running at the same time.
    pub fn max_concurrent_puts(&self) -> usize {
        self.max_concurrent_puts.load(Ordering::SeqCst)
    }

    fn store(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let mut state = self.lock();

        if !self.exists {
            return Err(StorageError::BucketNotFound(self.bucket.clone()));
        }
        if let Some(error) = state.put_error.clone() {
            return Err(error);
        }
        if state.failing_keys.iter().any(|k| k == key) {
            return Err(StorageError::request("put", format!("write to {} rejected", key)));
        }

        state.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        state.put_count += 1;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StorageSink for MemoryStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        if let Some(error) = self.lock().exists_error.clone() {
            return Err(error);
        }
        Ok(self.exists)
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let running = self.in_flight_puts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_puts.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.store(key, body, content_type);
        self.in_flight_puts.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
