//! Object-store adapter used by the warehouse sink and compaction engine:
//! S3 upload/list/delete helpers built around the Hive-style partition
//! layout this system writes.
//!
//! [`S3ObjectStore`] is the production implementation. [`memory::InMemoryObjectStore`]
//! is a deterministic fake for tests that exercise seal/compact logic
//! without a real bucket.

pub mod error;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{ObjectStoreError, Result};
pub use s3::S3ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `body` under `key`. Overwrites unconditionally — callers
    /// relying on conditional writes (none do today) must build that
    /// layer themselves.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Idempotent: deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// All objects whose key starts with `prefix`, unordered.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>>;
}
