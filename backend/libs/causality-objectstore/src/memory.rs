//! Deterministic in-memory [`ObjectStore`] fake for sink/compaction tests.

use crate::error::{ObjectStoreError, Result};
use crate::{ObjectStore, ObjectSummary};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<()> {
        self.objects.write().insert(key.to_owned(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_owned()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>> {
        Ok(self
            .objects
            .read()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, body)| ObjectSummary {
                key: key.clone(),
                size_bytes: body.len() as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = InMemoryObjectStore::new();
        store
            .put("events/app_id=demo/x.parquet", Bytes::from_static(b"data"), "application/octet-stream")
            .await
            .unwrap();
        let body = store.get("events/app_id=demo/x.parquet").await.unwrap();
        assert_eq!(body.as_ref(), b"data");
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let store = InMemoryObjectStore::new();
        assert!(store.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryObjectStore::new();
        store.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = InMemoryObjectStore::new();
        store.put("a/1.parquet", Bytes::new(), "x").await.unwrap();
        store.put("a/2.parquet", Bytes::new(), "x").await.unwrap();
        store.put("b/1.parquet", Bytes::new(), "x").await.unwrap();

        let listed = store.list("a/").await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
