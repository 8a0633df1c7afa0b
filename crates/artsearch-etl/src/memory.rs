//! In-memory [`ObjectStore`] for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PipelineError, PipelineResult};
use crate::traits::ObjectStore;

/// Buckets of objects held in memory, keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.lock()
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    /// Current contents of an object, if present.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys in a bucket.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        // A poisoned lock still holds consistent data: every write is a
        // single map insert.
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> PipelineResult<Vec<String>> {
        let prefix = prefix.unwrap_or("");
        Ok(self
            .keys(bucket)
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    async fn get(&self, bucket: &str, key: &str) -> PipelineResult<Vec<u8>> {
        self.object(bucket, key)
            .ok_or_else(|| PipelineError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> PipelineResult<()> {
        self.insert(bucket, key, data);
        Ok(())
    }

    async fn copy(
        &self,
        bucket: &str,
        key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> PipelineResult<()> {
        let data = self.get(bucket, key).await?;
        self.insert(dest_bucket, dest_key, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_filters_by_bucket_and_prefix() {
        let store = MemoryObjectStore::new();
        store.insert("art-data", "all/cubism/a.jpg", vec![1]);
        store.insert("art-data", "all/baroque/b.jpg", vec![2]);
        store.insert("other", "all/cubism/c.jpg", vec![3]);

        let keys = store.list("art-data", Some("all/cubism/")).await.unwrap();
        assert_eq!(keys, vec!["all/cubism/a.jpg"]);
        assert_eq!(store.list("art-data", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_copy_and_missing_get() {
        let store = MemoryObjectStore::new();
        store.insert("art-data", "all/cubism/a.jpg", vec![9]);

        store
            .copy("art-data", "all/cubism/a.jpg", "art-data", "failed/cubism/a.jpg")
            .await
            .unwrap();
        assert_eq!(store.object("art-data", "failed/cubism/a.jpg"), Some(vec![9]));

        let err = store.get("art-data", "nope.jpg").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
