//! Category and image enumeration over an [`ObjectStore`].

use std::collections::BTreeSet;

use crate::error::PipelineResult;
use crate::traits::ObjectStore;

/// Extensions accepted when none are given.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".jpg"];

/// List the distinct directories holding objects in `bucket`.
///
/// A directory is the parent path of an object key. Objects at the bucket
/// root, the `all/` placeholder and parents with `.` or `..` segments are
/// skipped. The result is sorted.
///
/// # Errors
/// Listing failures are logged and returned.
pub async fn list_directories(
    store: &dyn ObjectStore,
    bucket: &str,
) -> PipelineResult<Vec<String>> {
    let keys = store.list(bucket, None).await.inspect_err(|e| {
        log::error!("Failed to list directories in {}: {}", bucket, e);
    })?;

    let directories: BTreeSet<String> = keys
        .iter()
        .filter(|key| key.as_str() != "all/")
        .filter_map(|key| key.rsplit_once('/').map(|(dir, _)| dir))
        .filter(|dir| !dir.is_empty())
        .filter(|dir| {
            let relative = dir.split('/').any(|segment| segment == "." || segment == "..");
            if relative {
                log::warn!("Skipping relative directory {:?}", dir);
            }
            !relative
        })
        .map(str::to_string)
        .collect();

    log::debug!("Found {} directories in {}", directories.len(), bucket);
    Ok(directories.into_iter().collect())
}

/// List the keys directly or indirectly under `prefix/` whose name ends in
/// one of `extensions` (compared case-insensitively).
///
/// An empty `extensions` slice falls back to [`DEFAULT_EXTENSIONS`].
///
/// # Errors
/// Listing failures are logged and returned.
pub async fn list_files(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    extensions: &[&str],
) -> PipelineResult<Vec<String>> {
    let extensions: Vec<String> = if extensions.is_empty() {
        DEFAULT_EXTENSIONS
    } else {
        extensions
    }
    .iter()
    .map(|ext| ext.to_lowercase())
    .collect();

    let prefix = format!("{}/", prefix.trim_end_matches('/'));
    let keys = store.list(bucket, Some(&prefix)).await.inspect_err(|e| {
        log::error!("Failed to list files in {}/{}: {}", bucket, prefix, e);
    })?;

    Ok(keys
        .into_iter()
        .filter(|key| {
            let lower = key.to_lowercase();
            extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::memory::MemoryObjectStore;
    use async_trait::async_trait;

    fn store() -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        store.insert("art-data", "all/", vec![]);
        store.insert("art-data", "readme.txt", vec![]);
        store.insert("art-data", "impressionism/monet_lilies.jpg", vec![]);
        store.insert("art-data", "impressionism/degas_dancers.JPG", vec![]);
        store.insert("art-data", "impressionism/notes.txt", vec![]);
        store.insert("art-data", "cubism/picasso_guitar.jpg", vec![]);
        store.insert("art-data", "cubism/sketches/study.png", vec![]);
        store
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn list(&self, _: &str, _: Option<&str>) -> PipelineResult<Vec<String>> {
            Err(PipelineError::Status {
                service: "test",
                status: 403,
                message: "denied".to_string(),
            })
        }
        async fn get(&self, _: &str, _: &str) -> PipelineResult<Vec<u8>> {
            unimplemented!()
        }
        async fn put(&self, _: &str, _: &str, _: Vec<u8>) -> PipelineResult<()> {
            unimplemented!()
        }
        async fn copy(&self, _: &str, _: &str, _: &str, _: &str) -> PipelineResult<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_list_directories_is_sorted_and_distinct() {
        let dirs = list_directories(&store(), "art-data").await.unwrap();
        assert_eq!(dirs, vec!["cubism", "cubism/sketches", "impressionism"]);
    }

    #[tokio::test]
    async fn test_list_directories_skips_relative_segments() {
        let store = store();
        store.insert("art-data", "cubism/../evil.jpg", vec![]);
        store.insert("art-data", "cubism/./odd.jpg", vec![]);

        let dirs = list_directories(&store, "art-data").await.unwrap();
        assert_eq!(dirs, vec!["cubism", "cubism/sketches", "impressionism"]);
    }

    #[tokio::test]
    async fn test_list_files_matches_extension_case_insensitively() {
        let files = list_files(&store(), "art-data", "impressionism", &[])
            .await
            .unwrap();
        assert_eq!(
            files,
            vec![
                "impressionism/degas_dancers.JPG",
                "impressionism/monet_lilies.jpg"
            ]
        );
    }

    #[tokio::test]
    async fn test_list_files_does_not_match_sibling_prefix() {
        let store = store();
        store.insert("art-data", "cubism-late/braque.jpg", vec![]);
        let files = list_files(&store, "art-data", "cubism/", &[".jpg", ".png"])
            .await
            .unwrap();
        assert_eq!(
            files,
            vec!["cubism/picasso_guitar.jpg", "cubism/sketches/study.png"]
        );
    }

    #[tokio::test]
    async fn test_listing_errors_propagate() {
        assert!(list_directories(&BrokenStore, "art-data").await.is_err());
        assert!(list_files(&BrokenStore, "art-data", "cubism", &[])
            .await
            .is_err());
    }
}
