//! Moving objects between the store and the local work directory.

use std::path::{Path, PathBuf};

use crate::error::PipelineResult;
use crate::resilience::RetryPolicy;
use crate::traits::ObjectStore;

/// Download `key` from `bucket` to `<work_dir>/<key>`, creating parent
/// directories. Returns the local path.
///
/// # Errors
/// Failures that remain after retrying are logged and returned.
pub async fn download_to(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    work_dir: &Path,
    retry: &RetryPolicy,
) -> PipelineResult<PathBuf> {
    let local = work_dir.join(key);
    if let Some(parent) = local.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let what = format!("download of {bucket}/{key}");
    let data = retry
        .run(&what, || store.get(bucket, key))
        .await
        .inspect_err(|e| log::error!("Failed to download {}/{}: {}", bucket, key, e))?;

    tokio::fs::write(&local, data).await?;
    log::debug!("Downloaded {}/{} to {}", bucket, key, local.display());
    Ok(local)
}

/// Upload the local file at `path` to `key` in `bucket`.
///
/// # Errors
/// Failures that remain after retrying are logged and returned.
pub async fn upload_from(
    store: &dyn ObjectStore,
    path: &Path,
    bucket: &str,
    key: &str,
    retry: &RetryPolicy,
) -> PipelineResult<()> {
    let data = tokio::fs::read(path).await?;

    let what = format!("upload of {bucket}/{key}");
    retry
        .run(&what, || store.put(bucket, key, data.clone()))
        .await
        .inspect_err(|e| log::error!("Failed to upload {} to {}/{}: {}", path.display(), bucket, key, e))?;

    log::info!("Uploaded {} to {}/{}", path.display(), bucket, key);
    Ok(())
}
