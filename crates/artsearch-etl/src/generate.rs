//! Batch embedding generation.
//!
//! Walks every category directory of the data bucket, mirrors bounded
//! batches of images to the work directory, embeds them one at a time,
//! and publishes each batch as a newline-delimited JSON file under the
//! index source prefix. Images that fail anywhere along the way are
//! copied to the quarantine prefix instead of aborting their batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use artsearch_core::model::{
    effective_batch_size, Batch, BatchReport, Category, EmbeddingRecord, ImageObject,
    ImageOutcome, RunSummary, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE,
};
use artsearch_core::BucketLayout;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::gcp::{GcsClient, VertexEmbedder};
use crate::listing::{list_directories, list_files};
use crate::preprocess::resize_in_place;
use crate::resilience::RetryPolicy;
use crate::traits::{Embedder, ObjectStore};
use crate::transfer::{download_to, upload_from};

/// Produces index source files from the images in the data bucket.
#[derive(Debug, Clone)]
pub struct EmbeddingGenerator {
    store: Arc<dyn ObjectStore>,
    embedder: Arc<dyn Embedder>,
    layout: BucketLayout,
    work_dir: PathBuf,
    batch_size: usize,
    retry: RetryPolicy,
}

impl EmbeddingGenerator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        embedder: Arc<dyn Embedder>,
        layout: BucketLayout,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            embedder,
            layout,
            work_dir,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Wire Cloud Storage and the Vertex AI embedding model from `config`.
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        let auth = config.token_provider()?;
        let project = config.project()?;
        let store = GcsClient::new(auth.clone(), config.http_timeout())?;
        let embedder = VertexEmbedder::new(
            &project,
            &config.embedding_model,
            config.dimensions,
            auth,
            config.http_timeout(),
        )?
        .with_rate_limit(config.embed_requests_per_second);

        Ok(Self::new(
            Arc::new(store),
            Arc::new(embedder),
            config.bucket_layout()?,
            config.work_dir.clone(),
        )
        .with_batch_size(config.batch_size)
        .with_retry(config.transfer_retry()))
    }

    /// Images per batch, clamped into `1..=MAX_BATCH_SIZE`.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > MAX_BATCH_SIZE {
            log::warn!(
                "Batch size {} exceeds the maximum of {}; using {}",
                batch_size,
                MAX_BATCH_SIZE,
                MAX_BATCH_SIZE
            );
        }
        self.batch_size = effective_batch_size(batch_size);
        self
    }

    /// Retry policy for downloads, uploads, and quarantine copies.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    /// Process every category of the data bucket.
    ///
    /// # Errors
    /// Listing failures and [`PipelineError::EmptyBatch`] stop the run.
    /// Per-image failures do not; they are recorded in the batch reports.
    pub async fn run(&self) -> PipelineResult<RunSummary> {
        let mut summary = RunSummary::default();
        let directories = list_directories(self.store.as_ref(), &self.layout.data_bucket).await?;
        let fail_prefix = self.layout.fail_prefix.trim_matches('/');

        for directory in directories {
            if !fail_prefix.is_empty()
                && (directory == fail_prefix || directory.starts_with(&format!("{fail_prefix}/")))
            {
                log::debug!("Skipping quarantine directory {}", directory);
                continue;
            }

            log::info!("Processing images in directory: {}", directory);
            let reports = self.process_category(&directory).await?;
            summary.categories += 1;
            summary.batches.extend(reports);
        }

        log::info!(
            "Embedding generation complete: {} records, {} quarantined, {} lost",
            summary.records_written(),
            summary.quarantined(),
            summary.quarantine_failures()
        );
        Ok(summary)
    }

    /// Process one category directory in batches of at most `batch_size`.
    ///
    /// Keys that cannot be mirrored locally are quarantined up front and
    /// reported in a batch of their own that publishes nothing.
    pub async fn process_category(&self, directory: &str) -> PipelineResult<Vec<BatchReport>> {
        let Some(category) = Category::from_directory(directory) else {
            log::warn!("Cannot derive a category from {:?}; skipping", directory);
            return Ok(Vec::new());
        };

        let keys = list_files(self.store.as_ref(), &self.layout.data_bucket, directory, &[]).await?;
        let mut objects = Vec::with_capacity(keys.len());
        let mut rejected = Vec::new();
        for key in keys {
            match ImageObject::new(key.clone(), category.clone()) {
                Ok(object) => objects.push(object),
                Err(e) => {
                    log::error!("Rejected object key {}: {}", key, e);
                    rejected.push(self.quarantine(&key, e.to_string()).await);
                }
            }
        }

        let mut reports = Vec::new();
        if !rejected.is_empty() {
            let (report, _) = BatchReport::from_outcomes(format!("{category}_rejected_keys"), rejected);
            reports.push(report);
        }
        for batch in Batch::split(&category, objects, self.batch_size) {
            let file_name = batch.file_name(chrono::Local::now().naive_local());
            reports.push(self.process_batch(&batch, &file_name).await?);
        }
        Ok(reports)
    }

    /// Fetch, embed, and publish one batch as `file_name`.
    ///
    /// Local copies of the batch's images and the output file are removed
    /// whether or not the batch succeeds.
    pub async fn process_batch(&self, batch: &Batch, file_name: &str) -> PipelineResult<BatchReport> {
        let output = self.work_dir.join(file_name);
        let result = self.fetch_embed_publish(batch, file_name, &output).await;
        self.cleanup(batch, &output).await;
        result
    }

    async fn fetch_embed_publish(
        &self,
        batch: &Batch,
        file_name: &str,
        output: &Path,
    ) -> PipelineResult<BatchReport> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let mut downloads = Vec::with_capacity(batch.len());
        for object in &batch.objects {
            let local = download_to(
                self.store.as_ref(),
                &self.layout.data_bucket,
                &object.key,
                &self.work_dir,
                &self.retry,
            )
            .await;
            downloads.push(local);
        }
        log::info!(
            "Downloaded {} of {} images",
            downloads.iter().filter(|d| d.is_ok()).count(),
            batch.len()
        );

        let mut outcomes = Vec::with_capacity(batch.len());
        for (object, local) in batch.objects.iter().zip(downloads) {
            let embedded = match local {
                Ok(path) => self.embed(object, &path).await,
                Err(e) => Err(e),
            };
            let outcome = match embedded {
                Ok(record) => ImageOutcome::Embedded(record),
                Err(e) => {
                    log::error!("Error processing image {}: {}", object.key, e);
                    self.quarantine(&object.key, e.to_string()).await
                }
            };
            outcomes.push(outcome);
        }

        let (mut report, records) = BatchReport::from_outcomes(file_name, outcomes);
        log::info!("Successfully processed {} images", records.len());

        write_records(output, &records).await?;
        if tokio::fs::metadata(output).await?.len() == 0 {
            return Err(PipelineError::EmptyBatch {
                file: file_name.to_string(),
            });
        }

        let key = self.layout.index_key(file_name);
        upload_from(
            self.store.as_ref(),
            output,
            &self.layout.vertex_bucket,
            &key,
            &self.retry,
        )
        .await?;
        report.output_key = Some(key);

        Ok(report)
    }

    async fn embed(&self, object: &ImageObject, local: &Path) -> PipelineResult<EmbeddingRecord> {
        resize_in_place(local).await?;
        let bytes = tokio::fs::read(local).await?;
        let embedding = self.embedder.embed_image(&bytes).await?;
        Ok(EmbeddingRecord::new(
            object.id.clone(),
            embedding,
            &object.category,
        ))
    }

    /// Copy the original object at `key` to its quarantine key.
    async fn quarantine(&self, key: &str, reason: String) -> ImageOutcome {
        let bucket = &self.layout.data_bucket;
        let dest = self.layout.quarantine_key(key);
        let what = format!("quarantine of {key}");

        match self
            .retry
            .run(&what, || self.store.copy(bucket, key, bucket, &dest))
            .await
        {
            Ok(()) => {
                log::warn!("Quarantined {} as {}", key, dest);
                ImageOutcome::Quarantined { key: dest, reason }
            }
            Err(e) => {
                log::error!("Failed to quarantine {}: {}", key, e);
                ImageOutcome::QuarantineFailed {
                    key: key.to_string(),
                    reason,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn cleanup(&self, batch: &Batch, output: &Path) {
        let mut paths: Vec<PathBuf> = batch
            .objects
            .iter()
            .map(|object| object.local_path(&self.work_dir))
            .collect();
        paths.push(output.to_path_buf());

        for path in &paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        // Prune directories the batch left empty, up to the work dir.
        for object in &batch.objects {
            let mut dir = object.local_path(&self.work_dir);
            while dir.pop() && dir != self.work_dir && dir.starts_with(&self.work_dir) {
                if tokio::fs::remove_dir(&dir).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Write one JSON line per record, creating or truncating `path`.
async fn write_records(path: &Path, records: &[EmbeddingRecord]) -> PipelineResult<()> {
    let mut contents = String::new();
    for record in records {
        contents.push_str(&record.to_json_line()?);
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;
    use async_trait::async_trait;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct FixedEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_image(&self, _image: &[u8]) -> PipelineResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.25, 0.5, 0.75])
        }

        async fn embed_text(&self, _text: &str) -> PipelineResult<Vec<f32>> {
            Ok(vec![0.0; 3])
        }
    }

    /// Refuses every copy.
    #[derive(Debug)]
    struct NoCopyStore(MemoryObjectStore);

    #[async_trait]
    impl ObjectStore for NoCopyStore {
        async fn list(&self, bucket: &str, prefix: Option<&str>) -> PipelineResult<Vec<String>> {
            self.0.list(bucket, prefix).await
        }
        async fn get(&self, bucket: &str, key: &str) -> PipelineResult<Vec<u8>> {
            self.0.get(bucket, key).await
        }
        async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> PipelineResult<()> {
            self.0.put(bucket, key, data).await
        }
        async fn copy(&self, _: &str, _: &str, _: &str, _: &str) -> PipelineResult<()> {
            Err(PipelineError::Status {
                service: "test",
                status: 403,
                message: "copy refused".to_string(),
            })
        }
    }

    fn layout() -> BucketLayout {
        BucketLayout {
            data_bucket: "art-data".to_string(),
            vertex_bucket: "art-vertex".to_string(),
            all_prefix: "all".to_string(),
            idx_prefix: "index".to_string(),
            fail_prefix: "failed".to_string(),
        }
    }

    fn jpeg() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]))
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    fn batch(keys: &[&str]) -> Batch {
        let category = Category::new("cubism");
        let objects = keys
            .iter()
            .map(|k| ImageObject::new(*k, category.clone()).unwrap())
            .collect();
        Batch::split(&category, objects, 100).remove(0)
    }

    fn generator(store: Arc<dyn ObjectStore>, work_dir: &Path) -> EmbeddingGenerator {
        EmbeddingGenerator::new(
            store,
            Arc::new(FixedEmbedder::default()),
            layout(),
            work_dir.to_path_buf(),
        )
        .with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_batch_accounts_for_every_image() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("art-data", "cubism/a.jpg", jpeg());
        store.insert("art-data", "cubism/b.jpg", b"garbage".to_vec());
        store.insert("art-data", "cubism/c.jpg", jpeg());

        let report = generator(store.clone(), temp_dir.path())
            .process_batch(&batch(&["cubism/a.jpg", "cubism/b.jpg", "cubism/c.jpg", "cubism/gone.jpg"]), "out.json")
            .await
            .unwrap();

        assert_eq!(report.size, 4);
        assert_eq!(report.records_written, 2);
        // The missing object cannot be copied either.
        assert_eq!(report.quarantined, vec!["failed/cubism/b.jpg"]);
        assert_eq!(report.quarantine_failed.len(), 1);
        assert_eq!(report.quarantine_failed[0].key, "cubism/gone.jpg");
        assert!(report.is_accounted());
        assert_eq!(report.output_key.as_deref(), Some("index/out.json"));

        let uploaded = store.object("art-vertex", "index/out.json").unwrap();
        assert_eq!(String::from_utf8(uploaded).unwrap().lines().count(), 2);
        assert_eq!(store.object("art-data", "failed/cubism/b.jpg"), Some(b"garbage".to_vec()));
    }

    #[tokio::test]
    async fn test_failed_quarantine_copy_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let inner = MemoryObjectStore::new();
        inner.insert("art-data", "cubism/a.jpg", jpeg());
        inner.insert("art-data", "cubism/b.jpg", b"garbage".to_vec());
        let store: Arc<dyn ObjectStore> = Arc::new(NoCopyStore(inner));

        let report = generator(store, temp_dir.path())
            .process_batch(&batch(&["cubism/a.jpg", "cubism/b.jpg"]), "out.json")
            .await
            .unwrap();

        assert!(report.quarantined.is_empty());
        assert_eq!(report.quarantine_failed.len(), 1);
        assert!(report.quarantine_failed[0].error.contains("copy refused"));
        assert!(report.is_accounted());
    }

    #[tokio::test]
    async fn test_all_failed_batch_is_empty_and_not_uploaded() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("art-data", "cubism/a.jpg", b"bad".to_vec());
        store.insert("art-data", "cubism/b.jpg", b"worse".to_vec());

        let err = generator(store.clone(), temp_dir.path())
            .process_batch(&batch(&["cubism/a.jpg", "cubism/b.jpg"]), "empty.json")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmptyBatch { ref file } if file == "empty.json"));
        assert!(store.keys("art-vertex").is_empty());
        assert!(!temp_dir.path().join("empty.json").exists());
        assert!(!temp_dir.path().join("cubism/a.jpg").exists());
    }

    #[tokio::test]
    async fn test_run_skips_quarantine_directory_and_splits_batches() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        for name in ["a", "b", "c"] {
            store.insert("art-data", &format!("cubism/{name}.jpg"), jpeg());
        }
        store.insert("art-data", "failed/cubism/old.jpg", b"bad".to_vec());

        let embedder = Arc::new(FixedEmbedder::default());
        let summary = EmbeddingGenerator::new(
            store.clone(),
            embedder.clone(),
            layout(),
            temp_dir.path().to_path_buf(),
        )
        .with_batch_size(2)
        .with_retry(RetryPolicy::none())
        .run()
        .await
        .unwrap();

        assert_eq!(summary.categories, 1);
        assert_eq!(summary.batches.len(), 2);
        assert_eq!(summary.records_written(), 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.keys("art-vertex").len(), 2);
        assert!(store
            .keys("art-vertex")
            .iter()
            .all(|k| k.starts_with("index/") && k.contains("_cubism_batch_")));
    }

    #[tokio::test]
    async fn test_oversized_batch_size_is_capped() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let image = jpeg();
        for i in 0..150 {
            store.insert("art-data", &format!("cubism/img{i:03}.jpg"), image.clone());
        }

        let summary = generator(store.clone(), temp_dir.path())
            .with_batch_size(500)
            .run()
            .await
            .unwrap();

        let sizes: Vec<usize> = summary.batches.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![100, 50]);
        assert_eq!(summary.records_written(), 150);
    }

    #[tokio::test]
    async fn test_unmirrorable_key_is_quarantined() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("art-data", "cubism/ok.jpg", jpeg());
        store.insert("art-data", "cubism/../evil.jpg", b"escape".to_vec());

        let summary = generator(store.clone(), temp_dir.path())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.categories, 1);
        assert!(summary.batches.iter().all(BatchReport::is_accounted));
        let listed: usize = summary.batches.iter().map(|b| b.size).sum();
        assert_eq!(listed, 2);
        assert_eq!(summary.records_written(), 1);
        assert_eq!(summary.quarantined(), 1);

        let rejected = &summary.batches[0];
        assert_eq!(rejected.batch_name, "cubism_rejected_keys");
        assert_eq!(rejected.quarantined, vec!["failed/cubism/../evil.jpg"]);
        assert_eq!(rejected.output_key, None);
        assert_eq!(
            store.object("art-data", "failed/cubism/../evil.jpg"),
            Some(b"escape".to_vec())
        );
        assert_eq!(store.keys("art-vertex").len(), 1);
    }
}
