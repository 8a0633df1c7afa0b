//! Seams between the pipeline and the managed services it delegates to.
//!
//! The Google Cloud clients in [`crate::gcp`] implement these traits; the
//! in-memory store in [`crate::memory`] and test doubles implement them
//! too, so the pipeline logic runs without network access.

use std::fmt::Debug;

use artsearch_core::model::{ArtworkMetadata, Neighbor, Restrict};
use async_trait::async_trait;

use crate::error::PipelineResult;

/// Key-based blob storage grouped into buckets.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// List every key in `bucket`, optionally restricted to a prefix.
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> PipelineResult<Vec<String>>;

    async fn get(&self, bucket: &str, key: &str) -> PipelineResult<Vec<u8>>;

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> PipelineResult<()>;

    /// Server-side copy of an object.
    async fn copy(
        &self,
        bucket: &str,
        key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> PipelineResult<()>;
}

/// Multimodal embedding model. Images and text share one vector space.
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    async fn embed_image(&self, image: &[u8]) -> PipelineResult<Vec<f32>>;

    async fn embed_text(&self, text: &str) -> PipelineResult<Vec<f32>>;
}

/// Nearest-neighbor match against a deployed index.
#[async_trait]
pub trait NeighborSearch: Send + Sync + Debug {
    /// Return up to `num_neighbors` ids ranked by distance. An empty
    /// `restricts` slice means no filtering.
    async fn find_neighbors(
        &self,
        query: &[f32],
        num_neighbors: usize,
        restricts: &[Restrict],
    ) -> PipelineResult<Vec<Neighbor>>;
}

/// Artwork metadata lookup keyed by storage path.
#[async_trait]
pub trait MetadataLookup: Send + Sync + Debug {
    async fn lookup(&self, filename: &str) -> PipelineResult<Option<ArtworkMetadata>>;
}
