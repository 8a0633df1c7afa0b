//! Interactive image and text search.

use std::sync::{Arc, LazyLock};

use artsearch_core::model::{Category, Match, Neighbor, Restrict};
use artsearch_core::BucketLayout;
use regex::Regex;

use crate::config::{require, Config};
use crate::error::{PipelineError, PipelineResult};
use crate::gcp::{BigQueryClient, MatchClient, VertexEmbedder};
use crate::preprocess::downscale_bytes;
use crate::traits::{Embedder, MetadataLookup, NeighborSearch};

/// Artwork ids look like `<artist-slug>_<title-slug>`.
static ARTWORK_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<artist>[^_]+)_(?P<title>.+)$").ok());

/// Answers search queries against the deployed index.
#[derive(Debug, Clone)]
pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn NeighborSearch>,
    metadata: Arc<dyn MetadataLookup>,
    layout: BucketLayout,
    num_neighbors: usize,
}

impl QueryService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn NeighborSearch>,
        metadata: Arc<dyn MetadataLookup>,
        layout: BucketLayout,
        num_neighbors: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            metadata,
            layout,
            num_neighbors,
        }
    }

    /// Wire the embedding model, the deployed index, and the metadata
    /// table from `config`.
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        let auth = config.token_provider()?;
        let project = config.project()?;
        let timeout = config.http_timeout();

        let embedder = VertexEmbedder::new(
            &project,
            &config.embedding_model,
            config.dimensions,
            auth.clone(),
            timeout,
        )?;
        let host = config
            .endpoint_host
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| project.aiplatform_base());
        let index = MatchClient::new(
            &host,
            require(config.index_endpoint_id.as_ref(), "index_endpoint_id")?,
            require(config.deployed_index_id.as_ref(), "deployed_index_id")?,
            auth.clone(),
            timeout,
        )?;
        let metadata = BigQueryClient::new(
            project.id.clone(),
            require(config.dataset.as_ref(), "dataset")?,
            require(config.table.as_ref(), "table")?,
            auth,
            timeout,
        )?;

        // Only the data bucket and image prefix matter for result paths.
        let layout = BucketLayout {
            data_bucket: require(config.data_bucket.as_ref(), "data_bucket")?.to_string(),
            all_prefix: require(config.all_prefix.as_ref(), "all_prefix")?.to_string(),
            vertex_bucket: config.vertex_bucket.clone().unwrap_or_default(),
            idx_prefix: config.idx_prefix.clone().unwrap_or_default(),
            fail_prefix: config.fail_prefix.clone().unwrap_or_default(),
        };

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(index),
            Arc::new(metadata),
            layout,
            config.num_neighbors,
        ))
    }

    #[must_use]
    pub fn with_num_neighbors(mut self, num_neighbors: usize) -> Self {
        self.num_neighbors = num_neighbors;
        self
    }

    /// Find artworks similar to an image.
    ///
    /// # Errors
    /// Only empty input is an error. Embedding or matching failures are
    /// logged and yield an empty list.
    pub async fn image_query(
        &self,
        image: &[u8],
        categories: &[Category],
    ) -> PipelineResult<Vec<Match>> {
        if image.is_empty() {
            return Err(PipelineError::EmptyQuery { kind: "image" });
        }

        let result: PipelineResult<Vec<Match>> = async {
            let jpeg = downscale_bytes(image.to_vec()).await?;
            let embedding = self.embedder.embed_image(&jpeg).await?;
            self.matches(&embedding, categories).await
        }
        .await;
        Ok(result.unwrap_or_else(|e| {
            log::error!("Image query failed: {}", e);
            Vec::new()
        }))
    }

    /// Find artworks matching a text description.
    ///
    /// # Errors
    /// Only blank input is an error. Embedding or matching failures are
    /// logged and yield an empty list. The text is embedded as given.
    pub async fn text_query(&self, text: &str, categories: &[Category]) -> PipelineResult<Vec<Match>> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyQuery { kind: "text" });
        }

        let result: PipelineResult<Vec<Match>> = async {
            let embedding = self.embedder.embed_text(text).await?;
            self.matches(&embedding, categories).await
        }
        .await;
        Ok(result.unwrap_or_else(|e| {
            log::error!("Text query failed: {}", e);
            Vec::new()
        }))
    }

    async fn matches(&self, embedding: &[f32], categories: &[Category]) -> PipelineResult<Vec<Match>> {
        let restricts = Restrict::for_categories(categories);
        let neighbors = self
            .index
            .find_neighbors(embedding, self.num_neighbors, &restricts)
            .await?;
        log::debug!("Index returned {} neighbors", neighbors.len());

        let mut matches = Vec::with_capacity(neighbors.len());
        for Neighbor { id, .. } in neighbors {
            let path = self.layout.artwork_path(&id);
            let label = self.label(&id, &path).await;
            matches.push(Match { path, label });
        }
        Ok(matches)
    }

    async fn label(&self, id: &str, path: &str) -> String {
        match self.metadata.lookup(path).await {
            Ok(Some(metadata)) => metadata.label(),
            Ok(None) => fallback_label(id),
            Err(e) => {
                log::warn!("Metadata lookup for {} failed: {}", id, e);
                fallback_label(id)
            }
        }
    }
}

/// Label derived from the id alone, e.g. `claude-monet_water-lilies`
/// becomes `Claude Monet - Water Lilies`.
pub fn fallback_label(id: &str) -> String {
    let parts = ARTWORK_ID
        .as_ref()
        .and_then(|re| re.captures(id))
        .and_then(|caps| Some((caps.name("artist")?.as_str(), caps.name("title")?.as_str())));

    match parts {
        Some((artist, title)) => format!("{} - {}", humanize(artist), humanize(title)),
        None => humanize(id),
    }
}

fn humanize(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
