//! Treadle stages of the indexing pipeline.
//!
//! `generate-embeddings` publishes index source files, `update-index`
//! builds or refreshes the index from them, and `deploy-index` serves the
//! index from an endpoint. Each stage records what it produced in the
//! stage context metadata.

use treadle::{Stage, StageContext, StageOutcome, TreadleError};

use crate::config::{require, Config};
use crate::error::PipelineError;
use crate::gcp::index::new_deployed_index_id;
use crate::gcp::{IndexAdminClient, IndexSpec};
use crate::generate::EmbeddingGenerator;

fn stage_error(what: &str, e: &PipelineError) -> TreadleError {
    TreadleError::StageExecution(format!("{what}: {e}"))
}

/// Build the index admin client described by `config`.
pub fn index_admin(config: &Config) -> Result<IndexAdminClient, PipelineError> {
    IndexAdminClient::new(
        config.project()?,
        config.token_provider()?,
        config.http_timeout(),
        config.operation_poll(),
        config.operation_timeout(),
    )
}

/// The Generate Embeddings stage: embed every image and publish the
/// index source files.
#[derive(Debug)]
pub struct GenerateEmbeddingsStage {
    generator: EmbeddingGenerator,
}

impl GenerateEmbeddingsStage {
    #[must_use]
    pub fn new(generator: EmbeddingGenerator) -> Self {
        Self { generator }
    }

    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        Ok(Self::new(EmbeddingGenerator::from_config(config)?))
    }
}

#[async_trait::async_trait]
impl Stage for GenerateEmbeddingsStage {
    fn name(&self) -> &str {
        "generate-embeddings"
    }

    async fn execute(
        &self,
        item: &dyn treadle::WorkItem,
        ctx: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        log::info!("Generating embeddings for {}", item.id());

        let summary = self
            .generator
            .run()
            .await
            .map_err(|e| stage_error("Embedding generation failed", &e))?;

        let summary_json = serde_json::to_value(&summary).map_err(|e| {
            TreadleError::StageExecution(format!("Failed to serialize run summary: {e}"))
        })?;
        ctx.metadata.insert("run_summary".to_string(), summary_json);

        log::info!(
            "Generated {} records across {} categories ({} quarantined)",
            summary.records_written(),
            summary.categories,
            summary.quarantined()
        );
        Ok(StageOutcome::Complete)
    }
}

/// The Update Index stage: create the index from the published source
/// files, or incrementally update it when it already exists.
#[derive(Debug)]
pub struct UpdateIndexStage {
    admin: IndexAdminClient,
    spec: IndexSpec,
}

impl UpdateIndexStage {
    #[must_use]
    pub fn new(admin: IndexAdminClient, spec: IndexSpec) -> Self {
        Self { admin, spec }
    }

    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let spec = IndexSpec::tree_ah(
            require(config.index_name.as_ref(), "index_name")?,
            config.bucket_layout()?.contents_uri(),
            config.dimensions,
        );
        Ok(Self::new(index_admin(config)?, spec))
    }
}

#[async_trait::async_trait]
impl Stage for UpdateIndexStage {
    fn name(&self) -> &str {
        "update-index"
    }

    async fn execute(
        &self,
        _item: &dyn treadle::WorkItem,
        ctx: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        let index_name = self
            .admin
            .create_or_update_index(&self.spec)
            .await
            .map_err(|e| stage_error("Index update failed", &e))?;

        log::info!("Index {} is up to date", index_name);
        ctx.metadata
            .insert("index_name".to_string(), serde_json::Value::String(index_name));
        Ok(StageOutcome::Complete)
    }
}

/// The Deploy Index stage: deploy the index to its endpoint, creating
/// the endpoint on first use.
#[derive(Debug)]
pub struct DeployIndexStage {
    admin: IndexAdminClient,
    index_display_name: String,
    endpoint_display_name: String,
    network: String,
}

impl DeployIndexStage {
    #[must_use]
    pub fn new(
        admin: IndexAdminClient,
        index_display_name: impl Into<String>,
        endpoint_display_name: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            admin,
            index_display_name: index_display_name.into(),
            endpoint_display_name: endpoint_display_name.into(),
            network: network.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        Ok(Self::new(
            index_admin(config)?,
            require(config.index_name.as_ref(), "index_name")?,
            require(config.index_endpoint_name.as_ref(), "index_endpoint_name")?,
            config.network_path()?,
        ))
    }
}

#[async_trait::async_trait]
impl Stage for DeployIndexStage {
    fn name(&self) -> &str {
        "deploy-index"
    }

    async fn execute(
        &self,
        _item: &dyn treadle::WorkItem,
        ctx: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        // Stages share no outputs, so the index is looked up again by name.
        let index = self
            .admin
            .find_index(&self.index_display_name)
            .await
            .map_err(|e| stage_error("Index lookup failed", &e))?
            .ok_or_else(|| {
                TreadleError::StageExecution(format!(
                    "No index named {} to deploy",
                    self.index_display_name
                ))
            })?;

        let endpoint = self
            .admin
            .find_or_create_endpoint(&self.endpoint_display_name, &self.network)
            .await
            .map_err(|e| stage_error("Endpoint setup failed", &e))?;

        let deployed_index_id = new_deployed_index_id();
        self.admin
            .deploy_index(&endpoint, &index.name, &deployed_index_id)
            .await
            .map_err(|e| stage_error("Deployment failed", &e))?;

        log::info!(
            "Deployed {} to {} as {}",
            index.name,
            endpoint,
            deployed_index_id
        );
        ctx.metadata.insert(
            "index_endpoint".to_string(),
            serde_json::Value::String(endpoint),
        );
        ctx.metadata.insert(
            "deployed_index_id".to_string(),
            serde_json::Value::String(deployed_index_id),
        );
        Ok(StageOutcome::Complete)
    }
}
