use treadle::Workflow;

use crate::config::Config;
use crate::stages::{DeployIndexStage, GenerateEmbeddingsStage, UpdateIndexStage};

/// Wire the three stages into generate → update → deploy.
///
/// # Errors
/// Returns an error if the workflow cannot be built.
pub fn build_workflow(
    generate: GenerateEmbeddingsStage,
    update: UpdateIndexStage,
    deploy: DeployIndexStage,
) -> treadle::Result<Workflow> {
    Workflow::builder()
        .stage("generate-embeddings", generate)
        .stage("update-index", update)
        .stage("deploy-index", deploy)
        .dependency("update-index", "generate-embeddings")
        .dependency("deploy-index", "update-index")
        .build()
}

/// Build the full indexing pipeline from configuration.
///
/// # Errors
/// Returns an error if a required setting is missing or the workflow
/// cannot be built.
pub fn build_pipeline(config: &Config) -> treadle::Result<Workflow> {
    let generate = GenerateEmbeddingsStage::from_config(config).map_err(|e| {
        treadle::TreadleError::InvalidWorkflow(format!(
            "Failed to create generate-embeddings stage: {e}"
        ))
    })?;
    let update = UpdateIndexStage::from_config(config).map_err(|e| {
        treadle::TreadleError::InvalidWorkflow(format!("Failed to create update-index stage: {e}"))
    })?;
    let deploy = DeployIndexStage::from_config(config).map_err(|e| {
        treadle::TreadleError::InvalidWorkflow(format!("Failed to create deploy-index stage: {e}"))
    })?;

    build_workflow(generate, update, deploy)
}
