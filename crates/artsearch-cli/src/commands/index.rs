use anyhow::{Context, Result};
use artsearch_etl::{Config, DeployIndexStage, PipelineRun, UpdateIndexStage};
use treadle::{Stage, StageContext};

fn single_run(config: &Config) -> PipelineRun {
    PipelineRun::started_now(config.data_bucket.clone().unwrap_or_default())
}

/// Create or update the vector index from the published source files.
pub async fn run_update_index(config: &Config) -> Result<()> {
    log::info!("Starting index update");
    let stage = UpdateIndexStage::from_config(config).context("Failed to set up index update")?;

    println!("📇 Updating index (this can take a long time)...");
    let mut ctx = StageContext::new(stage.name().to_string());
    stage
        .execute(&single_run(config), &mut ctx)
        .await
        .context("Index update failed")?;

    if let Some(name) = ctx.metadata.get("index_name").and_then(|v| v.as_str()) {
        println!("  ✓ Index ready: {name}");
    }
    Ok(())
}

/// Deploy the vector index to its endpoint.
pub async fn run_deploy_index(config: &Config) -> Result<()> {
    log::info!("Starting index deployment");
    let stage = DeployIndexStage::from_config(config).context("Failed to set up deployment")?;

    println!("🚀 Deploying index (this can take a long time)...");
    let mut ctx = StageContext::new(stage.name().to_string());
    stage
        .execute(&single_run(config), &mut ctx)
        .await
        .context("Deployment failed")?;

    let endpoint = ctx.metadata.get("index_endpoint").and_then(|v| v.as_str());
    let deployed = ctx.metadata.get("deployed_index_id").and_then(|v| v.as_str());
    if let (Some(endpoint), Some(deployed)) = (endpoint, deployed) {
        println!("  ✓ Deployed as {deployed}");
        println!("\nTo query it, set:");
        println!("  index_endpoint_id = \"{endpoint}\"");
        println!("  deployed_index_id = \"{deployed}\"");
    }
    Ok(())
}
