use anyhow::{Context, Result};
use artsearch_etl::{build_pipeline, Config, PipelineRun};

/// Run the full indexing pipeline through the treadle workflow.
///
/// Stages:
/// 1. generate-embeddings - embed images and publish index source files
/// 2. update-index - create or incrementally update the index
/// 3. deploy-index - deploy the index to its endpoint
pub async fn run_pipeline(config: &Config, run_id: Option<String>) -> Result<()> {
    log::info!("Starting indexing pipeline");
    let data_bucket = config.data_bucket.clone().unwrap_or_default();
    let work_item = match run_id {
        Some(id) => PipelineRun::new(id, data_bucket),
        None => PipelineRun::started_now(data_bucket),
    };

    println!("\n🎨 Artsearch Indexing Pipeline\n");
    println!("  Run: {}", treadle::WorkItem::id(&work_item));
    println!("  Images: {work_item}");
    println!();

    let workflow = build_pipeline(config).context("Failed to build pipeline")?;

    std::fs::create_dir_all(&config.work_dir).context("Failed to create work directory")?;
    let state_path = config.work_dir.join("pipeline.db");
    let mut store = treadle::SqliteStateStore::open(&state_path)
        .await
        .context("Failed to open pipeline state store")?;

    // Subscribe to events for progress display
    let mut events = workflow.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                treadle::WorkflowEvent::StageStarted { stage, .. } => {
                    println!("  ⏳ [{stage}] Starting...");
                }
                treadle::WorkflowEvent::StageCompleted { stage, .. } => {
                    println!("  ✓ [{stage}] Complete");
                }
                treadle::WorkflowEvent::StageFailed { stage, error, .. } => {
                    log::error!("Stage {} failed: {}", stage, error);
                    eprintln!("  ✗ [{stage}] FAILED: {error}");
                }
                _ => {}
            }
        }
    });

    workflow
        .advance(&work_item, &mut store)
        .await
        .context("Pipeline execution failed")?;

    println!("\n✓ Indexing pipeline complete!");
    println!("\nNext steps:");
    println!("  - Set index_endpoint_id and deployed_index_id in the config file");
    println!("  - Run 'artsearch query text \"...\"' to search");

    Ok(())
}
