use anyhow::{Context, Result};
use artsearch_etl::{Config, EmbeddingGenerator};

/// Embed every image in the data bucket and publish the index source files.
pub async fn run_generate(config: &Config) -> Result<()> {
    log::info!("Starting embedding generation");
    let generator =
        EmbeddingGenerator::from_config(config).context("Failed to set up embedding generation")?;
    let layout = generator.layout();

    println!("\n🎨 Generating embeddings\n");
    println!("  Images: gs://{}", layout.data_bucket);
    println!("  Output: {}", layout.contents_uri());
    println!("  Work directory: {}", config.work_dir.display());
    println!();

    let summary = generator
        .run()
        .await
        .context("Embedding generation failed")?;

    for batch in &summary.batches {
        println!(
            "  ✓ {} ({} embedded, {} quarantined)",
            batch.batch_name,
            batch.records_written,
            batch.quarantined.len()
        );
        for failure in &batch.quarantine_failed {
            eprintln!(
                "  ✗ {} could not be quarantined: {} ({})",
                failure.key, failure.error, failure.reason
            );
        }
    }

    println!("\n✓ Embedding generation complete");
    println!("  Categories: {}", summary.categories);
    println!("  Records written: {}", summary.records_written());
    println!("  Quarantined: {}", summary.quarantined());
    if summary.quarantine_failures() > 0 {
        println!("  Lost (quarantine failed): {}", summary.quarantine_failures());
    }

    Ok(())
}
