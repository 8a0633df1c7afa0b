use anyhow::Result;
use artsearch_etl::{config, Config};

fn show(key: &str, value: Option<&String>) {
    println!("  {key}: {}", value.map_or("<not set>", String::as_str));
}

/// Show the current effective configuration.
pub fn show_config(config: &Config) -> Result<()> {
    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    show("project_id", config.project_id.as_ref());
    show("project_number", config.project_number.as_ref());
    show("location", config.location.as_ref());
    show("network", config.network.as_ref());
    show("data_bucket", config.data_bucket.as_ref());
    show("vertex_bucket", config.vertex_bucket.as_ref());
    show("all_prefix", config.all_prefix.as_ref());
    show("idx_prefix", config.idx_prefix.as_ref());
    show("fail_prefix", config.fail_prefix.as_ref());
    show("index_name", config.index_name.as_ref());
    show("index_endpoint_name", config.index_endpoint_name.as_ref());
    show("index_endpoint_id", config.index_endpoint_id.as_ref());
    show("deployed_index_id", config.deployed_index_id.as_ref());
    show("endpoint_host", config.endpoint_host.as_ref());
    show("dataset", config.dataset.as_ref());
    show("table", config.table.as_ref());
    println!(
        "  access_token: {}",
        if config.access_token.is_some() { "<set>" } else { "<not set, using metadata server>" }
    );
    println!("  dimensions: {}", config.dimensions);
    println!("  embedding_model: {}", config.embedding_model);
    println!("  work_dir: {}", config.work_dir.display());
    println!("  batch_size: {}", config.batch_size);
    println!("  num_neighbors: {}", config.num_neighbors);
    println!("  embed_requests_per_second: {}", config.embed_requests_per_second);
    println!("  transfer_retries: {}", config.transfer_retries);
    println!("  logging: {:?}", config.logging);

    println!("\nPriority: CLI args > ENV vars (ARTSEARCH_*) > Config file > Defaults");

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure artsearch.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
