use anyhow::{Context, Result};
use artsearch_core::model::{Category, Match};
use artsearch_etl::{Config, QueryService};
use std::path::PathBuf;

#[derive(Debug, clap::Subcommand)]
pub enum QueryCommand {
    /// Find artworks matching a text description
    Text {
        /// The description to search for
        text: String,
    },
    /// Find artworks similar to an image file
    Image {
        /// Path to the query image
        path: PathBuf,
    },
}

/// Run an image or text query and print the matches.
pub async fn run_query(
    config: &Config,
    query: QueryCommand,
    categories: Vec<String>,
    num_neighbors: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut service = QueryService::from_config(config).context("Failed to set up search")?;
    if let Some(n) = num_neighbors {
        service = service.with_num_neighbors(n);
    }
    let categories: Vec<Category> = categories.into_iter().map(Category::new).collect();
    log::debug!("Querying with category filter {:?}", categories);

    let matches = match query {
        QueryCommand::Text { text } => service.text_query(&text, &categories).await?,
        QueryCommand::Image { path } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            service.image_query(&bytes, &categories).await?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
    } else {
        print_matches(&matches);
    }
    Ok(())
}

fn print_matches(matches: &[Match]) {
    if matches.is_empty() {
        println!("No matches.");
        return;
    }
    for (rank, m) in matches.iter().enumerate() {
        println!("{:>3}. {}", rank + 1, m.label);
        println!("     https://storage.cloud.google.com/{}", m.path);
    }
}
