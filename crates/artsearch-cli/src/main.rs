use anyhow::{anyhow, Result};
use artsearch_etl::Config;
use clap::Parser;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "artsearch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Local work directory (default: ~/.cache/artsearch/work)
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Embed every image of the data bucket and publish index source files
    ///
    /// Lists the category directories of the data bucket and processes each
    /// one in batches of at most 100 images. For every batch:
    ///
    /// - Downloads the images to the local work directory
    /// - Shrinks each image so neither side exceeds 1024 px
    /// - Embeds each image once with the multimodal embedding model
    /// - Copies images that fail to <fail_prefix>/<category>/ in the data bucket
    /// - Writes one JSON line per embedded image and uploads the file to
    ///   <idx_prefix>/ in the vertex bucket
    /// - Removes the local copies
    ///
    /// A batch in which every image fails stops the run with an error.
    #[command(name = "generate-embeddings")]
    GenerateEmbeddings {
        /// Google Cloud project id
        #[arg(long = "project_id")]
        project_id: String,
        /// Region of the Vertex AI resources (e.g. us-central1)
        #[arg(long)]
        location: String,
        /// Bucket containing the input images
        #[arg(long = "data_bucket")]
        data_bucket: String,
        /// Bucket the embedding files are written to
        #[arg(long = "vertex_bucket")]
        vertex_bucket: String,
        /// Prefix all images are stored under
        #[arg(long = "all_prefix")]
        all_prefix: String,
        /// Prefix for index source files
        #[arg(long = "idx_prefix")]
        idx_prefix: String,
        /// Prefix failed images are copied to
        #[arg(long = "fail_prefix")]
        fail_prefix: String,
        /// Images per batch (1 to 100)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Create the vector index, or update it from newly published files
    #[command(name = "update-index")]
    UpdateIndex,
    /// Deploy the vector index to its endpoint
    #[command(name = "deploy-index")]
    DeployIndex,
    /// Run generate-embeddings, update-index and deploy-index in order
    Pipeline {
        /// Run id tracked by the state store (default: derived from the time)
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Search the collection
    Query {
        #[command(subcommand)]
        query: commands::query::QueryCommand,

        /// Restrict results to a category (repeatable)
        #[arg(long = "category", global = true)]
        categories: Vec<String>,

        /// Number of results
        #[arg(long, global = true)]
        num_neighbors: Option<usize>,

        /// Print results as JSON
        #[arg(long, global = true)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = work_dir;
    }

    twyg::setup(config.logging.clone()).map_err(|e| anyhow!("Failed to set up logging: {e:?}"))?;

    match cli.command {
        Commands::GenerateEmbeddings {
            project_id,
            location,
            data_bucket,
            vertex_bucket,
            all_prefix,
            idx_prefix,
            fail_prefix,
            batch_size,
        } => {
            config.project_id = Some(project_id);
            config.location = Some(location);
            config.data_bucket = Some(data_bucket);
            config.vertex_bucket = Some(vertex_bucket);
            config.all_prefix = Some(all_prefix);
            config.idx_prefix = Some(idx_prefix);
            config.fail_prefix = Some(fail_prefix);
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            commands::run_generate(&config).await?;
        }
        Commands::UpdateIndex => {
            commands::run_update_index(&config).await?;
        }
        Commands::DeployIndex => {
            commands::run_deploy_index(&config).await?;
        }
        Commands::Pipeline { run_id } => {
            commands::run_pipeline(&config, run_id).await?;
        }
        Commands::Query {
            query,
            categories,
            num_neighbors,
            json,
        } => {
            commands::run_query(&config, query, categories, num_neighbors, json).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show_config(&config)?,
            ConfigAction::Path => commands::config::show_path()?,
            ConfigAction::Example => commands::config::show_example()?,
            ConfigAction::Init => commands::config::init_config()?,
        },
    }

    Ok(())
}
