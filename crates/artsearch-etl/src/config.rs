use anyhow::{Context, Result};
use artsearch_core::model::DEFAULT_BATCH_SIZE;
use artsearch_core::BucketLayout;
use confyg::{env, Confygery};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::gcp::{GcpProject, TokenProvider};
use crate::resilience::RetryPolicy;

/// Configuration for artsearch.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (ARTSEARCH_* prefix)
/// 3. Config file (~/.config/artsearch/config.toml)
/// 4. Built-in defaults (lowest priority)
///
/// Service settings are optional at load time; commands ask for the ones
/// they need through the accessors, which fail with the name of the
/// missing setting.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Google Cloud project id.
    pub project_id: Option<String>,
    /// Numeric project number, used to name the VPC network on deploy.
    pub project_number: Option<String>,
    /// Region of the Vertex AI resources, e.g. `us-central1`.
    pub location: Option<String>,
    /// VPC network the index endpoint is peered with.
    pub network: Option<String>,

    /// Bucket holding the source images.
    pub data_bucket: Option<String>,
    /// Bucket holding the index source files.
    pub vertex_bucket: Option<String>,
    pub all_prefix: Option<String>,
    pub idx_prefix: Option<String>,
    pub fail_prefix: Option<String>,

    /// Display name of the vector index.
    pub index_name: Option<String>,
    /// Display name of the index endpoint.
    pub index_endpoint_name: Option<String>,
    /// Resource name of the endpoint queried by `query`
    /// (`projects/.../indexEndpoints/...`).
    pub index_endpoint_id: Option<String>,
    /// Deployed index id queried by `query`.
    pub deployed_index_id: Option<String>,
    /// Host serving `findNeighbors` for the endpoint. Defaults to the
    /// regional Vertex AI host.
    pub endpoint_host: Option<String>,

    /// BigQuery dataset and table holding artwork metadata.
    pub dataset: Option<String>,
    pub table: Option<String>,

    /// Static OAuth access token. When unset, tokens come from the GCE
    /// metadata server.
    ///
    /// Can be set via:
    /// - ENV: ARTSEARCH_ACCESS_TOKEN
    pub access_token: Option<String>,

    /// Embedding dimension requested from the model and used for the index.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Local directory images are mirrored to while a batch is in flight.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Images per batch; values above 100 are capped at 100.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_num_neighbors")]
    pub num_neighbors: usize,

    #[serde(default = "default_embed_rate")]
    pub embed_requests_per_second: u32,

    /// Retries for object downloads and uploads on transient errors.
    #[serde(default = "default_transfer_retries")]
    pub transfer_retries: usize,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_operation_poll_secs")]
    pub operation_poll_secs: u64,

    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Logger settings (level, colour, output).
    #[serde(default)]
    pub logging: twyg::Opts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            project_number: None,
            location: None,
            network: None,
            data_bucket: None,
            vertex_bucket: None,
            all_prefix: None,
            idx_prefix: None,
            fail_prefix: None,
            index_name: None,
            index_endpoint_name: None,
            index_endpoint_id: None,
            deployed_index_id: None,
            endpoint_host: None,
            dataset: None,
            table: None,
            access_token: None,
            dimensions: default_dimensions(),
            embedding_model: default_embedding_model(),
            work_dir: default_work_dir(),
            batch_size: default_batch_size(),
            num_neighbors: default_num_neighbors(),
            embed_requests_per_second: default_embed_rate(),
            transfer_retries: default_transfer_retries(),
            http_timeout_secs: default_http_timeout_secs(),
            operation_poll_secs: default_operation_poll_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            logging: twyg::Opts::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/artsearch/config.toml
    /// Reads environment variables with ARTSEARCH_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("artsearch");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?;

        Ok(config)
    }

    pub fn project(&self) -> PipelineResult<GcpProject> {
        Ok(GcpProject::new(
            require(self.project_id.as_ref(), "project_id")?,
            require(self.location.as_ref(), "location")?,
        ))
    }

    pub fn bucket_layout(&self) -> PipelineResult<BucketLayout> {
        Ok(BucketLayout {
            data_bucket: require(self.data_bucket.as_ref(), "data_bucket")?.to_string(),
            vertex_bucket: require(self.vertex_bucket.as_ref(), "vertex_bucket")?.to_string(),
            all_prefix: require(self.all_prefix.as_ref(), "all_prefix")?.to_string(),
            idx_prefix: require(self.idx_prefix.as_ref(), "idx_prefix")?.to_string(),
            fail_prefix: require(self.fail_prefix.as_ref(), "fail_prefix")?.to_string(),
        })
    }

    /// VPC network the index endpoint peers with:
    /// `projects/<project_number>/global/networks/<network>`.
    pub fn network_path(&self) -> PipelineResult<String> {
        Ok(format!(
            "projects/{}/global/networks/{}",
            require(self.project_number.as_ref(), "project_number")?,
            require(self.network.as_ref(), "network")?
        ))
    }

    pub fn token_provider(&self) -> PipelineResult<TokenProvider> {
        TokenProvider::from_config(self.access_token.as_deref(), self.http_timeout())
    }

    pub fn transfer_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.transfer_retries)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn operation_poll(&self) -> Duration {
        Duration::from_secs(self.operation_poll_secs.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Fetch a required setting, failing with its name when unset or empty.
pub fn require<'a>(value: Option<&'a String>, key: &'static str) -> PipelineResult<&'a str> {
    value
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::MissingSetting {
            key,
            env: key.to_uppercase(),
        })
}

fn default_dimensions() -> usize {
    1408
}

fn default_embedding_model() -> String {
    "multimodalembedding@001".to_string()
}

fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("artsearch")
        .join("work")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_num_neighbors() -> usize {
    20
}

fn default_embed_rate() -> u32 {
    2
}

fn default_transfer_retries() -> usize {
    3
}

fn default_http_timeout_secs() -> u64 {
    60
}

fn default_operation_poll_secs() -> u64 {
    30
}

fn default_operation_timeout_secs() -> u64 {
    3 * 60 * 60
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/artsearch/config.toml
/// - macOS: ~/Library/Application Support/artsearch/config.toml
/// - Windows: %APPDATA%\artsearch\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("artsearch")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Artsearch Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (ARTSEARCH_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Google Cloud project and region
project_id = "my-project"
#project_number = "123456789012"
location = "us-central1"
#network = "default"

# Storage layout
data_bucket = "art-data"
vertex_bucket = "art-vertex"
all_prefix = "all"
idx_prefix = "index"
fail_prefix = "failed"

# Vector index
index_name = "artsearch-index"
index_endpoint_name = "artsearch-endpoint"
#index_endpoint_id = "projects/123/locations/us-central1/indexEndpoints/456"
#deployed_index_id = "idx_0123456789abcdef0123456789abcdef"
#endpoint_host = "1234.us-central1-5678.vdb.vertexai.goog"
#dimensions = 1408

# Artwork metadata table (BigQuery)
#dataset = "art"
#table = "artworks"

# Static access token. When unset, tokens come from the metadata server.
# Can also be set via:
# - Environment: ARTSEARCH_ACCESS_TOKEN=$(gcloud auth print-access-token)
#access_token = ""

# Pipeline tuning
#batch_size = 100  # at most 100
#num_neighbors = 20
#embed_requests_per_second = 2
#transfer_retries = 3
#work_dir = "/var/tmp/artsearch"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
