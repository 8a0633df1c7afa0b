//! Error types for the embedding pipeline and its service clients.

use thiserror::Error;

/// Errors that can occur while talking to managed services or processing
/// images.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A managed service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// A response from a managed service could not be parsed.
    #[error("parse error from {service}: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },

    /// An error propagated from `reqwest` (connection, timeout, body).
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// No credentials could be obtained.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A required setting is missing.
    #[error("missing setting `{key}` (set ARTSEARCH_{env} or add it to the config file)")]
    MissingSetting { key: &'static str, env: String },

    /// An object is not present in the store.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// An image could not be decoded, resized, or encoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The embedding service returned a vector of the wrong size.
    #[error("embedding has dimension {actual}, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    /// Every image of a batch failed, leaving nothing to publish.
    #[error("{file} is empty: every image in the batch failed")]
    EmptyBatch { file: String },

    /// A query was submitted without input.
    #[error("empty {kind} query: provide {kind} input to search")]
    EmptyQuery { kind: &'static str },

    /// A long-running operation finished with an error or never finished.
    #[error("operation {name} failed: {message}")]
    Operation { name: String, message: String },

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error propagated from the core domain layer.
    #[error("domain error: {0}")]
    Core(#[from] artsearch_core::Error),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Returns `true` when the error is transient and the operation may
    /// succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns `true` when the error indicates the object was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound { .. } | Self::Status { status: 404, .. }
        )
    }
}

/// Convenience alias for pipeline results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
