use serde::{Deserialize, Serialize};
use std::fmt;
use treadle::WorkItem;

/// One run of the indexing pipeline over a data bucket.
///
/// This is the treadle `WorkItem` that flows through the
/// generate-embeddings → update-index → deploy-index stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique ID for this run; the state store tracks progress under it.
    id: String,
    /// Bucket the images are read from.
    pub data_bucket: String,
}

impl PipelineRun {
    #[must_use]
    pub fn new(id: impl Into<String>, data_bucket: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_bucket: data_bucket.into(),
        }
    }

    /// A run with a fresh id derived from the current time.
    #[must_use]
    pub fn started_now(data_bucket: impl Into<String>) -> Self {
        let id = format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"));
        Self::new(id, data_bucket)
    }
}

impl WorkItem for PipelineRun {
    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for PipelineRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}", self.data_bucket)
    }
}
