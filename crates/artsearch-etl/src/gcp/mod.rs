//! Clients for the managed Google Cloud services the pipeline delegates to.
//!
//! Each client speaks the service's REST API through `reqwest` and takes a
//! base URL so tests can point it at a mock server.

pub mod auth;
pub mod bigquery;
pub mod index;
pub mod operation;
pub mod storage;
pub mod vertex;

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{PipelineError, PipelineResult};

pub use auth::TokenProvider;
pub use bigquery::BigQueryClient;
pub use index::{IndexAdminClient, IndexSpec, MatchClient};
pub use storage::GcsClient;
pub use vertex::VertexEmbedder;

const USER_AGENT: &str = "artsearch/0.1.0";

/// Project and region that Vertex AI resources live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpProject {
    pub id: String,
    pub location: String,
}

impl GcpProject {
    #[must_use]
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
        }
    }

    /// `projects/<id>/locations/<location>`.
    #[must_use]
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.id, self.location)
    }

    /// Regional Vertex AI API host.
    #[must_use]
    pub fn aiplatform_base(&self) -> String {
        format!("https://{}-aiplatform.googleapis.com", self.location)
    }
}

/// Build the shared HTTP client used by every service client.
pub(crate) fn http_client(timeout: Duration) -> PipelineResult<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Turn a non-success response into [`PipelineError::Status`], keeping the
/// response body as the message.
pub(crate) async fn check(service: &'static str, response: Response) -> PipelineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(PipelineError::Status {
        service,
        status: status.as_u16(),
        message,
    })
}

/// Decode a JSON body, reporting failures against the service name.
pub(crate) async fn json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> PipelineResult<T> {
    response.json().await.map_err(|e| PipelineError::Parse {
        service,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_paths() {
        let project = GcpProject::new("art-proj", "us-central1");
        assert_eq!(project.parent(), "projects/art-proj/locations/us-central1");
        assert_eq!(
            project.aiplatform_base(),
            "https://us-central1-aiplatform.googleapis.com"
        );
    }
}
