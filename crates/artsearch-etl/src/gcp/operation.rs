//! Long-running operation polling for Vertex AI admin calls.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::time::{sleep, Instant};

use crate::error::{PipelineError, PipelineResult};
use crate::gcp::{check, json, TokenProvider};

const SERVICE: &str = "Vertex AI operations";

/// A `google.longrunning.Operation`.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    pub error: Option<OperationStatus>,
    /// The created or updated resource, once `done`.
    pub response: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl Operation {
    /// `name` field of the operation's response resource.
    pub fn resource_name(&self) -> Option<&str> {
        self.response.as_ref()?.get("name")?.as_str()
    }
}

/// Polls an operation at a fixed interval until it completes or the
/// deadline passes.
#[derive(Debug, Clone)]
pub struct OperationPoller {
    http: Client,
    auth: TokenProvider,
    base_url: String,
    interval: Duration,
    timeout: Duration,
}

impl OperationPoller {
    pub fn new(
        http: Client,
        auth: TokenProvider,
        base_url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            auth,
            base_url: base_url.into(),
            interval,
            timeout,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Wait for `operation` to finish, returning the final state.
    pub async fn wait(&self, mut operation: Operation) -> PipelineResult<Operation> {
        let deadline = Instant::now() + self.timeout;

        loop {
            if operation.done {
                if let Some(status) = operation.error {
                    return Err(PipelineError::Operation {
                        name: operation.name,
                        message: format!("code {}: {}", status.code, status.message),
                    });
                }
                return Ok(operation);
            }
            if Instant::now() >= deadline {
                return Err(PipelineError::Operation {
                    name: operation.name,
                    message: format!("not done after {:?}", self.timeout),
                });
            }

            log::info!("Waiting for operation {}", operation.name);
            sleep(self.interval).await;
            operation = self.get(&operation.name).await?;
        }
    }

    async fn get(&self, name: &str) -> PipelineResult<Operation> {
        let url = format!("{}/v1/{}", self.base_url.trim_end_matches('/'), name);
        let response = self
            .http
            .get(url)
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;
        let response = check(SERVICE, response).await?;
        json(SERVICE, response).await
    }
}
