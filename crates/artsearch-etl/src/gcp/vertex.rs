//! Vertex AI multimodal embedding client.
//!
//! Calls the `:predict` method of a multimodal embedding publisher model.
//! Images are sent inline as base64; text is sent as-is. Both modalities
//! return vectors in the same space, so a text query can match images.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::gcp::{check, http_client, json, GcpProject, TokenProvider};
use crate::resilience::RateLimiter;
use crate::traits::Embedder;

const SERVICE: &str = "Vertex AI embeddings";

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Instance<'a> {
    Image(ImagePayload),
    Text(&'a str),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagePayload {
    bytes_base64_encoded: String,
}

#[derive(Debug, Serialize)]
struct Parameters {
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    image_embedding: Option<Vec<f32>>,
    text_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy)]
enum Modality {
    Image,
    Text,
}

/// Embedding client for a Vertex AI multimodal model.
///
/// Exactly one `:predict` call is made per input; failures are returned
/// to the caller rather than retried. Calls share a [`RateLimiter`] to
/// stay inside the model's per-minute quota.
#[derive(Debug, Clone)]
pub struct VertexEmbedder {
    http: Client,
    auth: TokenProvider,
    endpoint: String,
    dimension: usize,
    rate_limiter: RateLimiter,
}

impl VertexEmbedder {
    pub fn new(
        project: &GcpProject,
        model: &str,
        dimension: usize,
        auth: TokenProvider,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            auth,
            endpoint: predict_url(&project.aiplatform_base(), project, model),
            dimension,
            rate_limiter: RateLimiter::new(0),
        })
    }

    /// Point the client at another host (used for testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str, project: &GcpProject, model: &str) -> Self {
        self.endpoint = predict_url(base_url, project, model);
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.rate_limiter = RateLimiter::new(requests_per_second);
        self
    }

    async fn predict(&self, instance: Instance<'_>, modality: Modality) -> PipelineResult<Vec<f32>> {
        self.rate_limiter.acquire().await;

        let request = PredictRequest {
            instances: [instance],
            parameters: Parameters {
                dimension: self.dimension,
            },
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.auth.token().await?)
            .json(&request)
            .send()
            .await?;
        let response = check(SERVICE, response).await?;
        let body: PredictResponse = json(SERVICE, response).await?;

        let prediction = body
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Parse {
                service: SERVICE,
                message: "response contained no predictions".to_string(),
            })?;
        let embedding = match modality {
            Modality::Image => prediction.image_embedding,
            Modality::Text => prediction.text_embedding,
        }
        .ok_or_else(|| PipelineError::Parse {
            service: SERVICE,
            message: format!("prediction has no {modality:?} embedding"),
        })?;

        if embedding.len() != self.dimension {
            return Err(PipelineError::Dimension {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for VertexEmbedder {
    async fn embed_image(&self, image: &[u8]) -> PipelineResult<Vec<f32>> {
        let payload = ImagePayload {
            bytes_base64_encoded: base64::engine::general_purpose::STANDARD.encode(image),
        };
        self.predict(Instance::Image(payload), Modality::Image).await
    }

    async fn embed_text(&self, text: &str) -> PipelineResult<Vec<f32>> {
        self.predict(Instance::Text(text), Modality::Text).await
    }
}

fn predict_url(base_url: &str, project: &GcpProject, model: &str) -> String {
    format!(
        "{}/v1/{}/publishers/google/models/{}:predict",
        base_url.trim_end_matches('/'),
        project.parent(),
        model
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "multimodalembedding@001";
    const PREDICT_PATH: &str =
        "/v1/projects/art-proj/locations/us-central1/publishers/google/models/multimodalembedding@001:predict";

    fn embedder(server: &MockServer, dimension: usize) -> VertexEmbedder {
        let project = GcpProject::new("art-proj", "us-central1");
        VertexEmbedder::new(
            &project,
            MODEL,
            dimension,
            TokenProvider::Static("t".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(&server.uri(), &project, MODEL)
    }

    #[tokio::test]
    async fn test_embed_image_sends_base64() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT_PATH))
            .and(body_partial_json(json!({
                "instances": [{"image": {"bytesBase64Encoded": "AQID"}}],
                "parameters": {"dimension": 3}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{"imageEmbedding": [0.1, 0.2, 0.3]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vector = embedder(&server, 3).embed_image(&[1, 2, 3]).await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICT_PATH))
            .and(body_partial_json(json!({"instances": [{"text": "water lilies"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{"textEmbedding": [1.0, 0.0]}]
            })))
            .mount(&server)
            .await;

        let vector = embedder(&server, 2).embed_text("water lilies").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{"imageEmbedding": [0.1]}]
            })))
            .mount(&server)
            .await;

        let err = embedder(&server, 3).embed_image(&[0]).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Dimension {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_call_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        assert!(embedder(&server, 3).embed_text("x").await.is_err());
    }
}
