//! OAuth bearer tokens for the Google APIs.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{PipelineError, PipelineResult};
use crate::gcp::{check, http_client, json};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Supplies bearer tokens to the service clients.
#[derive(Debug, Clone)]
pub enum TokenProvider {
    /// A token supplied through configuration, used as-is.
    Static(String),
    /// Tokens fetched from the compute metadata server and cached until
    /// shortly before they expire.
    MetadataServer(Arc<MetadataServer>),
}

impl TokenProvider {
    /// Use the configured token when present, the metadata server otherwise.
    pub fn from_config(access_token: Option<&str>, timeout: Duration) -> PipelineResult<Self> {
        match access_token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(Self::Static(token.to_string())),
            None => Self::metadata_server(METADATA_TOKEN_URL, timeout),
        }
    }

    pub fn metadata_server(url: impl Into<String>, timeout: Duration) -> PipelineResult<Self> {
        Ok(Self::MetadataServer(Arc::new(MetadataServer {
            http: http_client(timeout)?,
            url: url.into(),
            cached: Mutex::new(None),
        })))
    }

    /// Return a valid access token.
    pub async fn token(&self) -> PipelineResult<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::MetadataServer(server) => server.token().await,
        }
    }
}

/// Token source backed by the compute metadata server.
#[derive(Debug)]
pub struct MetadataServer {
    http: Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServer {
    async fn token(&self) -> PipelineResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        log::debug!("Fetching access token from {}", self.url);
        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| PipelineError::Auth(format!("metadata server unreachable: {e}")))?;
        let response = check("metadata server", response).await?;
        let body: TokenResponse = json("metadata server", response).await?;

        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(body.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_static_token() {
        let provider = TokenProvider::from_config(Some("abc"), Duration::from_secs(5)).unwrap();
        assert_eq!(provider.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "from-metadata",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = TokenProvider::metadata_server(
            format!("{}/token", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(provider.token().await.unwrap(), "from-metadata");
        assert_eq!(provider.token().await.unwrap(), "from-metadata");
    }

    #[tokio::test]
    async fn test_metadata_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let provider =
            TokenProvider::metadata_server(server.uri(), Duration::from_secs(5)).unwrap();
        let err = provider.token().await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
