//! Google Cloud Storage JSON API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::gcp::{check, http_client, json, TokenProvider};
use crate::traits::ObjectStore;

const GCS_API_BASE: &str = "https://storage.googleapis.com";
const SERVICE: &str = "Cloud Storage";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectMeta>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

/// Cloud Storage client.
///
/// Object names are percent-encoded as single path segments, so keys
/// containing `/` address nested objects correctly.
#[derive(Debug, Clone)]
pub struct GcsClient {
    http: Client,
    auth: TokenProvider,
    base_url: String,
}

impl GcsClient {
    pub fn new(auth: TokenProvider, timeout: Duration) -> PipelineResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            auth,
            base_url: GCS_API_BASE.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build `<base>/<fixed...>/<segments...>` with each segment encoded.
    fn url(&self, segments: &[&str]) -> PipelineResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| PipelineError::Parse {
            service: SERVICE,
            message: format!("invalid base URL {}: {e}", self.base_url),
        })?;
        url.path_segments_mut()
            .map_err(|()| PipelineError::Parse {
                service: SERVICE,
                message: format!("base URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> PipelineResult<Vec<String>> {
        let url = self.url(&["storage", "v1", "b", bucket, "o"])?;
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(url.clone())
                .bearer_auth(self.auth.token().await?)
                .query(&[("fields", "items(name),nextPageToken")]);
            if let Some(prefix) = prefix {
                request = request.query(&[("prefix", prefix)]);
            }
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = check(SERVICE, request.send().await?).await?;
            let page: ListResponse = json(SERVICE, response).await?;
            keys.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> PipelineResult<Vec<u8>> {
        let url = self.url(&["storage", "v1", "b", bucket, "o", key])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.auth.token().await?)
            .query(&[("alt", "media")])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PipelineError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        let response = check(SERVICE, response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> PipelineResult<()> {
        let url = self.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(self.auth.token().await?)
            .query(&[("uploadType", "media"), ("name", key)])
            .header(reqwest::header::CONTENT_TYPE, content_type(key))
            .body(data)
            .send()
            .await?;
        check(SERVICE, response).await?;
        Ok(())
    }

    async fn copy(
        &self,
        bucket: &str,
        key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> PipelineResult<()> {
        let url = self.url(&[
            "storage", "v1", "b", bucket, "o", key, "copyTo", "b", dest_bucket, "o", dest_key,
        ])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(self.auth.token().await?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PipelineError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        check(SERVICE, response).await?;
        Ok(())
    }
}

fn content_type(key: &str) -> &'static str {
    let lower = key.to_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> GcsClient {
        GcsClient::new(
            TokenProvider::Static("test-token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_list_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/art-data/o"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"name": "all/cubism/c.jpg"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/art-data/o"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"name": "all/cubism/a.jpg"}, {"name": "all/cubism/b.jpg"}],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let keys = client(&server).await.list("art-data", None).await.unwrap();
        assert_eq!(
            keys,
            vec!["all/cubism/a.jpg", "all/cubism/b.jpg", "all/cubism/c.jpg"]
        );
    }

    #[tokio::test]
    async fn test_get_encodes_key_as_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/art-data/o/all%2Fcubism%2Fa.jpg"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let bytes = client(&server)
            .await
            .get("art-data", "all/cubism/a.jpg")
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .get("art-data", "missing.jpg")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_uploads_media() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/art-vertex/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "index/batch.json"))
            .and(header("content-type", "application/json"))
            .and(body_bytes(b"{\"id\":\"a\"}\n".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .put("art-vertex", "index/batch.json", b"{\"id\":\"a\"}\n".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .put("b", "k.jpg", vec![0])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_copy_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/storage/v1/b/art-data/o/all%2Fcubism%2Fa.jpg/copyTo/b/art-data/o/failed%2Fcubism%2Fa.jpg",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .copy("art-data", "all/cubism/a.jpg", "art-data", "failed/cubism/a.jpg")
            .await
            .unwrap();
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("a/B.JPG"), "image/jpeg");
        assert_eq!(content_type("x.json"), "application/json");
        assert_eq!(content_type("x.bin"), "application/octet-stream");
    }
}
