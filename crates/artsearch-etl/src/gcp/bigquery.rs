//! BigQuery metadata lookups through `jobs.query`.

use std::time::Duration;

use artsearch_core::model::ArtworkMetadata;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::{PipelineError, PipelineResult};
use crate::gcp::{check, http_client, json, TokenProvider};
use crate::traits::MetadataLookup;

const BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com";
const SERVICE: &str = "BigQuery";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: Option<bool>,
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: Option<serde_json::Value>,
}

impl Cell {
    fn text(&self) -> String {
        match &self.v {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Looks up artwork metadata by filename in `<project>.<dataset>.<table>`.
#[derive(Debug, Clone)]
pub struct BigQueryClient {
    http: Client,
    auth: TokenProvider,
    base_url: String,
    project_id: String,
    table: String,
}

impl BigQueryClient {
    pub fn new(
        project_id: impl Into<String>,
        dataset: &str,
        table: &str,
        auth: TokenProvider,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let project_id = project_id.into();
        Ok(Self {
            http: http_client(timeout)?,
            auth,
            base_url: BIGQUERY_API_BASE.to_string(),
            table: format!("{project_id}.{dataset}.{table}"),
            project_id,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn sql(&self) -> String {
        format!(
            "SELECT artist, genre, description FROM `{}` WHERE filename = @filename",
            self.table
        )
    }
}

#[async_trait]
impl MetadataLookup for BigQueryClient {
    async fn lookup(&self, filename: &str) -> PipelineResult<Option<ArtworkMetadata>> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/queries",
            self.base_url.trim_end_matches('/'),
            self.project_id
        );
        let body = json!({
            "query": self.sql(),
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": [{
                "name": "filename",
                "parameterType": {"type": "STRING"},
                "parameterValue": {"value": filename}
            }]
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(self.auth.token().await?)
            .json(&body)
            .send()
            .await?;
        let response = check(SERVICE, response).await?;
        let result: QueryResponse = json(SERVICE, response).await?;

        if result.job_complete == Some(false) {
            return Err(PipelineError::Parse {
                service: SERVICE,
                message: format!("query for {filename} did not complete in time"),
            });
        }

        let Some(row) = result.rows.into_iter().next() else {
            log::debug!("No metadata for {}", filename);
            return Ok(None);
        };
        // Column order follows the SELECT list.
        let [artist, genre, description] = match row.f.as_slice() {
            [a, g, d, ..] => [a.text(), g.text(), d.text()],
            _ => {
                return Err(PipelineError::Parse {
                    service: SERVICE,
                    message: format!("expected 3 columns, got {}", row.f.len()),
                })
            }
        };

        Ok(Some(ArtworkMetadata {
            artist,
            description,
            genre,
        }))
    }
}
