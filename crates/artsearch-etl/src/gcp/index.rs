//! Vertex AI Vector Search clients.
//!
//! [`IndexAdminClient`] builds, updates, and deploys the index;
//! [`MatchClient`] queries a deployed index. Index contents always come
//! from the newline-delimited JSON files the pipeline publishes under the
//! index source prefix.

use std::time::Duration;

use artsearch_core::model::{Neighbor, Restrict};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::gcp::operation::{Operation, OperationPoller};
use crate::gcp::{check, http_client, json, GcpProject, TokenProvider};
use crate::traits::NeighborSearch;

const SERVICE: &str = "Vertex AI Vector Search";

/// Parameters of a tree-AH index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub display_name: String,
    /// `gs://` directory holding the index source files.
    pub contents_uri: String,
    pub dimensions: usize,
    pub approximate_neighbors_count: u32,
    pub distance_measure_type: String,
    pub leaf_node_embedding_count: u32,
    pub leaf_nodes_to_search_percent: u32,
}

impl IndexSpec {
    /// Tree-AH index with the tuning used for the art collection.
    #[must_use]
    pub fn tree_ah(
        display_name: impl Into<String>,
        contents_uri: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            contents_uri: contents_uri.into(),
            dimensions,
            approximate_neighbors_count: 150,
            distance_measure_type: "DOT_PRODUCT_DISTANCE".to_string(),
            leaf_node_embedding_count: 500,
            leaf_nodes_to_search_percent: 7,
        }
    }

    fn to_request(&self) -> serde_json::Value {
        json!({
            "displayName": self.display_name,
            "indexUpdateMethod": "BATCH_UPDATE",
            "metadata": {
                "contentsDeltaUri": self.contents_uri,
                "config": {
                    "dimensions": self.dimensions,
                    "approximateNeighborsCount": self.approximate_neighbors_count,
                    "distanceMeasureType": self.distance_measure_type,
                    "algorithmConfig": {
                        "treeAhConfig": {
                            "leafNodeEmbeddingCount": self.leaf_node_embedding_count,
                            "leafNodesToSearchPercent": self.leaf_nodes_to_search_percent
                        }
                    }
                }
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResource {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEndpointResource {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub deployed_indexes: Vec<DeployedIndex>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployedIndex {
    pub id: String,
    pub index: String,
}

#[derive(Debug, Deserialize)]
struct ListIndexesResponse {
    #[serde(default)]
    indexes: Vec<IndexResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEndpointsResponse {
    #[serde(default)]
    index_endpoints: Vec<IndexEndpointResource>,
}

/// A fresh deployed-index id: `idx_` followed by 32 hex characters.
#[must_use]
pub fn new_deployed_index_id() -> String {
    format!("idx_{}", Uuid::new_v4().simple())
}

/// Admin client for indexes and index endpoints.
#[derive(Debug, Clone)]
pub struct IndexAdminClient {
    http: Client,
    auth: TokenProvider,
    base_url: String,
    project: GcpProject,
    poller: OperationPoller,
}

impl IndexAdminClient {
    pub fn new(
        project: GcpProject,
        auth: TokenProvider,
        timeout: Duration,
        poll_interval: Duration,
        operation_timeout: Duration,
    ) -> PipelineResult<Self> {
        let http = http_client(timeout)?;
        let base_url = project.aiplatform_base();
        let poller = OperationPoller::new(
            http.clone(),
            auth.clone(),
            base_url.clone(),
            poll_interval,
            operation_timeout,
        );
        Ok(Self {
            http,
            auth,
            base_url,
            project,
            poller,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.poller = self.poller.with_base_url(base_url.clone());
        self.base_url = base_url;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn submit(&self, request: reqwest::RequestBuilder) -> PipelineResult<Operation> {
        let response = request.bearer_auth(self.auth.token().await?).send().await?;
        let response = check(SERVICE, response).await?;
        let operation: Operation = json(SERVICE, response).await?;
        self.poller.wait(operation).await
    }

    /// Find an index by display name.
    pub async fn find_index(&self, display_name: &str) -> PipelineResult<Option<IndexResource>> {
        let response = self
            .http
            .get(self.url(&format!("{}/indexes", self.project.parent())))
            .bearer_auth(self.auth.token().await?)
            .query(&[("filter", format!("display_name=\"{display_name}\""))])
            .send()
            .await?;
        let response = check(SERVICE, response).await?;
        let list: ListIndexesResponse = json(SERVICE, response).await?;
        Ok(list.indexes.into_iter().next())
    }

    /// Create an index and wait for it to be built. Returns its resource name.
    pub async fn create_index(&self, spec: &IndexSpec) -> PipelineResult<String> {
        log::info!(
            "Creating index {} from {}",
            spec.display_name,
            spec.contents_uri
        );
        let request = self
            .http
            .post(self.url(&format!("{}/indexes", self.project.parent())))
            .json(&spec.to_request());
        let operation = self.submit(request).await?;

        operation
            .resource_name()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Operation {
                name: operation.name.clone(),
                message: "finished without an index resource".to_string(),
            })
    }

    /// Incrementally update an index from new source files.
    pub async fn update_embeddings(&self, index_name: &str, contents_uri: &str) -> PipelineResult<()> {
        log::info!("Updating index {} from {}", index_name, contents_uri);
        let request = self
            .http
            .patch(self.url(index_name))
            .query(&[("updateMask", "metadata")])
            .json(&json!({
                "metadata": {
                    "contentsDeltaUri": contents_uri,
                    "isCompleteOverwrite": false
                }
            }));
        self.submit(request).await?;
        Ok(())
    }

    /// Create the index if none carries the display name, otherwise update
    /// it from the same source. Returns the index resource name.
    pub async fn create_or_update_index(&self, spec: &IndexSpec) -> PipelineResult<String> {
        match self.find_index(&spec.display_name).await? {
            Some(index) => {
                self.update_embeddings(&index.name, &spec.contents_uri)
                    .await?;
                Ok(index.name)
            }
            None => self.create_index(spec).await,
        }
    }

    /// Find an index endpoint by display name.
    pub async fn find_endpoint(
        &self,
        display_name: &str,
    ) -> PipelineResult<Option<IndexEndpointResource>> {
        let response = self
            .http
            .get(self.url(&format!("{}/indexEndpoints", self.project.parent())))
            .bearer_auth(self.auth.token().await?)
            .query(&[("filter", format!("display_name=\"{display_name}\""))])
            .send()
            .await?;
        let response = check(SERVICE, response).await?;
        let list: ListEndpointsResponse = json(SERVICE, response).await?;
        Ok(list.index_endpoints.into_iter().next())
    }

    /// Create a private index endpoint peered with `network`
    /// (`projects/<number>/global/networks/<name>`).
    pub async fn create_endpoint(&self, display_name: &str, network: &str) -> PipelineResult<String> {
        log::info!("Creating index endpoint {} on {}", display_name, network);
        let request = self
            .http
            .post(self.url(&format!("{}/indexEndpoints", self.project.parent())))
            .json(&json!({
                "displayName": display_name,
                "publicEndpointEnabled": false,
                "network": network
            }));
        let operation = self.submit(request).await?;

        operation
            .resource_name()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Operation {
                name: operation.name.clone(),
                message: "finished without an endpoint resource".to_string(),
            })
    }

    pub async fn find_or_create_endpoint(
        &self,
        display_name: &str,
        network: &str,
    ) -> PipelineResult<String> {
        match self.find_endpoint(display_name).await? {
            Some(endpoint) => Ok(endpoint.name),
            None => self.create_endpoint(display_name, network).await,
        }
    }

    /// Deploy `index_name` to `endpoint_name` under `deployed_index_id`.
    pub async fn deploy_index(
        &self,
        endpoint_name: &str,
        index_name: &str,
        deployed_index_id: &str,
    ) -> PipelineResult<()> {
        log::info!(
            "Deploying {} to {} as {}",
            index_name,
            endpoint_name,
            deployed_index_id
        );
        let request = self
            .http
            .post(self.url(&format!("{endpoint_name}:deployIndex")))
            .json(&json!({
                "deployedIndex": {
                    "id": deployed_index_id,
                    "index": index_name
                }
            }));
        self.submit(request).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindNeighborsRequest<'a> {
    deployed_index_id: &'a str,
    queries: [Query<'a>; 1],
    return_full_datapoint: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Query<'a> {
    datapoint: QueryDatapoint<'a>,
    neighbor_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryDatapoint<'a> {
    datapoint_id: &'a str,
    feature_vector: &'a [f32],
    restricts: Vec<WireRestrict<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRestrict<'a> {
    namespace: &'a str,
    allow_list: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindNeighborsResponse {
    #[serde(default)]
    nearest_neighbors: Vec<NearestNeighbors>,
}

#[derive(Debug, Deserialize)]
struct NearestNeighbors {
    #[serde(default)]
    neighbors: Vec<WireNeighbor>,
}

#[derive(Debug, Deserialize)]
struct WireNeighbor {
    datapoint: WireDatapoint,
    #[serde(default)]
    distance: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDatapoint {
    datapoint_id: String,
}

/// Queries a deployed index through `findNeighbors`.
#[derive(Debug, Clone)]
pub struct MatchClient {
    http: Client,
    auth: TokenProvider,
    url: String,
    deployed_index_id: String,
}

impl MatchClient {
    /// `host` is the endpoint's serving host, with or without scheme.
    pub fn new(
        host: &str,
        index_endpoint: &str,
        deployed_index_id: impl Into<String>,
        auth: TokenProvider,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        Ok(Self {
            http: http_client(timeout)?,
            auth,
            url: format!("{base}/v1/{index_endpoint}:findNeighbors"),
            deployed_index_id: deployed_index_id.into(),
        })
    }
}

#[async_trait]
impl NeighborSearch for MatchClient {
    async fn find_neighbors(
        &self,
        query: &[f32],
        num_neighbors: usize,
        restricts: &[Restrict],
    ) -> PipelineResult<Vec<Neighbor>> {
        let request = FindNeighborsRequest {
            deployed_index_id: &self.deployed_index_id,
            queries: [Query {
                datapoint: QueryDatapoint {
                    datapoint_id: "query",
                    feature_vector: query,
                    restricts: restricts
                        .iter()
                        .map(|r| WireRestrict {
                            namespace: &r.namespace,
                            allow_list: &r.allow,
                        })
                        .collect(),
                },
                neighbor_count: num_neighbors,
            }],
            return_full_datapoint: false,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(self.auth.token().await?)
            .json(&request)
            .send()
            .await?;
        let response = check(SERVICE, response).await?;
        let body: FindNeighborsResponse = json(SERVICE, response).await?;

        Ok(body
            .nearest_neighbors
            .into_iter()
            .next()
            .map(|nn| {
                nn.neighbors
                    .into_iter()
                    .map(|n| Neighbor {
                        id: n.datapoint.datapoint_id,
                        distance: n.distance,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
