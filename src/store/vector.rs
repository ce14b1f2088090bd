//! Vector store client over the Qdrant REST API.
//!
//! Wrapped by the same breaker and retry composition as the graph client,
//! under its own resource name. Collection names travel as encoded URL
//! path segments and must pass the collection-name check first.

use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::schema::{AppConfig, VectorConfig};
use crate::observability::metrics;
use crate::resilience::registry::BreakerRegistry;
use crate::resilience::timeouts::build_http_client;
use crate::resilience::Resilience;
use crate::security::identifier::validate_collection_name;
use crate::store::error::{StoreError, StoreResult};
use crate::store::transport::send_json;

/// Breaker name used for the vector store.
pub const VECTOR_RESOURCE: &str = "vector-db";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(Uuid),
}

impl From<u64> for PointId {
    fn from(id: u64) -> Self {
        PointId::Num(id)
    }
}

impl From<Uuid> for PointId {
    fn from(id: Uuid) -> Self {
        PointId::Uuid(id)
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointId::Num(id) => id.fmt(f),
            PointId::Uuid(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Distance {
    #[default]
    Cosine,
    Euclid,
    Dot,
    Manhattan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    pub id: PointId,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

/// Payload filter requiring every condition to match.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PayloadFilter {
    pub must: Vec<FieldCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: String,
    #[serde(rename = "match")]
    pub matches: MatchValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchValue {
    pub value: Value,
}

impl PayloadFilter {
    /// Filter on `key == value`.
    pub fn must_match(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and_match(key, value)
    }

    /// Add another `key == value` condition.
    pub fn and_match(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push(FieldCondition {
            key: key.into(),
            matches: MatchValue { value: value.into() },
        });
        self
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Put,
    Post,
    Delete,
}

/// Resilient vector store client.
#[derive(Debug, Clone)]
pub struct VectorStoreClient {
    http: HttpClient,
    base_url: Url,
    api_key: Option<String>,
    resilience: Resilience,
}

impl VectorStoreClient {
    pub fn new(config: &VectorConfig, resilience: Resilience) -> StoreResult<Self> {
        let http = build_http_client(&config.timeouts)
            .map_err(|e| StoreError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        let base_url = Url::parse(&config.url)?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidRequest(format!("vector URL '{}' cannot be a base", config.url)));
        }
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            resilience,
        })
    }

    /// Build from application config, sharing the registry's `vector-db` breaker.
    pub fn from_app_config(config: &AppConfig, registry: &BreakerRegistry) -> StoreResult<Self> {
        let resilience = Resilience::from_config(VECTOR_RESOURCE, config, registry);
        Self::new(&config.vector, resilience)
    }

    pub fn resilience(&self) -> &Resilience {
        &self.resilience
    }

    pub async fn create_collection(&self, name: &str, vector_size: usize, distance: Distance) -> StoreResult<()> {
        let url = self.collection_url(name, &[])?;
        let body = json!({ "vectors": { "size": vector_size, "distance": distance } });
        self.request::<Value>("create_collection", Method::Put, url, Some(body))
            .await
            .map(|_| ())
    }

    pub async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        let url = self.collection_url(name, &[])?;
        self.request::<Value>("delete_collection", Method::Delete, url, None)
            .await
            .map(|_| ())
    }

    pub async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        let url = self.collection_url(name, &["exists"])?;
        let result: ExistsResult = self.request("collection_exists", Method::Get, url, None).await?;
        Ok(result.exists)
    }

    pub async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let url = self.url(&["collections"]);
        let result: CollectionsResult = self.request("list_collections", Method::Get, url, None).await?;
        Ok(result.collections.into_iter().map(|c| c.name).collect())
    }

    /// Upsert points and wait until they are indexed.
    pub async fn upsert(&self, collection: &str, points: &[Point]) -> StoreResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut url = self.collection_url(collection, &["points"])?;
        url.query_pairs_mut().append_pair("wait", "true");
        self.request::<Value>("upsert", Method::Put, url, Some(json!({ "points": points })))
            .await
            .map(|_| ())
    }

    pub async fn delete_points(&self, collection: &str, ids: &[PointId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut url = self.collection_url(collection, &["points", "delete"])?;
        url.query_pairs_mut().append_pair("wait", "true");
        self.request::<Value>("delete_points", Method::Post, url, Some(json!({ "points": ids })))
            .await
            .map(|_| ())
    }

    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> StoreResult<Vec<ScoredPoint>> {
        let url = self.collection_url(collection, &["points", "search"])?;
        let mut body = json!({ "vector": vector, "limit": limit, "with_payload": true });
        if let Some(filter) = filter {
            body["filter"] = json!(filter);
        }
        self.request("search", Method::Post, url, Some(body)).await
    }

    pub async fn scroll(
        &self,
        collection: &str,
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> StoreResult<Vec<Record>> {
        let url = self.collection_url(collection, &["points", "scroll"])?;
        let mut body = json!({ "limit": limit, "with_payload": true, "with_vector": false });
        if let Some(filter) = filter {
            body["filter"] = json!(filter);
        }
        let result: ScrollResult = self.request("scroll", Method::Post, url, Some(body)).await?;
        Ok(result.points)
    }

    pub async fn count(&self, collection: &str, filter: Option<&PayloadFilter>) -> StoreResult<u64> {
        let url = self.collection_url(collection, &["points", "count"])?;
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = json!(filter);
        }
        let result: CountResult = self.request("count", Method::Post, url, Some(body)).await?;
        Ok(result.count)
    }

    /// List collections through the full resilience path.
    pub async fn ping(&self) -> StoreResult<()> {
        self.list_collections().await.map(|_| ())
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn collection_url(&self, name: &str, tail: &[&str]) -> StoreResult<Url> {
        validate_collection_name(name)?;
        let mut segments = vec!["collections", name];
        segments.extend_from_slice(tail);
        Ok(self.url(&segments))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> StoreResult<T> {
        let start = Instant::now();
        let span = tracing::debug_span!("vector_operation", operation, op_id = %Uuid::new_v4());
        let result = self
            .resilience
            .run(operation, || self.send(method, &url, body.as_ref()))
            .instrument(span)
            .await;

        metrics::record_store_request("vector", operation, outcome(&result), start);
        let value = result?;
        let response: ApiResponse<T> =
            serde_json::from_value(value).map_err(|e| StoreError::decode(VECTOR_RESOURCE, e.to_string()))?;
        Ok(response.result)
    }

    async fn send(&self, method: Method, url: &Url, body: Option<&Value>) -> StoreResult<Value> {
        let mut request = match method {
            Method::Get => self.http.get(url.clone()),
            Method::Put => self.http.put(url.clone()),
            Method::Post => self.http.post(url.clone()),
            Method::Delete => self.http.delete(url.clone()),
        };
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let value = send_json(VECTOR_RESOURCE, request).await?;
        if let Some(message) = value.pointer("/status/error").and_then(Value::as_str) {
            return Err(StoreError::upstream(VECTOR_RESOURCE, 200, None, message));
        }
        Ok(value)
    }
}

fn outcome<T>(result: &StoreResult<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(StoreError::CircuitOpen(_)) => "circuit_open",
        Err(StoreError::Transport { .. }) => "transport_error",
        Err(_) => "error",
    }
}
