//! Graph store client over the Neo4j transactional HTTP API.
//!
//! # Request Path
//! ```text
//! operation(label, properties, ...)
//!     → identifier::escape (labels, relationship types, property keys)
//!     → statement + parameters (values never spliced into query text)
//!     → Resilience::run (breaker → retry → POST /db/{database}/tx/commit)
//!     → rows zipped from columns
//! ```
//!
//! # Design Decisions
//! - One auto-commit transaction per logical operation, so every call is
//!   atomic from the caller's point of view
//! - A non-empty `errors` array in a 200 response is an upstream failure
//! - Node and relationship identifiers are the store's internal integer ids

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::schema::{AppConfig, GraphConfig};
use crate::observability::metrics;
use crate::resilience::registry::BreakerRegistry;
use crate::resilience::timeouts::build_http_client;
use crate::resilience::Resilience;
use crate::security::identifier::{escape, validate_all, IdentifierKind};
use crate::store::error::{StoreError, StoreResult};
use crate::store::transport::send_json;

/// Breaker name used for the graph store.
pub const GRAPH_RESOURCE: &str = "graph-db";

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(pub i64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

/// A relationship as stored, with its endpoints' internal ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub start: NodeId,
    pub end: NodeId,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A node addressed by label and a unique property.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMatch<'a> {
    pub label: &'a str,
    pub key: &'a str,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

const NODE_PROJECTION: &str = "id(n) AS id, labels(n) AS labels, properties(n) AS properties";

/// Resilient graph store client.
#[derive(Debug, Clone)]
pub struct GraphStoreClient {
    http: HttpClient,
    endpoint: Url,
    username: String,
    password: String,
    resilience: Resilience,
}

impl GraphStoreClient {
    pub fn new(config: &GraphConfig, resilience: Resilience) -> StoreResult<Self> {
        let http = build_http_client(&config.timeouts)
            .map_err(|e| StoreError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: commit_endpoint(&config.uri, &config.database)?,
            username: config.username.clone(),
            password: config.password.clone(),
            resilience,
        })
    }

    /// Build from application config, sharing the registry's `graph-db` breaker.
    pub fn from_app_config(config: &AppConfig, registry: &BreakerRegistry) -> StoreResult<Self> {
        let resilience = Resilience::from_config(GRAPH_RESOURCE, config, registry);
        Self::new(&config.graph, resilience)
    }

    pub fn resilience(&self) -> &Resilience {
        &self.resilience
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Run a caller-written statement. Its text is trusted as-is; pass all
    /// values through `params`.
    pub async fn query(&self, statement: &str, params: Value) -> StoreResult<Vec<Row>> {
        self.execute("query", statement, params).await
    }

    /// Run a statement and return its first row, if any.
    pub async fn query_single(&self, statement: &str, params: Value) -> StoreResult<Option<Row>> {
        Ok(self.execute("query_single", statement, params).await?.into_iter().next())
    }

    pub async fn create_node(&self, label: &str, properties: &Map<String, Value>) -> StoreResult<NodeId> {
        let label = escape(label, IdentifierKind::Label)?;
        validate_all(properties.keys().map(String::as_str), IdentifierKind::PropertyKey)?;

        let statement = format!("CREATE (n:{label} $props) RETURN id(n) AS id");
        let rows = self
            .execute("create_node", &statement, json!({ "props": properties }))
            .await?;
        required_i64(&rows, "id").map(NodeId)
    }

    /// Create or update the node whose `key` equals `properties[key]`.
    pub async fn merge_node(
        &self,
        label: &str,
        key: &str,
        properties: &Map<String, Value>,
    ) -> StoreResult<NodeId> {
        let label = escape(label, IdentifierKind::Label)?;
        let key_escaped = escape(key, IdentifierKind::PropertyKey)?;
        validate_all(properties.keys().map(String::as_str), IdentifierKind::PropertyKey)?;
        let key_value = properties
            .get(key)
            .filter(|value| !value.is_null())
            .ok_or_else(|| StoreError::InvalidRequest(format!("merge key '{key}' missing from properties")))?;

        let statement = format!("MERGE (n:{label} {{{key_escaped}: $key}}) SET n += $props RETURN id(n) AS id");
        let rows = self
            .execute("merge_node", &statement, json!({ "key": key_value, "props": properties }))
            .await?;
        required_i64(&rows, "id").map(NodeId)
    }

    pub async fn get_node(&self, label: &str, id: NodeId) -> StoreResult<Option<Node>> {
        let label = escape(label, IdentifierKind::Label)?;
        let statement = format!("MATCH (n:{label}) WHERE id(n) = $id RETURN {NODE_PROJECTION}");
        let rows = self.execute("get_node", &statement, json!({ "id": id })).await?;
        rows.into_iter().next().map(decode_node).transpose()
    }

    /// Nodes whose properties equal every entry of `filters`.
    pub async fn find_nodes(
        &self,
        label: &str,
        filters: &Map<String, Value>,
        limit: usize,
    ) -> StoreResult<Vec<Node>> {
        let label = escape(label, IdentifierKind::Label)?;
        let mut params = Map::new();
        let mut conditions = Vec::with_capacity(filters.len());
        for (index, (key, value)) in filters.iter().enumerate() {
            let key = escape(key, IdentifierKind::PropertyKey)?;
            conditions.push(format!("n.{key} = $p{index}"));
            params.insert(format!("p{index}"), value.clone());
        }
        params.insert("limit".to_string(), json!(limit));

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let statement = format!("MATCH (n:{label}){where_clause} RETURN {NODE_PROJECTION} LIMIT $limit");
        let rows = self.execute("find_nodes", &statement, Value::Object(params)).await?;
        rows.into_iter().map(decode_node).collect()
    }

    /// Merge `properties` into a node. Returns whether the node exists.
    pub async fn update_node(&self, label: &str, id: NodeId, properties: &Map<String, Value>) -> StoreResult<bool> {
        self.set_properties("update_node", "+=", label, id, properties).await
    }

    /// Replace all properties of a node. Returns whether the node exists.
    pub async fn replace_node(&self, label: &str, id: NodeId, properties: &Map<String, Value>) -> StoreResult<bool> {
        self.set_properties("replace_node", "=", label, id, properties).await
    }

    async fn set_properties(
        &self,
        operation: &'static str,
        operator: &str,
        label: &str,
        id: NodeId,
        properties: &Map<String, Value>,
    ) -> StoreResult<bool> {
        let label = escape(label, IdentifierKind::Label)?;
        validate_all(properties.keys().map(String::as_str), IdentifierKind::PropertyKey)?;

        let statement = format!("MATCH (n:{label}) WHERE id(n) = $id SET n {operator} $props RETURN count(n) AS matched");
        let rows = self
            .execute(operation, &statement, json!({ "id": id, "props": properties }))
            .await?;
        Ok(required_i64(&rows, "matched")? > 0)
    }

    /// Delete a node and its relationships. Returns whether it existed.
    pub async fn delete_node(&self, label: &str, id: NodeId) -> StoreResult<bool> {
        let label = escape(label, IdentifierKind::Label)?;
        let statement = format!("MATCH (n:{label}) WHERE id(n) = $id DETACH DELETE n RETURN count(n) AS deleted");
        let rows = self.execute("delete_node", &statement, json!({ "id": id })).await?;
        Ok(required_i64(&rows, "deleted")? > 0)
    }

    /// Delete every node whose `key` equals `value`. Returns the count.
    pub async fn delete_nodes_by_property(&self, label: &str, key: &str, value: &Value) -> StoreResult<u64> {
        let label = escape(label, IdentifierKind::Label)?;
        let key = escape(key, IdentifierKind::PropertyKey)?;
        let statement =
            format!("MATCH (n:{label}) WHERE n.{key} = $value DETACH DELETE n RETURN count(n) AS deleted");
        let rows = self
            .execute("delete_nodes_by_property", &statement, json!({ "value": value }))
            .await?;
        Ok(required_i64(&rows, "deleted")?.max(0) as u64)
    }

    /// Create `(from)-[:rel_type]->(to)`. Returns `None` when either node
    /// does not exist.
    pub async fn create_relationship(
        &self,
        from: NodeId,
        to: NodeId,
        rel_type: &str,
        properties: &Map<String, Value>,
    ) -> StoreResult<Option<RelationshipId>> {
        let rel_type = escape(rel_type, IdentifierKind::RelationshipType)?;
        validate_all(properties.keys().map(String::as_str), IdentifierKind::PropertyKey)?;

        let statement = format!(
            "MATCH (a), (b) WHERE id(a) = $from AND id(b) = $to \
             CREATE (a)-[r:{rel_type}]->(b) SET r = $props RETURN id(r) AS id"
        );
        let rows = self
            .execute(
                "create_relationship",
                &statement,
                json!({ "from": from, "to": to, "props": properties }),
            )
            .await?;
        optional_i64(&rows, "id").map(|id| id.map(RelationshipId))
    }

    /// Ensure exactly one `rel_type` relationship between two nodes found by
    /// key. Returns whether both nodes existed.
    pub async fn link_nodes(
        &self,
        from: &NodeMatch<'_>,
        rel_type: &str,
        to: &NodeMatch<'_>,
        properties: &Map<String, Value>,
    ) -> StoreResult<bool> {
        let from_label = escape(from.label, IdentifierKind::Label)?;
        let from_key = escape(from.key, IdentifierKind::PropertyKey)?;
        let to_label = escape(to.label, IdentifierKind::Label)?;
        let to_key = escape(to.key, IdentifierKind::PropertyKey)?;
        let rel_type = escape(rel_type, IdentifierKind::RelationshipType)?;
        validate_all(properties.keys().map(String::as_str), IdentifierKind::PropertyKey)?;

        let statement = format!(
            "MATCH (a:{from_label} {{{from_key}: $from}}), (b:{to_label} {{{to_key}: $to}}) \
             MERGE (a)-[r:{rel_type}]->(b) SET r += $props RETURN count(r) AS linked"
        );
        let rows = self
            .execute(
                "link_nodes",
                &statement,
                json!({ "from": from.value, "to": to.value, "props": properties }),
            )
            .await?;
        Ok(required_i64(&rows, "linked")? > 0)
    }

    /// Every relationship touching a node, in either direction.
    pub async fn node_relationships(&self, label: &str, id: NodeId) -> StoreResult<Vec<Relationship>> {
        let label = escape(label, IdentifierKind::Label)?;
        let statement = format!(
            "MATCH (n:{label})-[r]-() WHERE id(n) = $id \
             RETURN DISTINCT id(r) AS id, type(r) AS type, id(startNode(r)) AS start, \
             id(endNode(r)) AS end, properties(r) AS properties"
        );
        let rows = self
            .execute("node_relationships", &statement, json!({ "id": id }))
            .await?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row))
                    .map_err(|e| StoreError::decode(GRAPH_RESOURCE, e.to_string()))
            })
            .collect()
    }

    pub async fn delete_relationship(&self, rel_type: &str, id: RelationshipId) -> StoreResult<bool> {
        let rel_type = escape(rel_type, IdentifierKind::RelationshipType)?;
        let statement =
            format!("MATCH ()-[r:{rel_type}]->() WHERE id(r) = $id DELETE r RETURN count(r) AS deleted");
        let rows = self
            .execute("delete_relationship", &statement, json!({ "id": id }))
            .await?;
        Ok(required_i64(&rows, "deleted")? > 0)
    }

    pub async fn count_nodes(&self, label: &str) -> StoreResult<u64> {
        let label = escape(label, IdentifierKind::Label)?;
        let statement = format!("MATCH (n:{label}) RETURN count(n) AS count");
        let rows = self.execute("count_nodes", &statement, json!({})).await?;
        Ok(required_i64(&rows, "count")?.max(0) as u64)
    }

    /// Round-trip a trivial statement through the full resilience path.
    pub async fn ping(&self) -> StoreResult<()> {
        let rows = self.execute("ping", "RETURN 1 AS ok", json!({})).await?;
        required_i64(&rows, "ok").map(|_| ())
    }

    async fn execute(&self, operation: &'static str, statement: &str, params: Value) -> StoreResult<Vec<Row>> {
        let body = json!({
            "statements": [{
                "statement": statement,
                "parameters": params,
                "resultDataContents": ["row"],
            }]
        });

        let start = Instant::now();
        let span = tracing::debug_span!("graph_operation", operation, op_id = %Uuid::new_v4());
        let result = self
            .resilience
            .run(operation, || self.commit(&body))
            .instrument(span)
            .await;

        metrics::record_store_request("graph", operation, outcome(&result), start);
        if let Err(e) = &result {
            tracing::debug!(operation, error = %e, "Graph operation failed");
        }
        result
    }

    async fn commit(&self, body: &Value) -> StoreResult<Vec<Row>> {
        let request = self
            .http
            .post(self.endpoint.clone())
            .basic_auth(&self.username, Some(&self.password))
            .json(body);
        let value = send_json(GRAPH_RESOURCE, request).await?;
        parse_commit_response(value)
    }
}

fn commit_endpoint(uri: &str, database: &str) -> StoreResult<Url> {
    let mut endpoint = Url::parse(uri)?;
    endpoint
        .path_segments_mut()
        .map_err(|_| StoreError::InvalidRequest(format!("graph URI '{uri}' cannot be a base")))?
        .pop_if_empty()
        .extend(["db", database, "tx", "commit"]);
    Ok(endpoint)
}

fn parse_commit_response(value: Value) -> StoreResult<Vec<Row>> {
    let response: TxResponse =
        serde_json::from_value(value).map_err(|e| StoreError::decode(GRAPH_RESOURCE, e.to_string()))?;

    if let Some(first) = response.errors.first() {
        let message = response
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(StoreError::upstream(GRAPH_RESOURCE, 200, first.code.clone(), message));
    }

    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    result
        .data
        .into_iter()
        .map(|data| {
            if data.row.len() != result.columns.len() {
                return Err(StoreError::decode(
                    GRAPH_RESOURCE,
                    format!("row has {} values for {} columns", data.row.len(), result.columns.len()),
                ));
            }
            Ok(result.columns.iter().cloned().zip(data.row).collect())
        })
        .collect()
}

fn decode_node(row: Row) -> StoreResult<Node> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::decode(GRAPH_RESOURCE, e.to_string()))
}

fn optional_i64(rows: &[Row], column: &str) -> StoreResult<Option<i64>> {
    match rows.first().and_then(|row| row.get(column)) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| StoreError::decode(GRAPH_RESOURCE, format!("column '{column}' is not an integer"))),
    }
}

fn required_i64(rows: &[Row], column: &str) -> StoreResult<i64> {
    optional_i64(rows, column)?
        .ok_or_else(|| StoreError::decode(GRAPH_RESOURCE, format!("missing column '{column}'")))
}

fn outcome<T>(result: &StoreResult<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(StoreError::CircuitOpen(_)) => "circuit_open",
        Err(StoreError::Transport { .. }) => "transport_error",
        Err(_) => "error",
    }
}
