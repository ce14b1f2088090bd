//! Entity ingestion into both stores.
//!
//! # Write Order
//! ```text
//! create / update:
//!     snapshot existing node and its relationships → merge node → link relationships → embed → upsert point
//! delete:
//!     snapshot existing node and its relationships → delete node → delete point
//! ```
//!
//! The graph is written first. When a later step fails, the graph write is
//! compensated from the snapshot:
//! - a new node is deleted along with anything linked to it
//! - an updated node gets its properties back and loses edges it did not have
//! - a deleted node is re-created with every relationship, in both directions
//!
//! The caller receives a [`ConsistencyError`] stating what was applied and
//! whether the compensation fully succeeded.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::observability::metrics;
use crate::store::graph::{GraphStoreClient, Node, NodeId, NodeMatch, Relationship};
use crate::store::vector::{Point, PointId, VectorStoreClient};
use crate::store::StoreError;
use crate::sync::config::{EntitySyncConfig, VectorSync};
use crate::sync::observer::{ChangeKind, Entity, RepositoryObserver};
use crate::sync::{Compensation, ConsistencyError, StepError, SyncError, SyncStep};

/// Payload key holding the entity label.
pub const PAYLOAD_LABEL: &str = "entity_label";
/// Payload key holding the entity id.
pub const PAYLOAD_ENTITY_ID: &str = "entity_id";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("embedding failed: {message}")]
pub struct EmbedError {
    pub message: String,
}

impl EmbedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turns text into a vector. Providers live outside this crate.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Deterministic vector point id for an entity.
pub fn point_id(label: &str, entity_id: &str) -> PointId {
    PointId::Uuid(Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{label}:{entity_id}").as_bytes(),
    ))
}

/// Keeps one entity type in sync across both stores.
pub struct Ingestor {
    name: String,
    config: EntitySyncConfig,
    graph: Arc<GraphStoreClient>,
    vector: Arc<VectorStoreClient>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    pub fn new(
        config: EntitySyncConfig,
        graph: Arc<GraphStoreClient>,
        vector: Arc<VectorStoreClient>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            name: format!("ingestor:{}", config.label()),
            config,
            graph,
            vector,
            embedder,
        }
    }

    pub fn config(&self) -> &EntitySyncConfig {
        &self.config
    }

    async fn upsert(&self, change: ChangeKind, entity: &Entity) -> Result<(), SyncError> {
        let id = self.entity_id(entity)?;
        let id_str = id_string(id);
        tracing::debug!(label = self.config.label(), entity_id = %id_str, %change, "Syncing entity");

        let prior = self.snapshot(id).await?;
        let mut applied = Vec::new();

        if self.config.graph_enabled() {
            self.graph
                .merge_node(self.config.label(), self.config.id_field(), &self.graph_properties(entity))
                .await?;
            applied.push(SyncStep::GraphNode);

            if !self.config.relationships().is_empty() {
                if let Err(e) = self.link_relationships(entity).await {
                    let ctx = Failure::new(change, &id_str, applied, SyncStep::GraphRelationships, e.into());
                    return Err(self.compensate(ctx, id, prior).await);
                }
                applied.push(SyncStep::GraphRelationships);
            }
        }

        if let Some(vector) = self.config.vector() {
            if let Err(e) = self.write_point(vector, entity, id, &id_str).await {
                if applied.is_empty() {
                    return Err(e.into());
                }
                let ctx = Failure::new(change, &id_str, applied, SyncStep::VectorPoint, e);
                return Err(self.compensate(ctx, id, prior).await);
            }
        }

        tracing::info!(label = self.config.label(), entity_id = %id_str, %change, "Entity synced");
        Ok(())
    }

    async fn remove(&self, entity: &Entity) -> Result<(), SyncError> {
        let id = self.entity_id(entity)?;
        let id_str = id_string(id);

        let prior = self.snapshot(id).await?;
        let mut applied = Vec::new();

        if self.config.graph_enabled() {
            self.graph
                .delete_nodes_by_property(self.config.label(), self.config.id_field(), id)
                .await?;
            applied.push(SyncStep::GraphNode);
        }

        if let Some(vector) = self.config.vector() {
            let ids = [point_id(self.config.label(), &id_str)];
            if let Err(e) = self.vector.delete_points(&vector.collection, &ids).await {
                if applied.is_empty() {
                    return Err(e.into());
                }
                let ctx = Failure::new(ChangeKind::Deleted, &id_str, applied, SyncStep::VectorPoint, e.into());
                return Err(self.compensate(ctx, id, prior).await);
            }
        }

        tracing::info!(label = self.config.label(), entity_id = %id_str, "Entity removed");
        Ok(())
    }

    fn entity_id<'e>(&self, entity: &'e Entity) -> Result<&'e Value, SyncError> {
        entity
            .get(self.config.id_field())
            .filter(|value| !value.is_null())
            .ok_or_else(|| SyncError::MissingField {
                label: entity.label.clone(),
                field: self.config.id_field().to_string(),
            })
    }

    async fn snapshot(&self, id: &Value) -> Result<Option<Snapshot>, StoreError> {
        if !self.config.graph_enabled() {
            return Ok(None);
        }
        let mut filter = Map::new();
        filter.insert(self.config.id_field().to_string(), id.clone());
        let Some(node) = self.graph.find_nodes(self.config.label(), &filter, 1).await?.pop() else {
            return Ok(None);
        };
        let relationships = self.graph.node_relationships(self.config.label(), node.id).await?;
        Ok(Some(Snapshot { node, relationships }))
    }

    /// Configured graph properties (all attributes when none are listed),
    /// always including the id field.
    fn graph_properties(&self, entity: &Entity) -> Map<String, Value> {
        if self.config.graph_properties().is_empty() {
            return entity.attributes.clone();
        }
        let mut properties = Map::new();
        for field in self
            .config
            .graph_properties()
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.config.id_field()))
        {
            if let Some(value) = entity.get(field) {
                properties.insert(field.to_string(), value.clone());
            }
        }
        properties
    }

    async fn link_relationships(&self, entity: &Entity) -> Result<(), StoreError> {
        let Some(id) = entity.get(self.config.id_field()) else {
            return Ok(());
        };
        for relationship in self.config.relationships() {
            let Some(target) = entity.get(&relationship.foreign_key).filter(|v| !v.is_null()) else {
                continue;
            };
            let from = NodeMatch {
                label: self.config.label(),
                key: self.config.id_field(),
                value: id.clone(),
            };
            let to = NodeMatch {
                label: &relationship.target_label,
                key: &relationship.target_key,
                value: target.clone(),
            };
            let linked = self
                .graph
                .link_nodes(&from, &relationship.rel_type, &to, &Map::new())
                .await?;
            if !linked {
                tracing::debug!(
                    rel_type = %relationship.rel_type,
                    target_label = %relationship.target_label,
                    "Relationship target not found, skipping"
                );
            }
        }
        Ok(())
    }

    async fn write_point(
        &self,
        vector: &VectorSync,
        entity: &Entity,
        id: &Value,
        id_str: &str,
    ) -> Result<(), StepError> {
        let text = embedding_text(entity, &vector.text_fields);
        let point_id = point_id(self.config.label(), id_str);

        if text.is_empty() {
            // Nothing to embed; drop any stale point.
            self.vector.delete_points(&vector.collection, &[point_id]).await?;
            return Ok(());
        }

        let embedding = self.embedder.embed(&text).await?;
        let mut payload = entity.attributes.clone();
        payload.insert(PAYLOAD_LABEL.to_string(), Value::String(self.config.label().to_string()));
        payload.insert(PAYLOAD_ENTITY_ID.to_string(), id.clone());

        let point = Point {
            id: point_id,
            vector: embedding,
            payload,
        };
        self.vector.upsert(&vector.collection, &[point]).await?;
        Ok(())
    }

    async fn compensate(&self, failure: Failure, id: &Value, prior: Option<Snapshot>) -> SyncError {
        let label = self.config.label();
        let result = match (failure.operation, prior) {
            (ChangeKind::Deleted, Some(prior)) => self.restore_deleted(&prior).await,
            (ChangeKind::Deleted, None) => Ok(0),
            (_, Some(prior)) => self.restore_updated(&prior).await.map(|()| 0),
            (_, None) => self
                .graph
                .delete_nodes_by_property(label, self.config.id_field(), id)
                .await
                .map(|_| 0),
        };

        let compensation = match result {
            Ok(0) => {
                metrics::record_compensation("rolled_back");
                Compensation::RolledBack
            }
            Ok(unrestored) => {
                metrics::record_compensation("partial");
                Compensation::Partial { unrestored }
            }
            Err(e) => {
                metrics::record_compensation("failed");
                Compensation::Failed(e)
            }
        };

        let error = ConsistencyError {
            operation: failure.operation,
            label: label.to_string(),
            entity_id: failure.entity_id,
            applied: failure.applied,
            failed: failure.failed,
            cause: failure.cause,
            compensation,
        };
        tracing::error!(
            label,
            entity_id = %error.entity_id,
            failed = %error.failed,
            rolled_back = error.is_rolled_back(),
            error = %error,
            "Sync left a partial write"
        );
        error.into()
    }

    async fn restore_updated(&self, prior: &Snapshot) -> Result<(), StoreError> {
        let label = self.config.label();
        self.graph.replace_node(label, prior.node.id, &prior.node.properties).await?;

        let current = self.graph.node_relationships(label, prior.node.id).await?;
        for added in current.iter().filter(|rel| !prior.has_relationship(rel)) {
            self.graph.delete_relationship(&added.rel_type, added.id).await?;
        }
        Ok(())
    }

    /// Re-create the node and every relationship it had. Returns how many
    /// relationships could not be restored.
    async fn restore_deleted(&self, prior: &Snapshot) -> Result<usize, StoreError> {
        let restored = self.graph.create_node(self.config.label(), &prior.node.properties).await?;
        let remap = |id: NodeId| if id == prior.node.id { restored } else { id };

        let mut unrestored = 0;
        for rel in &prior.relationships {
            let created = self
                .graph
                .create_relationship(remap(rel.start), remap(rel.end), &rel.rel_type, &rel.properties)
                .await?;
            if created.is_none() {
                tracing::warn!(
                    rel_type = %rel.rel_type,
                    start = %rel.start,
                    end = %rel.end,
                    "Relationship endpoint vanished, cannot restore"
                );
                unrestored += 1;
            }
        }
        Ok(unrestored)
    }
}

/// Graph state of an entity before the change.
struct Snapshot {
    node: Node,
    relationships: Vec<Relationship>,
}

impl Snapshot {
    fn has_relationship(&self, rel: &Relationship) -> bool {
        self.relationships.iter().any(|prior| prior.id == rel.id)
    }
}

struct Failure {
    operation: ChangeKind,
    entity_id: String,
    applied: Vec<SyncStep>,
    failed: SyncStep,
    cause: StepError,
}

impl Failure {
    fn new(operation: ChangeKind, entity_id: &str, applied: Vec<SyncStep>, failed: SyncStep, cause: StepError) -> Self {
        Self {
            operation,
            entity_id: entity_id.to_string(),
            applied,
            failed,
            cause,
        }
    }
}

#[async_trait]
impl RepositoryObserver for Ingestor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_create(&self, entity: &Entity) -> Result<(), SyncError> {
        self.upsert(ChangeKind::Created, entity).await
    }

    async fn on_update(&self, entity: &Entity) -> Result<(), SyncError> {
        self.upsert(ChangeKind::Updated, entity).await
    }

    async fn on_delete(&self, entity: &Entity) -> Result<(), SyncError> {
        self.remove(entity).await
    }
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Text fields joined by newlines, skipping missing and null values.
fn embedding_text(entity: &Entity, fields: &[String]) -> String {
    fields
        .iter()
        .filter_map(|field| match entity.get(field)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
