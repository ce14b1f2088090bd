//! Repository change observers.
//!
//! Persistence layers report entity changes by calling
//! [`ObserverRegistry::notify`]; registered observers (such as the
//! [`Ingestor`](crate::sync::ingest::Ingestor)) react to them. Nothing is
//! hooked implicitly: callers register observers and emit events themselves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::sync::SyncError;

/// A changed record as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(label: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            label: label.into(),
            attributes,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChangeKind::Created => "create",
            ChangeKind::Updated => "update",
            ChangeKind::Deleted => "delete",
        })
    }
}

#[async_trait]
pub trait RepositoryObserver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn on_create(&self, entity: &Entity) -> Result<(), SyncError>;

    async fn on_update(&self, entity: &Entity) -> Result<(), SyncError>;

    async fn on_delete(&self, entity: &Entity) -> Result<(), SyncError>;
}

/// Observers keyed by entity label.
#[derive(Default, Clone)]
pub struct ObserverRegistry {
    observers: HashMap<String, Vec<Arc<dyn RepositoryObserver>>>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: HashMap<&str, Vec<&str>> = self
            .observers
            .iter()
            .map(|(label, observers)| (label.as_str(), observers.iter().map(|o| o.name()).collect()))
            .collect();
        f.debug_struct("ObserverRegistry").field("observers", &names).finish()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, label: impl Into<String>, observer: Arc<dyn RepositoryObserver>) {
        self.observers.entry(label.into()).or_default().push(observer);
    }

    pub fn observer_count(&self, label: &str) -> usize {
        self.observers.get(label).map_or(0, Vec::len)
    }

    /// Deliver a change to every observer registered for the entity's
    /// label, in registration order. All observers run even when one fails;
    /// every failure is returned.
    pub async fn notify(&self, change: ChangeKind, entity: &Entity) -> Result<(), Vec<SyncError>> {
        let Some(observers) = self.observers.get(&entity.label) else {
            tracing::debug!(label = %entity.label, %change, "No observers registered");
            return Ok(());
        };

        let mut errors = Vec::new();
        for observer in observers {
            let result = match change {
                ChangeKind::Created => observer.on_create(entity).await,
                ChangeKind::Updated => observer.on_update(entity).await,
                ChangeKind::Deleted => observer.on_delete(entity).await,
            };
            if let Err(e) = result {
                tracing::error!(
                    observer = observer.name(),
                    label = %entity.label,
                    %change,
                    error = %e,
                    "Observer failed"
                );
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
