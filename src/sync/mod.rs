//! Entity synchronization between the graph and vector stores.
//!
//! # Data Flow
//! ```text
//! Repository change (create / update / delete)
//!     → observer.rs (ObserverRegistry::notify, routed by label)
//!     → ingest.rs (Ingestor: graph write → vector write)
//!     → on a partial failure: compensate the graph write, report ConsistencyError
//! ```
//!
//! # Design Decisions
//! - Per-entity settings are an immutable config validated when built
//! - Observers are registered explicitly; nothing hooks into a persistence layer
//! - No distributed locking or two-phase commit; compensation is best effort
//!   and its outcome is always reported

pub mod config;
pub mod ingest;
pub mod observer;

use thiserror::Error;

use crate::store::error::StoreError;

pub use config::{EntitySyncConfig, RelationshipSync, SyncConfigError, VectorSync};
pub use ingest::{EmbedError, Embedder, Ingestor};
pub use observer::{ChangeKind, Entity, ObserverRegistry, RepositoryObserver};

/// One write performed while syncing an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    GraphNode,
    GraphRelationships,
    VectorPoint,
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SyncStep::GraphNode => "graph node",
            SyncStep::GraphRelationships => "graph relationships",
            SyncStep::VectorPoint => "vector point",
        })
    }
}

/// Why a sync step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbedError),
}

/// Outcome of undoing the steps applied before a failure.
#[derive(Debug)]
pub enum Compensation {
    RolledBack,
    /// The node came back but some of its relationships could not be
    /// re-created because the other endpoint no longer exists.
    Partial { unrestored: usize },
    Failed(StoreError),
}

impl std::fmt::Display for Compensation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compensation::RolledBack => f.write_str("rolled back"),
            Compensation::Partial { unrestored } => {
                write!(f, "incomplete: {unrestored} relationship(s) not restored")
            }
            Compensation::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// A step failed after earlier steps had been applied.
#[derive(Debug, Error)]
#[error(
    "{operation} of {label} '{entity_id}' failed at {failed} after applying {}: {cause}; compensation {compensation}",
    join_steps(.applied)
)]
pub struct ConsistencyError {
    pub operation: ChangeKind,
    pub label: String,
    pub entity_id: String,
    pub applied: Vec<SyncStep>,
    pub failed: SyncStep,
    #[source]
    pub cause: StepError,
    pub compensation: Compensation,
}

impl ConsistencyError {
    /// Whether both stores are back in their pre-operation state.
    pub fn is_rolled_back(&self) -> bool {
        matches!(self.compensation, Compensation::RolledBack)
    }
}

fn join_steps(steps: &[SyncStep]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Nothing was applied.
    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Consistency(Box<ConsistencyError>),

    #[error("{label} entity has no value for '{field}'")]
    MissingField { label: String, field: String },

    #[error(transparent)]
    Config(#[from] SyncConfigError),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Step(StepError::Store(err))
    }
}

impl From<ConsistencyError> for SyncError {
    fn from(err: ConsistencyError) -> Self {
        SyncError::Consistency(Box::new(err))
    }
}
