//! Store clients.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → graph.rs / vector.rs (sanitize identifiers, build request)
//!     → resilience::Resilience::run (breaker → retry)
//!     → transport.rs (HTTP exchange, status and body classification)
//!     → error.rs (transport / upstream / decode / circuit-open / injection)
//! ```
//!
//! # Design Decisions
//! - Both stores get identical resilience wrapping, keyed by resource name
//! - Each operation is a single request, applied fully or not at all
//! - Errors are never swallowed; each is classified for the retry filter

pub mod error;
pub mod graph;
pub mod transport;
pub mod vector;

pub use error::{StoreError, StoreResult};
pub use graph::{GraphStoreClient, Node, NodeId, NodeMatch, Relationship, RelationshipId, Row, GRAPH_RESOURCE};
pub use vector::{Distance, PayloadFilter, Point, PointId, Record, ScoredPoint, VectorStoreClient, VECTOR_RESOURCE};
