//! Resilient, injection-safe clients for keeping a graph store and a vector
//! store in sync.

pub mod config;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;
pub mod sync;

pub use config::schema::AppConfig;
pub use resilience::{BreakerRegistry, CircuitBreaker, Resilience, RetryPolicy};
pub use store::{GraphStoreClient, StoreError, VectorStoreClient};
pub use sync::{Ingestor, ObserverRegistry};
