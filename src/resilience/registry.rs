//! Named circuit breakers shared across clients.
//!
//! Two clients pointed at the same resource name share one breaker, so
//! failures observed by either count toward the same threshold.

use dashmap::DashMap;
use std::sync::{Arc, OnceLock};

use crate::config::schema::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};

#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static BreakerRegistry {
        static GLOBAL: OnceLock<BreakerRegistry> = OnceLock::new();
        GLOBAL.get_or_init(BreakerRegistry::new)
    }

    /// Return the breaker for `name`, creating it with `config` on first use.
    /// Later calls ignore `config`.
    pub fn get_or_create(&self, name: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config.clone())))
            .clone()
    }

    /// Register an externally built breaker, replacing any with the same name.
    pub fn insert(&self, breaker: Arc<CircuitBreaker>) {
        self.breakers.insert(breaker.name().to_string(), breaker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    /// Snapshots of all breakers, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|entry| entry.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Force every breaker closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;

    #[test]
    fn test_same_name_shares_breaker() {
        let registry = BreakerRegistry::new();
        let config = CircuitBreakerConfig::default();
        let a = registry.get_or_create("neo4j", &config);
        let b = registry.get_or_create("neo4j", &config);
        assert!(Arc::ptr_eq(&a, &b));

        a.record_failure();
        assert_eq!(b.failure_count(), 1);
    }

    #[test]
    fn test_snapshot_sorted_and_reset_all() {
        let registry = BreakerRegistry::new();
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        };
        registry.get_or_create("qdrant", &config).record_failure();
        registry.get_or_create("neo4j", &config);

        let names: Vec<_> = registry.snapshot().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["neo4j", "qdrant"]);
        assert_eq!(registry.get("qdrant").unwrap().state(), CircuitState::Open);

        registry.reset_all();
        assert!(registry.snapshot().iter().all(|s| s.state == CircuitState::Closed));
        assert!(registry.get("missing").is_none());
    }
}
