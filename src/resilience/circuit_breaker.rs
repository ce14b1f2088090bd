//! Circuit breaker for store protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: resource assumed down, calls fail fast
//! - Half-Open: trial calls test whether the resource recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: recovery timeout elapsed (checked on the next call)
//! Half-Open → Closed: success_threshold consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - One breaker per protected resource, shared through the registry
//! - No background timer; Open → Half-Open is evaluated lazily per call
//! - Half-Open admits at most `success_threshold` trial calls at a time;
//!   callers beyond that fail fast
//! - An outcome counts only against the state its call was admitted under;
//!   calls that finish after a transition are ignored
//! - A success while Closed decrements the failure count by one (floor 0),
//!   so sporadic failures decay instead of resetting outright
//! - Every transition is logged and exported as a gauge

use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::schema::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0 = closed, 1 = half-open, 2 = open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned instead of running the operation while the breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{breaker}' is open; retry after {retry_after:?}")]
pub struct CircuitOpenError {
    pub breaker: String,
    pub retry_after: Duration,
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Milliseconds spent in the Open state, when open.
    pub open_for_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Bumped on every transition.
    generation: u64,
    trials_in_flight: u32,
}

/// Proof that a call was let through, tied to the state it was admitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    state: CircuitState,
    generation: u64,
}

impl Admission {
    pub fn state(&self) -> CircuitState {
        self.state
    }
}

/// Releases a Half-Open trial slot if the call is dropped before finishing.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Option<Admission>,
}

impl TrialGuard<'_> {
    fn finish(mut self, success: bool) {
        if let Some(admission) = self.admission.take() {
            self.breaker.complete(admission, success);
        }
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.breaker.release(admission);
        }
    }
}

/// Three-state circuit breaker guarding one resource.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a breaker using the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a breaker reading time from `clock`.
    pub fn with_clock(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let name = name.into();
        metrics::record_circuit_state(&name, CircuitState::Closed);
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                generation: 0,
                trials_in_flight: 0,
            }),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state without evaluating the recovery timeout.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures counted while Closed (or that caused the last opening).
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Consecutive successes counted while Half-Open.
    pub fn success_count(&self) -> u32 {
        self.lock().consecutive_successes
    }

    /// Run `operation` unless the breaker is open.
    ///
    /// The operation's own error is always returned unchanged; the breaker
    /// only records the outcome.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let admission = self.try_acquire().map_err(E::from)?;
        let guard = TrialGuard {
            breaker: self,
            admission: Some(admission),
        };

        let result = operation().await;
        guard.finish(result.is_ok());
        result
    }

    /// Admit or reject a call, moving Open → Half-Open once the recovery
    /// timeout has elapsed. Every admission must be settled with
    /// [`complete`](Self::complete) or [`release`](Self::release).
    pub fn try_acquire(&self) -> Result<Admission, CircuitOpenError> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let now = self.clock.now();
            let opened_at = inner.opened_at.unwrap_or(now);
            let elapsed = now.saturating_duration_since(opened_at);
            let recovery = self.config.recovery_timeout();

            if elapsed < recovery {
                tracing::debug!(breaker = %self.name, "Circuit open, failing fast");
                return Err(CircuitOpenError {
                    breaker: self.name.clone(),
                    retry_after: recovery - elapsed,
                });
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.trials_in_flight >= self.max_trials() {
                tracing::debug!(breaker = %self.name, "Half-open trial slots taken, failing fast");
                return Err(CircuitOpenError {
                    breaker: self.name.clone(),
                    retry_after: Duration::ZERO,
                });
            }
            inner.trials_in_flight += 1;
        }

        Ok(Admission {
            state: inner.state,
            generation: inner.generation,
        })
    }

    /// Record the outcome of an admitted call. Outcomes of calls admitted
    /// before the latest transition are ignored.
    pub fn complete(&self, admission: Admission, success: bool) {
        let mut inner = self.lock();
        if admission.generation != inner.generation {
            tracing::debug!(
                breaker = %self.name,
                admitted_in = %admission.state,
                state = %inner.state,
                "Ignoring outcome admitted before a transition"
            );
            return;
        }
        if inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
        if success {
            self.on_success(&mut inner);
        } else {
            self.on_failure(&mut inner);
        }
    }

    /// Give back an admission whose call never finished.
    pub fn release(&self, admission: Admission) {
        let mut inner = self.lock();
        if admission.generation == inner.generation && inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }

    /// Count a success against the current state.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        self.on_success(&mut inner);
    }

    /// Count a failure against the current state.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        self.on_failure(&mut inner);
    }

    fn max_trials(&self) -> u32 {
        self.config.success_threshold.max(1)
    }

    fn on_success(&self, inner: &mut BreakerInner) {
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition(inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut BreakerInner) {
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Force the breaker back to Closed with cleared counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let open_for_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => Some(
                self.clock.now().saturating_duration_since(opened_at).as_millis() as u64,
            ),
            _ => None,
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.consecutive_failures,
            success_count: inner.consecutive_successes,
            open_for_ms,
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.generation += 1;
        inner.trials_in_flight = 0;
        match to {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.consecutive_successes = 0;
                inner.opened_at = None;
            }
            CircuitState::Open => {
                inner.consecutive_successes = 0;
                inner.opened_at = Some(self.clock.now());
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes = 0;
            }
        }

        if to == CircuitState::Open {
            tracing::warn!(
                breaker = %self.name,
                from = %from,
                to = %to,
                failure_count = inner.consecutive_failures,
                "Circuit breaker state transition"
            );
        } else {
            tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                failure_count = inner.consecutive_failures,
                "Circuit breaker state transition"
            );
        }
        metrics::record_circuit_state(&self.name, to);
        metrics::record_circuit_transition(&self.name, to);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Failed,
        Open(CircuitOpenError),
    }

    impl From<CircuitOpenError> for TestError {
        fn from(err: CircuitOpenError) -> Self {
            TestError::Open(err)
        }
    }

    fn config(failure_threshold: u32, recovery_timeout_secs: u64, success_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout_secs,
            success_threshold,
        }
    }

    fn breaker(cfg: CircuitBreakerConfig) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::with_clock("test-db", cfg, clock.clone());
        (breaker, clock)
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), TestError> {
        breaker.call(|| async { Err::<(), _>(TestError::Failed) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), TestError> {
        breaker.call(|| async { Ok::<(), TestError>(()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        for threshold in 1..=6 {
            let (breaker, _clock) = breaker(config(threshold, 30, 2));

            for _ in 0..threshold {
                assert_eq!(fail(&breaker).await, Err(TestError::Failed));
            }
            assert_eq!(breaker.state(), CircuitState::Open);

            let invoked = AtomicU32::new(0);
            let result = breaker
                .call(|| {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<(), TestError>(()) }
                })
                .await;

            assert!(matches!(result, Err(TestError::Open(_))));
            assert_eq!(invoked.load(Ordering::SeqCst), 0, "operation must not run while open");
        }
    }

    #[tokio::test]
    async fn test_success_while_closed_decrements_failure_count() {
        let (breaker, _clock) = breaker(config(5, 30, 2));

        fail(&breaker).await.ok();
        fail(&breaker).await.ok();
        fail(&breaker).await.ok();
        assert_eq!(breaker.failure_count(), 3);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.failure_count(), 2);

        for _ in 0..5 {
            succeed(&breaker).await.unwrap();
        }
        assert_eq!(breaker.failure_count(), 0, "count floors at zero");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_recovery_timeout() {
        for timeout_secs in [1u64, 5, 30] {
            let (breaker, clock) = breaker(config(1, timeout_secs, 1));
            fail(&breaker).await.ok();
            assert_eq!(breaker.state(), CircuitState::Open);

            clock.advance(Duration::from_secs(timeout_secs) - Duration::from_millis(1));
            let err = breaker.try_acquire().unwrap_err();
            assert_eq!(err.retry_after, Duration::from_millis(1));
            assert_eq!(breaker.state(), CircuitState::Open);

            clock.advance(Duration::from_millis(1));
            assert!(breaker.try_acquire().is_ok());
            assert_eq!(breaker.state(), CircuitState::HalfOpen);
        }
    }

    #[tokio::test]
    async fn test_half_open_closes_after_success_threshold() {
        for success_threshold in 1..=4 {
            let (breaker, clock) = breaker(config(2, 10, success_threshold));
            fail(&breaker).await.ok();
            fail(&breaker).await.ok();
            clock.advance(Duration::from_secs(10));

            for i in 1..success_threshold {
                succeed(&breaker).await.unwrap();
                assert_eq!(breaker.state(), CircuitState::HalfOpen);
                assert_eq!(breaker.success_count(), i);
            }
            succeed(&breaker).await.unwrap();

            assert_eq!(breaker.state(), CircuitState::Closed);
            assert_eq!(breaker.failure_count(), 0);
            assert_eq!(breaker.success_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_single_failure_in_half_open_reopens() {
        let (breaker, clock) = breaker(config(3, 10, 3));
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }
        clock.advance(Duration::from_secs(10));

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert_eq!(fail(&breaker).await, Err(TestError::Failed));
        assert_eq!(breaker.state(), CircuitState::Open);

        // The recovery window restarts from the reopening.
        clock.advance(Duration::from_secs(9));
        assert!(matches!(succeed(&breaker).await, Err(TestError::Open(_))));
    }

    #[tokio::test]
    async fn test_half_open_limits_concurrent_trials() {
        let (breaker, clock) = breaker(config(1, 10, 2));
        fail(&breaker).await.ok();
        clock.advance(Duration::from_secs(10));

        let first = breaker.try_acquire().unwrap();
        let second = breaker.try_acquire().unwrap();
        assert_eq!(first.state(), CircuitState::HalfOpen);
        let err = breaker.try_acquire().unwrap_err();
        assert_eq!(err.retry_after, Duration::ZERO);

        breaker.complete(first, true);
        let third = breaker.try_acquire().unwrap();
        breaker.complete(second, true);
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Finished after the breaker closed; must not count as a closed-state failure.
        breaker.complete(third, false);
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_trial_frees_its_slot() {
        let (breaker, clock) = breaker(config(1, 10, 1));
        fail(&breaker).await.ok();
        clock.advance(Duration::from_secs(10));

        let hung = breaker.call(std::future::pending::<Result<(), TestError>>);
        assert!(tokio::time::timeout(Duration::from_millis(5), hung).await.is_err());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_outcome_admitted_before_transition_is_ignored() {
        let (breaker, clock) = breaker(config(1, 10, 1));
        let stale = breaker.try_acquire().unwrap();
        assert_eq!(stale.state(), CircuitState::Closed);

        fail(&breaker).await.ok();
        clock.advance(Duration::from_secs(10));
        let trial = breaker.try_acquire().unwrap();

        breaker.complete(stale, true);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.success_count(), 0);

        breaker.complete(trial, true);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_closes_and_clears() {
        let (breaker, _clock) = breaker(config(1, 60, 1));
        fail(&breaker).await.ok();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.open_for_ms, None);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_reports_open_duration() {
        let (breaker, clock) = breaker(config(1, 60, 1));
        fail(&breaker).await.ok();
        clock.advance(Duration::from_millis(1500));

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.name, "test-db");
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.open_for_ms, Some(1500));
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let breaker = Arc::new(CircuitBreaker::new("shared", config(1000, 30, 1)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = breaker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        breaker.record_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(breaker.failure_count(), 800);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
