//! Per-dependency circuit breakers.
//!
//! A breaker wraps calls to one remote dependency. After
//! `failure_threshold` consecutive failures it opens and rejects calls
//! without touching the network; after `recovery_timeout` it lets exactly
//! one trial call through (half-open) and either closes on success or
//! re-opens on failure.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::observability;

/// Milliseconds since the Unix epoch. All breaker timing is done against
/// explicit instants so state transitions are testable without sleeping.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker waits before allowing a trial call.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure_time: Option<i64>,
    /// Half-open admits a single trial at a time.
    trial_in_flight: bool,
    total_requests: u64,
    total_failures: u64,
}

/// Read-only snapshot for dashboards and the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub last_failure_time_ms: Option<i64>,
    pub total_requests: u64,
    pub total_failures: u64,
    /// Remaining wait before an open breaker admits a trial. `None` unless
    /// the breaker is open.
    pub time_until_recovery_secs: Option<u64>,
}

#[derive(Debug)]
pub enum BreakerError<E> {
    /// Rejected without calling the dependency.
    Open,
    /// The dependency was called and failed.
    Service(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit breaker is open"),
            BreakerError::Service(e) => write!(f, "service call failed: {e}"),
        }
    }
}

impl<E: std::fmt::Display + std::fmt::Debug> std::error::Error for BreakerError<E> {}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trial_in_flight: false,
                total_requests: 0,
                total_failures: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn publish_state(&self, state: BreakerState) {
        let v = match state {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        };
        metrics::gauge!(
            observability::BREAKER_STATE,
            "dependency" => self.name.clone()
        )
        .set(v);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a panic mid-update elsewhere; breaker
        // counters are always left consistent, so keep serving.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed at instant `now`. Flips an open
    /// breaker to half-open once the recovery timeout has elapsed.
    fn admit(&self, now: i64) -> Result<(), ()> {
        let mut inner = self.lock();
        inner.total_requests += 1;
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| now.saturating_sub(t))
                    .unwrap_or(i64::MAX);
                if elapsed >= self.config.recovery_timeout.as_millis() as i64 {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    drop(inner);
                    self.publish_state(BreakerState::HalfOpen);
                    tracing::info!(breaker = %self.name, "circuit breaker half-open, admitting trial call");
                    Ok(())
                } else {
                    Err(())
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(())
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, "circuit breaker closed after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.trial_in_flight = false;
        drop(inner);
        self.publish_state(BreakerState::Closed);
    }

    fn record_failure(&self, now: i64) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.last_failure_time = Some(now);
        inner.trial_in_flight = false;
        let opened = match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "circuit breaker opened"
                    );
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                // The trial failed. Straight back to open, count intact.
                inner.state = BreakerState::Open;
                tracing::warn!(breaker = %self.name, "trial call failed, circuit breaker re-opened");
                true
            }
            BreakerState::Open => false,
        };
        drop(inner);
        if opened {
            self.publish_state(BreakerState::Open);
        }
    }

    /// Run `f` through the breaker. Rejection happens before `f` is awaited,
    /// so an open breaker never touches the wrapped dependency.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.admit(now_ms()).is_err() {
            metrics::counter!(
                observability::BREAKER_REJECTIONS_TOTAL,
                "dependency" => self.name.clone()
            )
            .increment(1);
            return Err(BreakerError::Open);
        }
        match f().await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure(now_ms());
                Err(BreakerError::Service(e))
            }
        }
    }

    /// Snapshot the breaker without mutating it. In particular an elapsed
    /// recovery timeout is reported but the open-to-half-open transition
    /// only happens on an actual call.
    pub fn status(&self) -> BreakerStatus {
        self.status_at(now_ms())
    }

    fn status_at(&self, now: i64) -> BreakerStatus {
        let inner = self.lock();
        let time_until_recovery_secs = match inner.state {
            BreakerState::Open => inner.last_failure_time.map(|t| {
                let deadline = t + self.config.recovery_timeout.as_millis() as i64;
                (deadline.saturating_sub(now).max(0) as u64).div_ceil(1000)
            }),
            _ => None,
        };
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs(),
            last_failure_time_ms: inner.last_failure_time,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
            time_until_recovery_secs,
        }
    }

    /// Operator reset: back to closed with a clean failure window. Lifetime
    /// totals are kept, they are observability data rather than state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.trial_in_flight = false;
        drop(inner);
        self.publish_state(BreakerState::Closed);
        tracing::info!(breaker = %self.name, "circuit breaker reset by operator");
    }
}

/// Named breakers, one per remote dependency. Injected wherever a breaker
/// is needed rather than held in a global.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or fetch) the breaker for `name`.
    pub fn register(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|e| e.value().clone())
    }

    pub fn status(&self, name: &str) -> Option<BreakerStatus> {
        self.get(name).map(|b| b.status())
    }

    pub fn status_all(&self) -> Vec<BreakerStatus> {
        let mut all: Vec<BreakerStatus> =
            self.breakers.iter().map(|e| e.value().status()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Reset one breaker. False when no breaker is registered under `name`.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(b) => {
                b.reset();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "users",
            BreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(60),
            },
        )
    }

    #[test]
    fn opens_at_threshold() {
        let b = breaker();
        b.record_failure(1_000);
        b.record_failure(2_000);
        assert_eq!(b.status_at(2_000).state, BreakerState::Closed);
        b.record_failure(3_000);
        assert_eq!(b.status_at(3_000).state, BreakerState::Open);
    }

    #[test]
    fn open_rejects_until_recovery_elapses() {
        let b = breaker();
        for t in [1_000, 2_000, 3_000] {
            b.record_failure(t);
        }
        assert!(b.admit(3_001).is_err());
        assert!(b.admit(3_000 + 59_999).is_err());
        // One recovery timeout after the last failure the trial is admitted.
        assert!(b.admit(3_000 + 60_000).is_ok());
        assert_eq!(b.status_at(63_000).state, BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_admits_single_trial() {
        let b = breaker();
        for t in [1_000, 2_000, 3_000] {
            b.record_failure(t);
        }
        assert!(b.admit(63_000).is_ok());
        assert!(b.admit(63_001).is_err());
    }

    #[test]
    fn trial_success_closes_and_clears_failures() {
        let b = breaker();
        for t in [1_000, 2_000, 3_000] {
            b.record_failure(t);
        }
        assert!(b.admit(63_000).is_ok());
        b.record_success();
        let s = b.status_at(63_001);
        assert_eq!(s.state, BreakerState::Closed);
        assert_eq!(s.failure_count, 0);
        // Closed again: calls flow freely.
        assert!(b.admit(63_002).is_ok());
        assert!(b.admit(63_003).is_ok());
    }

    #[test]
    fn trial_failure_reopens() {
        let b = breaker();
        for t in [1_000, 2_000, 3_000] {
            b.record_failure(t);
        }
        assert!(b.admit(63_000).is_ok());
        b.record_failure(63_000);
        assert_eq!(b.status_at(63_001).state, BreakerState::Open);
        // The clock restarts from the trial failure.
        assert!(b.admit(63_000 + 59_999).is_err());
        assert!(b.admit(63_000 + 60_000).is_ok());
    }

    #[test]
    fn status_does_not_mutate() {
        let b = breaker();
        for t in [1_000, 2_000, 3_000] {
            b.record_failure(t);
        }
        // Recovery has elapsed, but a status read must not flip the state.
        let s = b.status_at(200_000);
        assert_eq!(s.state, BreakerState::Open);
        assert_eq!(s.time_until_recovery_secs, Some(0));
        assert_eq!(b.status_at(200_000).state, BreakerState::Open);
    }

    #[test]
    fn time_until_recovery_counts_down() {
        let b = breaker();
        for t in [1_000, 2_000, 3_000] {
            b.record_failure(t);
        }
        assert_eq!(b.status_at(3_000).time_until_recovery_secs, Some(60));
        assert_eq!(b.status_at(33_000).time_until_recovery_secs, Some(30));
        assert_eq!(b.status_at(63_000).time_until_recovery_secs, Some(0));
        b.reset();
        assert_eq!(b.status_at(63_000).time_until_recovery_secs, None);
    }

    #[test]
    fn reset_clears_state_but_keeps_totals() {
        let b = breaker();
        let _ = b.admit(500);
        for t in [1_000, 2_000, 3_000] {
            b.record_failure(t);
        }
        b.reset();
        let s = b.status_at(4_000);
        assert_eq!(s.state, BreakerState::Closed);
        assert_eq!(s.failure_count, 0);
        assert_eq!(s.last_failure_time_ms, None);
        assert_eq!(s.total_requests, 1);
        assert_eq!(s.total_failures, 3);
        assert!(b.admit(4_001).is_ok());
    }

    #[tokio::test]
    async fn call_routes_outcomes_through_state() {
        let b = CircuitBreaker::new(
            "rooms",
            BreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
            },
        );
        let err: Result<u32, BreakerError<&str>> = b.call(|| async { Err("boom") }).await;
        assert!(matches!(err, Err(BreakerError::Service("boom"))));
        // Threshold of one: the next call is rejected without running.
        let rejected: Result<u32, BreakerError<&str>> =
            b.call(|| async { panic!("must not run") }).await;
        assert!(matches!(rejected, Err(BreakerError::Open)));
    }

    #[test]
    fn registry_registers_and_resets() {
        let reg = BreakerRegistry::new();
        let users = reg.register("users", BreakerConfig::default());
        let again = reg.register("users", BreakerConfig::default());
        assert!(Arc::ptr_eq(&users, &again));

        for t in [1, 2, 3, 4, 5] {
            users.record_failure(t);
        }
        assert_eq!(reg.status("users").unwrap().state, BreakerState::Open);
        assert!(reg.reset("users"));
        assert_eq!(reg.status("users").unwrap().state, BreakerState::Closed);
        assert!(!reg.reset("payments"));

        reg.register("rooms", BreakerConfig::default());
        let all = reg.status_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "rooms");
        assert_eq!(all[1].name, "users");
    }
}
