//! Per-source circuit breakers.
//!
//! The only process-wide mutable state in the engine. Every update happens
//! under a short, non-async critical section; no lock is held across an
//! await point.
//!
//! ```text
//! Closed --N consecutive failures--> Open --cool-down elapsed--> HalfOpen
//!   ^                                  ^                            |
//!   |                                  +----trial fails (backoff)---+
//!   +-----------------------trial succeeds--------------------------+
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::core::SourceId;

/// Default consecutive failures before a circuit opens.
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// Default initial cool-down.
const DEFAULT_COOLDOWN_SECS: u64 = 30;
/// Default ceiling for the backed-off cool-down.
const DEFAULT_MAX_COOLDOWN_SECS: u64 = 300;

/// Circuit breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Cool-down before the first half-open trial.
    pub cooldown: Duration,
    /// Ceiling for the doubled cool-down after failed trials.
    pub max_cooldown: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            max_cooldown: Duration::from_secs(DEFAULT_MAX_COOLDOWN_SECS),
        }
    }
}

/// Lifecycle state of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are refused until the cool-down elapses.
    Open,
    /// A single trial call is allowed through.
    HalfOpen,
}

/// Result of asking a breaker for permission to call its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; call normally.
    Allowed,
    /// Circuit half-open; this call is the single trial.
    Trial,
    /// Circuit open (or a trial is already running); do not call.
    Rejected,
}

impl Admission {
    /// Whether the call may proceed.
    #[must_use]
    pub const fn permits(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Read-only view of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures recorded.
    pub failures: u32,
    /// When the last failure was recorded.
    pub last_failure: Option<Instant>,
}

#[derive(Debug, Clone)]
struct Breaker {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    cooldown: Duration,
    trial_in_flight: bool,
}

impl Breaker {
    const fn new(cooldown: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
            opened_at: None,
            cooldown,
            trial_in_flight: false,
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.opened_at
            .is_none_or(|at| now.saturating_duration_since(at) >= self.cooldown)
    }
}

/// Registry of circuit breakers keyed by source.
#[derive(Debug)]
pub struct CircuitBreakers {
    config: CircuitConfig,
    inner: Mutex<HashMap<SourceId, Breaker>>,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

impl CircuitBreakers {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Tuning in effect.
    #[must_use]
    pub const fn config(&self) -> &CircuitConfig {
        &self.config
    }

    fn with_breaker<T>(&self, id: &SourceId, f: impl FnOnce(&mut Breaker) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = guard
            .entry(id.clone())
            .or_insert_with(|| Breaker::new(self.config.cooldown));
        f(breaker)
    }

    /// Whether a planner should leave this source out.
    ///
    /// True while the circuit is open and cooling down, or while a half-open
    /// trial is already in flight. Does not change state.
    #[must_use]
    pub fn is_open(&self, id: &SourceId) -> bool {
        let now = Instant::now();
        self.with_breaker(id, |b| match b.state {
            CircuitState::Closed => false,
            CircuitState::Open => !b.cooldown_elapsed(now),
            CircuitState::HalfOpen => b.trial_in_flight,
        })
    }

    /// Asks permission to call a source, moving `Open` to `HalfOpen` once the
    /// cool-down has elapsed.
    pub fn admit(&self, id: &SourceId) -> Admission {
        let now = Instant::now();
        self.with_breaker(id, |b| match b.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open if b.cooldown_elapsed(now) => {
                b.state = CircuitState::HalfOpen;
                b.trial_in_flight = true;
                info!(source = %id, "circuit half-open, allowing trial call");
                Admission::Trial
            }
            CircuitState::HalfOpen if !b.trial_in_flight => {
                b.trial_in_flight = true;
                Admission::Trial
            }
            CircuitState::Open | CircuitState::HalfOpen => Admission::Rejected,
        })
    }

    /// Records a successful call. Closes a half-open circuit.
    pub fn record_success(&self, id: &SourceId) {
        let base = self.config.cooldown;
        self.with_breaker(id, |b| {
            if b.state != CircuitState::Closed {
                info!(source = %id, "circuit closed after successful trial");
            }
            *b = Breaker::new(base);
        });
    }

    /// Records a call the source rejected as invalid input.
    ///
    /// Says nothing about the store's health: a half-open circuit frees its
    /// trial slot and stays half-open, other states are left alone.
    pub fn record_rejected(&self, id: &SourceId) {
        self.with_breaker(id, |b| {
            if b.state == CircuitState::HalfOpen {
                b.trial_in_flight = false;
            }
        });
    }

    /// Records a failed call, opening the circuit at the threshold and
    /// re-opening with a doubled cool-down after a failed trial.
    pub fn record_failure(&self, id: &SourceId) {
        let now = Instant::now();
        let threshold = self.config.failure_threshold.max(1);
        let max_cooldown = self.config.max_cooldown;
        self.with_breaker(id, |b| {
            b.failures = b.failures.saturating_add(1);
            b.last_failure = Some(now);
            match b.state {
                CircuitState::HalfOpen => {
                    b.cooldown = b.cooldown.saturating_mul(2).min(max_cooldown);
                    b.state = CircuitState::Open;
                    b.opened_at = Some(now);
                    b.trial_in_flight = false;
                    warn!(source = %id, cooldown_ms = b.cooldown.as_millis(), "trial failed, circuit re-opened");
                }
                CircuitState::Closed if b.failures >= threshold => {
                    b.state = CircuitState::Open;
                    b.opened_at = Some(now);
                    warn!(source = %id, failures = b.failures, "circuit opened");
                }
                CircuitState::Closed | CircuitState::Open => {}
            }
        });
    }

    /// Current view of a source's circuit.
    #[must_use]
    pub fn snapshot(&self, id: &SourceId) -> CircuitSnapshot {
        self.with_breaker(id, |b| CircuitSnapshot {
            state: b.state,
            failures: b.failures,
            last_failure: b.last_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakers() -> CircuitBreakers {
        CircuitBreakers::new(CircuitConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(10),
            max_cooldown: Duration::from_secs(30),
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breakers();
        let id = SourceId::new("jira");
        cb.record_failure(&id);
        assert_eq!(cb.snapshot(&id).state, CircuitState::Closed);
        cb.record_failure(&id);
        assert_eq!(cb.snapshot(&id).state, CircuitState::Open);
        assert!(cb.is_open(&id));
        assert_eq!(cb.admit(&id), Admission::Rejected);
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = breakers();
        let id = SourceId::new("jira");
        cb.record_failure(&id);
        cb.record_success(&id);
        cb.record_failure(&id);
        assert_eq!(cb.snapshot(&id).state, CircuitState::Closed);
        assert_eq!(cb.snapshot(&id).failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_single_trial() {
        let cb = breakers();
        let id = SourceId::new("git");
        cb.record_failure(&id);
        cb.record_failure(&id);
        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!cb.is_open(&id));
        assert_eq!(cb.admit(&id), Admission::Trial);
        assert_eq!(cb.snapshot(&id).state, CircuitState::HalfOpen);
        assert_eq!(cb.admit(&id), Admission::Rejected);
        assert!(cb.is_open(&id));

        cb.record_success(&id);
        assert_eq!(cb.snapshot(&id).state, CircuitState::Closed);
        assert_eq!(cb.admit(&id), Admission::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_backs_off() {
        let cb = breakers();
        let id = SourceId::new("git");
        cb.record_failure(&id);
        cb.record_failure(&id);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cb.admit(&id), Admission::Trial);
        cb.record_failure(&id);
        assert_eq!(cb.snapshot(&id).state, CircuitState::Open);

        // Cool-down doubled to 20s: still open after 11s.
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cb.is_open(&id));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.admit(&id), Admission::Trial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_trial_keeps_circuit_half_open() {
        let cb = breakers();
        let id = SourceId::new("git");
        cb.record_failure(&id);
        cb.record_failure(&id);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cb.admit(&id), Admission::Trial);

        cb.record_rejected(&id);
        let snapshot = cb.snapshot(&id);
        assert_eq!(snapshot.state, CircuitState::HalfOpen);
        assert_eq!(snapshot.failures, 2);
        assert!(!cb.is_open(&id));
        assert_eq!(cb.admit(&id), Admission::Trial);
    }

    #[test]
    fn test_rejected_call_leaves_closed_circuit_alone() {
        let cb = breakers();
        let id = SourceId::new("jira");
        cb.record_failure(&id);
        cb.record_rejected(&id);
        assert_eq!(cb.snapshot(&id).state, CircuitState::Closed);
        assert_eq!(cb.snapshot(&id).failures, 1);
    }

    #[test]
    fn test_sources_are_independent() {
        let cb = breakers();
        let a = SourceId::new("a");
        let b = SourceId::new("b");
        cb.record_failure(&a);
        cb.record_failure(&a);
        assert!(cb.is_open(&a));
        assert!(!cb.is_open(&b));
    }
}
