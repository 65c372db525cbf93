// SPDX-License-Identifier: MIT OR Apache-2.0
//! Circuit-breaker state machine, one per provider.
//!
//! CLOSED → OPEN after a run of consecutive failures; OPEN → HALF_OPEN once
//! the reset timeout elapses; HALF_OPEN → CLOSED after enough consecutive
//! successes, or straight back to OPEN (with a fresh timer) on any failure.
//! The breaker never times calls out itself; that is the facade's job.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Breaker settings for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Time the breaker stays open before admitting a probe call, in
    /// milliseconds.
    pub reset_timeout_ms: u64,
    /// Consecutive half-open successes required to close again.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            half_open_success_threshold: 2,
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without reaching the provider.
    Open,
    /// Probe calls are admitted to test recovery.
    HalfOpen,
}

/// Synchronous rejection raised while the breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit open for {provider}; retry in {retry_in:?}")]
pub struct CircuitOpenError {
    /// Provider whose breaker rejected the call.
    pub provider: String,
    /// Time until the breaker will admit a probe.
    pub retry_in: Duration,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

struct BreakerShared {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Per-provider circuit breaker. Cloning yields another handle to the same
/// breaker.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<BreakerShared>,
}

impl CircuitBreaker {
    /// Build a breaker for the named provider.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            shared: Arc::new(BreakerShared {
                name: name.into(),
                config,
                inner: Mutex::new(BreakerInner {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    half_open_successes: 0,
                    opened_at: None,
                }),
            }),
        }
    }

    /// Ask the breaker to admit one call.
    ///
    /// While OPEN this fails synchronously until the reset timeout has
    /// elapsed, at which point the breaker moves to HALF_OPEN and admits
    /// the call as a probe.
    pub fn try_admit(&self) -> Result<(), CircuitOpenError> {
        let s = &self.shared;
        let mut inner = s.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let reset_after = Duration::from_millis(s.config.reset_timeout_ms);
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= reset_after {
                    info!(target: "skb.breaker", provider = %s.name, "half-open probe admitted");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    Ok(())
                } else {
                    Err(CircuitOpenError {
                        provider: s.name.clone(),
                        retry_in: reset_after - elapsed,
                    })
                }
            }
        }
    }

    /// Record one successful call.
    pub fn record_success(&self) {
        let s = &self.shared;
        let mut inner = s.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= s.config.half_open_success_threshold {
                    info!(target: "skb.breaker", provider = %s.name, "circuit closed");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                }
            }
            // A success observed while open (e.g. a call that was admitted
            // just before the trip) does not close the breaker.
            CircuitState::Open => {}
        }
    }

    /// Record one failed call.
    pub fn record_failure(&self) {
        let s = &self.shared;
        let mut inner = s.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= s.config.failure_threshold {
                    info!(target: "skb.breaker", provider = %s.name, "circuit opened");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                // Any half-open failure reopens and restarts the timer.
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, as last recorded.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.shared
            .inner
            .lock()
            .expect("breaker lock poisoned")
            .state
    }

    /// Reset to CLOSED, clearing all counters.
    pub fn reset(&self) {
        let mut inner = self.shared.inner.lock().expect("breaker lock poisoned");
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
    }

    /// Provider name this breaker belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_ms: u64, half_open: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout_ms: reset_ms,
                half_open_success_threshold: half_open,
            },
        )
    }

    #[test]
    fn starts_closed_and_admits() {
        let b = breaker(3, 100, 1);
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_admit().is_ok());
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let b = breaker(3, 100, 1);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        let err = b.try_admit().unwrap_err();
        assert!(err.retry_in <= Duration::from_millis(100));
    }

    #[test]
    fn success_resets_the_failure_run() {
        let b = breaker(3, 100, 1);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        // Still closed: the run was broken by the success.
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_rejects_until_reset_timeout() {
        let b = breaker(1, 100, 1);
        b.record_failure();
        assert!(b.try_admit().is_err());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(b.try_admit().is_err(), "still inside reset window");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(b.try_admit().is_ok(), "probe admitted after reset window");
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes() {
        let b = breaker(1, 100, 1);
        b.record_failure();
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(b.try_admit().is_ok());
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_needs_enough_successes() {
        let b = breaker(1, 100, 2);
        b.record_failure();
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(b.try_admit().is_ok());
        b.record_success();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_and_restarts_timer() {
        let b = breaker(1, 100, 1);
        b.record_failure();
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(b.try_admit().is_ok());
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        // The timer restarted: shortly after reopening we are still rejected.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(b.try_admit().is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(b.try_admit().is_ok());
    }

    #[test]
    fn reset_clears_everything() {
        let b = breaker(1, 60_000, 1);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_admit().is_ok());
    }

    #[test]
    fn clones_share_state() {
        let a = breaker(1, 60_000, 1);
        let b = a.clone();
        a.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }
}
