// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-retry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Bounded exponential-backoff retry and a per-provider circuit breaker.
//!
//! The retry engine re-invokes a producer for errors the classifier deems
//! transient, sleeping `min(initial * factor^(n-1), max) * (1 ± jitter)`
//! between attempts and honouring a server-supplied `Retry-After` hint as
//! the floor of the next delay. The circuit breaker sits outside the retry
//! loop: a call is admitted once, and the whole loop charges the breaker a
//! single success or failure.

/// Circuit-breaker state machine.
pub mod breaker;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitState};

use rand::Rng;
use serde::{Deserialize, Serialize};
use skb_cancel::CancelSignal;
use skb_error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Retry settings for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first (so `1` disables retries).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Jitter fraction in `[0, 1]`; each delay is scaled by a uniform
    /// factor in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
    /// Extra error codes (e.g. `"ECONNRESET"`) treated as retryable when
    /// they appear as an error's code or in its message.
    pub retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            jitter: 0.1,
            retryable_errors: vec![
                "ECONNRESET".into(),
                "ETIMEDOUT".into(),
                "ECONNREFUSED".into(),
                "ENOTFOUND".into(),
                "CERT_HAS_EXPIRED".into(),
            ],
        }
    }
}

impl RetryPolicy {
    /// Whether `err` may be retried under this policy.
    ///
    /// Retryable: NETWORK / SERVER / RATE_LIMIT categories, HTTP 5xx and
    /// 429 statuses, causes advertising a retryable hint, and any error
    /// whose code or message matches [`RetryPolicy::retryable_errors`].
    #[must_use]
    pub fn should_retry(&self, err: &ProviderError) -> bool {
        if err.is_retryable() {
            return true;
        }
        if let Some(status) = err.status {
            if (500..=599).contains(&status) || status == 429 {
                return true;
            }
        }
        let code = err
            .context
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        self.retryable_errors
            .iter()
            .any(|known| known == code || err.message.contains(known.as_str()))
    }

    /// Backoff before retry number `attempt` (1-based: the delay after the
    /// first failed attempt is `delay_for(1, ..)`).
    ///
    /// `retry_after` is a server hint used as the floor of the result.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let raw = (self.initial_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        let jitter = self.jitter.clamp(0.0, 1.0);
        let scale = if jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };
        let backoff = Duration::from_millis((raw * scale).round() as u64);
        match retry_after {
            Some(floor) => backoff.max(floor),
            None => backoff,
        }
    }

    /// Run `producer` under this policy.
    ///
    /// The producer is invoked once per attempt and never again after a
    /// success. Cancellation aborts before the next sleep and surfaces as a
    /// CANCELLED error. Retries of a single operation are strictly
    /// sequential.
    pub async fn run<T, F, Fut>(
        &self,
        provider: &str,
        cancel: &CancelSignal,
        mut producer: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(ProviderError::cancelled(provider));
            }
            match producer(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= attempts || !self.should_retry(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt, err.retry_after);
                    debug!(
                        target: "skb.retry",
                        provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after backoff"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(ProviderError::cancelled(provider));
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Retry-After parsing
// ---------------------------------------------------------------------------

/// Parse a `Retry-After` header value: either delta-seconds or an HTTP-date.
///
/// Dates already in the past yield `Duration::ZERO`.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
