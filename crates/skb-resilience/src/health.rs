// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sliding-window success/failure accounting behind provider health status.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Success-rate threshold at or above which a provider counts as healthy.
pub const HEALTHY_THRESHOLD: f64 = 0.95;
/// Success-rate threshold at or above which a provider counts as degraded
/// rather than unhealthy.
pub const DEGRADED_THRESHOLD: f64 = 0.70;

/// Health of a single provider, derived from its recent success ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// ≥ 95 % of recent calls succeeded.
    Healthy,
    /// ≥ 70 % of recent calls succeeded.
    Degraded,
    /// Below 70 %, or the circuit breaker is open.
    Unhealthy,
}

struct Window {
    samples: VecDeque<(Instant, bool)>,
}

/// Rolling window of call outcomes for one provider.
///
/// Cloning yields another handle to the same window.
#[derive(Clone)]
pub struct HealthCounters {
    window: Arc<Mutex<Window>>,
    span: Duration,
    max_samples: usize,
}

impl HealthCounters {
    /// Track outcomes over the given span, bounded at `max_samples`.
    #[must_use]
    pub fn new(span: Duration, max_samples: usize) -> Self {
        Self {
            window: Arc::new(Mutex::new(Window {
                samples: VecDeque::new(),
            })),
            span,
            max_samples: max_samples.max(1),
        }
    }

    /// Record the outcome of one call.
    pub fn record(&self, success: bool) {
        let mut w = self.window.lock().expect("health lock poisoned");
        let now = Instant::now();
        w.samples.push_back((now, success));
        while w.samples.len() > self.max_samples {
            w.samples.pop_front();
        }
        let span = self.span;
        while let Some(&(at, _)) = w.samples.front() {
            if now.duration_since(at) > span {
                w.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Success ratio over the current window; `None` with no samples.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        let mut w = self.window.lock().expect("health lock poisoned");
        let now = Instant::now();
        let span = self.span;
        while let Some(&(at, _)) = w.samples.front() {
            if now.duration_since(at) > span {
                w.samples.pop_front();
            } else {
                break;
            }
        }
        if w.samples.is_empty() {
            return None;
        }
        let ok = w.samples.iter().filter(|(_, s)| *s).count();
        Some(ok as f64 / w.samples.len() as f64)
    }

    /// Number of samples currently in the window.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.window.lock().expect("health lock poisoned").samples.len()
    }

    /// Derive a status. A provider with an open breaker is always
    /// unhealthy; one with no recent samples is presumed healthy.
    #[must_use]
    pub fn status(&self, breaker_open: bool) -> HealthStatus {
        if breaker_open {
            return HealthStatus::Unhealthy;
        }
        match self.success_rate() {
            None => HealthStatus::Healthy,
            Some(rate) if rate >= HEALTHY_THRESHOLD => HealthStatus::Healthy,
            Some(rate) if rate >= DEGRADED_THRESHOLD => HealthStatus::Degraded,
            Some(_) => HealthStatus::Unhealthy,
        }
    }

    /// Drop all samples.
    pub fn clear(&self) {
        self.window
            .lock()
            .expect("health lock poisoned")
            .samples
            .clear();
    }
}

impl std::fmt::Debug for HealthCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCounters")
            .field("samples", &self.sample_count())
            .finish()
    }
}
