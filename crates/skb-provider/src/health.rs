// SPDX-License-Identifier: MIT OR Apache-2.0
//! Health monitor: merges per-provider health into one system status.
//!
//! The monitor is the one component allowed to run as a long-lived
//! singleton; it has an explicit [`HealthMonitor::start`] /
//! [`HealthMonitor::shutdown`] lifecycle and otherwise only reads
//! snapshots from the adapters it was given.

use crate::traits::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skb_cancel::CancelSignal;
use skb_resilience::{HealthReport, HealthStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Merged status of the whole bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// Every provider is healthy.
    Up,
    /// At least one provider is degraded, none unhealthy.
    Degraded,
    /// At least one provider is unhealthy.
    Down,
}

/// One poll of every provider and probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Merged status.
    pub status: SystemStatus,
    /// Per-provider reports, in registration order.
    pub providers: Vec<HealthReport>,
    /// Custom probe outcomes as (name, status).
    pub probes: Vec<(String, HealthStatus)>,
    /// When the snapshot was taken.
    pub checked_at: DateTime<Utc>,
}

type Probe = Box<dyn Fn() -> HealthStatus + Send + Sync>;

struct MonitorInner {
    targets: Mutex<Vec<Arc<dyn Provider>>>,
    probes: Mutex<Vec<(String, Probe)>>,
    latest: Mutex<Option<SystemSnapshot>>,
    stop: CancelSignal,
}

/// Periodic aggregator of provider health.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    /// A monitor with no targets yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                targets: Mutex::new(Vec::new()),
                probes: Mutex::new(Vec::new()),
                latest: Mutex::new(None),
                stop: CancelSignal::new(),
            }),
        }
    }

    /// Watch an adapter.
    pub fn watch(&self, provider: Arc<dyn Provider>) {
        self.inner
            .targets
            .lock()
            .expect("monitor lock poisoned")
            .push(provider);
    }

    /// Register a custom probe evaluated on every poll.
    pub fn register_probe(
        &self,
        name: impl Into<String>,
        probe: impl Fn() -> HealthStatus + Send + Sync + 'static,
    ) {
        self.inner
            .probes
            .lock()
            .expect("monitor lock poisoned")
            .push((name.into(), Box::new(probe)));
    }

    /// Poll every target and probe once.
    #[must_use]
    pub fn snapshot(&self) -> SystemSnapshot {
        let providers: Vec<HealthReport> = self
            .inner
            .targets
            .lock()
            .expect("monitor lock poisoned")
            .iter()
            .filter_map(|p| p.health_report())
            .collect();
        let probes: Vec<(String, HealthStatus)> = self
            .inner
            .probes
            .lock()
            .expect("monitor lock poisoned")
            .iter()
            .map(|(name, probe)| (name.clone(), probe()))
            .collect();

        let statuses = providers
            .iter()
            .map(|r| r.status)
            .chain(probes.iter().map(|(_, s)| *s));
        let mut status = SystemStatus::Up;
        for s in statuses {
            match s {
                HealthStatus::Unhealthy => {
                    status = SystemStatus::Down;
                    break;
                }
                HealthStatus::Degraded => status = SystemStatus::Degraded,
                HealthStatus::Healthy => {}
            }
        }

        let snapshot = SystemSnapshot {
            status,
            providers,
            probes,
            checked_at: Utc::now(),
        };
        *self.inner.latest.lock().expect("monitor lock poisoned") = Some(snapshot.clone());
        snapshot
    }

    /// The most recent snapshot, if any poll has happened.
    #[must_use]
    pub fn latest(&self) -> Option<SystemSnapshot> {
        self.inner
            .latest
            .lock()
            .expect("monitor lock poisoned")
            .clone()
    }

    /// Start the background poll loop.
    pub fn start(&self, interval: Duration) {
        let monitor = self.clone();
        let stop = self.inner.stop.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = monitor.snapshot();
                        debug!(
                            target: "skb.health",
                            status = ?snapshot.status,
                            providers = snapshot.providers.len(),
                            "health poll"
                        );
                    }
                    _ = stop.cancelled() => break,
                }
            }
        });
    }

    /// Stop the background poll loop.
    pub fn shutdown(&self) {
        self.inner.stop.cancel();
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor").finish_non_exhaustive()
    }
}
