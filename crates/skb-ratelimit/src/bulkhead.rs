// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bulkhead concurrency partitions.
//!
//! A bulkhead isolates one logical pool of calls (a provider, or a group of
//! endpoints) behind a fixed concurrency limit and a bounded wait queue, so
//! a slow dependency cannot absorb every task in the process. Overflow is
//! rejected immediately; an optional execution timeout bounds each admitted
//! call.

use serde::{Deserialize, Serialize};
use skb_cancel::CancelSignal;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Settings for one [`Bulkhead`] pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Maximum calls executing at once.
    pub max_concurrent: usize,
    /// Maximum callers allowed to wait for a slot.
    pub max_queue_depth: usize,
    /// Per-call execution timeout in milliseconds; `None` disables it.
    pub execution_timeout_ms: Option<u64>,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_queue_depth: 10,
            execution_timeout_ms: None,
        }
    }
}

/// Failure raised by a [`Bulkhead`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BulkheadError {
    /// Concurrency and queue are both saturated.
    #[error("bulkhead rejected call: pool {pool} is saturated")]
    Rejected {
        /// Pool name.
        pool: String,
    },
    /// The admitted call exceeded the execution timeout.
    #[error("bulkhead call timed out after {timeout_ms} ms in pool {pool}")]
    Timeout {
        /// Pool name.
        pool: String,
        /// Configured timeout.
        timeout_ms: u64,
    },
    /// The caller's cancellation signal tripped while waiting for a slot.
    #[error("cancelled while waiting for a bulkhead slot")]
    Cancelled,
}

struct BulkheadShared {
    name: String,
    config: BulkheadConfig,
    slots: Arc<Semaphore>,
    queued: AtomicUsize,
    active: AtomicUsize,
}

/// A named concurrency partition. Cloning yields another handle to the same
/// pool.
#[derive(Clone)]
pub struct Bulkhead {
    shared: Arc<BulkheadShared>,
}

impl Bulkhead {
    /// Build a pool with the given name and settings.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        Self {
            shared: Arc::new(BulkheadShared {
                name: name.into(),
                slots: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                config,
                queued: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Acquire an execution slot, waiting in the bounded queue if necessary.
    pub async fn acquire(&self, cancel: &CancelSignal) -> Result<BulkheadPermit, BulkheadError> {
        if cancel.is_cancelled() {
            return Err(BulkheadError::Cancelled);
        }
        let s = &self.shared;

        if let Ok(permit) = Arc::clone(&s.slots).try_acquire_owned() {
            return Ok(self.permit(permit));
        }

        // All slots busy: join the bounded queue. The guard decrements the
        // queued count even if this future is dropped mid-wait.
        let queued = s.queued.fetch_add(1, Ordering::SeqCst);
        let _queue_guard = QueuedGuard(Arc::clone(&self.shared));
        if queued >= s.config.max_queue_depth {
            trace!(target: "skb.bulkhead", pool = %s.name, "queue full, rejecting");
            return Err(BulkheadError::Rejected {
                pool: s.name.clone(),
            });
        }

        let acquired = tokio::select! {
            permit = Arc::clone(&s.slots).acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => None,
        };
        match acquired {
            Some(permit) => Ok(self.permit(permit)),
            None => Err(BulkheadError::Cancelled),
        }
    }

    /// Run `operation` inside the pool, applying the execution timeout.
    ///
    /// The timeout covers `operation` only, not the time spent queued.
    pub async fn execute<F, T>(
        &self,
        cancel: &CancelSignal,
        operation: F,
    ) -> Result<T, BulkheadError>
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire(cancel).await?;
        match self.shared.config.execution_timeout_ms {
            Some(timeout_ms) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), operation).await {
                    Ok(value) => Ok(value),
                    Err(_) => Err(BulkheadError::Timeout {
                        pool: self.shared.name.clone(),
                        timeout_ms,
                    }),
                }
            }
            None => Ok(operation.await),
        }
    }

    fn permit(&self, inner: OwnedSemaphorePermit) -> BulkheadPermit {
        self.shared.active.fetch_add(1, Ordering::SeqCst);
        BulkheadPermit {
            shared: Arc::clone(&self.shared),
            _inner: inner,
        }
    }

    /// Calls currently executing in this pool.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Callers currently waiting for a slot.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.shared.name)
            .field("active", &self.active_count())
            .field("queued", &self.queue_depth())
            .finish()
    }
}

/// Decrements the queued count when a waiter leaves, however it leaves.
struct QueuedGuard(Arc<BulkheadShared>);

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        self.0.queued.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Slot permit; dropping it frees the slot.
pub struct BulkheadPermit {
    shared: Arc<BulkheadShared>,
    _inner: OwnedSemaphorePermit,
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        self.shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn pool(concurrent: usize, queue: usize, timeout_ms: Option<u64>) -> Bulkhead {
        Bulkhead::new(
            "pool",
            BulkheadConfig {
                max_concurrent: concurrent,
                max_queue_depth: queue,
                execution_timeout_ms: timeout_ms,
            },
        )
    }

    #[tokio::test]
    async fn acquires_up_to_concurrency_limit() {
        let b = pool(2, 0, None);
        let cancel = CancelSignal::new();
        let p1 = b.acquire(&cancel).await.expect("slot 1");
        let p2 = b.acquire(&cancel).await.expect("slot 2");
        assert_eq!(b.active_count(), 2);
        drop((p1, p2));
        assert_eq!(b.active_count(), 0);
    }

    #[tokio::test]
    async fn overflow_beyond_queue_is_rejected() {
        let b = pool(1, 0, None);
        let cancel = CancelSignal::new();
        let _held = b.acquire(&cancel).await.expect("slot");
        let res = b.acquire(&cancel).await;
        assert!(matches!(res, Err(BulkheadError::Rejected { .. })));
    }

    #[tokio::test]
    async fn queued_caller_gets_slot_when_freed() {
        let b = pool(1, 1, None);
        let cancel = CancelSignal::new();
        let held = b.acquire(&cancel).await.expect("slot");
        let b2 = b.clone();
        let c2 = cancel.clone();
        let waiter = tokio::spawn(async move { b2.acquire(&c2).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(b.queue_depth(), 1);
        drop(held);
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter resolves")
            .expect("join");
        assert!(got.is_ok());
    }

    #[tokio::test]
    async fn execution_timeout_fires() {
        let b = pool(1, 0, Some(50));
        let cancel = CancelSignal::new();
        let res: Result<(), _> = b
            .execute(&cancel, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            })
            .await;
        assert!(matches!(res, Err(BulkheadError::Timeout { timeout_ms: 50, .. })));
        // Slot is freed after the timeout.
        assert_eq!(b.active_count(), 0);
    }

    #[tokio::test]
    async fn execute_returns_operation_value() {
        let b = pool(1, 0, Some(1_000));
        let cancel = CancelSignal::new();
        let out = b.execute(&cancel, async { 40 + 2 }).await.expect("runs");
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn cancellation_while_queued_frees_the_queue() {
        let b = pool(1, 2, None);
        let cancel = CancelSignal::new();
        let _held = b.acquire(&cancel).await.expect("slot");
        let waiter_cancel = CancelSignal::new();
        let b2 = b.clone();
        let wc = waiter_cancel.clone();
        let waiter = tokio::spawn(async move { b2.acquire(&wc).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter_cancel.cancel();
        let res = waiter.await.expect("join");
        assert!(matches!(res, Err(BulkheadError::Cancelled)));
        assert_eq!(b.queue_depth(), 0);
    }

    #[tokio::test]
    async fn already_cancelled_fails_fast() {
        let b = pool(1, 1, None);
        let cancel = CancelSignal::new();
        cancel.cancel();
        assert!(matches!(
            b.acquire(&cancel).await,
            Err(BulkheadError::Cancelled)
        ));
    }
}
