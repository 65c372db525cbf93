// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-cancel
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Cooperative cancellation for provider operations.
//!
//! Every public operation in the bridge accepts a [`CancelSignal`]. On
//! cancellation, pending retries abort before their next sleep, rate-limit
//! tokens and bulkhead slots are released, and the circuit breaker is not
//! charged. Transport-level abort is a translation detail inside the HTTP
//! client; this crate only carries the signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A cloneable cancellation signal.
///
/// All clones observe the same state; cancelling any clone makes every
/// holder see `is_cancelled() == true` and wakes every pending
/// [`cancelled`](CancelSignal::cancelled) future.
#[derive(Clone, Default)]
pub struct CancelSignal {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// A fresh, un-cancelled signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        self.shared.flag.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// Whether the signal has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is tripped; immediately if it already was.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.shared.notify.notified();
            // Re-check after arming the notification so a cancel between the
            // flag load and `notified()` cannot be missed.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_signal_is_not_cancelled() {
        assert!(!CancelSignal::new().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let a = CancelSignal::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let s = CancelSignal::new();
        s.cancel();
        s.cancel();
        assert!(s.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_immediately_when_already_tripped() {
        let s = CancelSignal::new();
        s.cancel();
        tokio::time::timeout(Duration::from_millis(50), s.cancelled())
            .await
            .expect("should resolve without waiting");
    }

    #[tokio::test]
    async fn cancelled_future_wakes_on_cancel() {
        let s = CancelSignal::new();
        let waiter = s.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });
        tokio::task::yield_now().await;
        s.cancel();
        let woke = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .expect("task should not panic");
        assert!(woke);
    }

    #[tokio::test]
    async fn select_against_cancelled_takes_the_signal_branch() {
        let s = CancelSignal::new();
        s.cancel();
        let branch = tokio::select! {
            _ = s.cancelled() => "cancel",
            _ = tokio::time::sleep(Duration::from_secs(5)) => "sleep",
        };
        assert_eq!(branch, "cancel");
    }
}
