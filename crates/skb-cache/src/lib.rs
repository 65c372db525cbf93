// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-cache
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Key-addressed response cache: TTL-bounded, size-bounded (LRU), with
//! optional stale-while-revalidate.
//!
//! Each provider owns its own [`ResponseCache`]; entries are never shared
//! across providers. When stale-while-revalidate is on, an expired entry
//! that is still inside the stale window is served immediately while a
//! background task refreshes it; if the refresh fails, the stale value
//! keeps serving until the stale window closes.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{trace, warn};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Settings for one provider's response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time entries stay fresh, in milliseconds.
    pub ttl_ms: u64,
    /// Maximum entries before LRU eviction.
    pub max_entries: usize,
    /// Serve expired entries while refreshing in the background.
    pub stale_while_revalidate: bool,
    /// How long past expiry an entry may still be served stale, in
    /// milliseconds.
    pub stale_window_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            max_entries: 512,
            stale_while_revalidate: false,
            stale_window_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseCache
// ---------------------------------------------------------------------------

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    /// Entry exists and is within its TTL.
    Fresh(V),
    /// Entry is past its TTL but inside the stale window (only reported
    /// when stale-while-revalidate is enabled).
    Stale(V),
    /// No usable entry.
    Miss,
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

struct CacheShared<V> {
    name: String,
    config: CacheConfig,
    entries: Mutex<LruCache<String, Entry<V>>>,
    refreshing: Mutex<HashSet<String>>,
}

/// Per-provider response cache. Cloning yields another handle to the same
/// cache.
pub struct ResponseCache<V> {
    shared: Arc<CacheShared<V>>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Clone + Send + 'static> ResponseCache<V> {
    /// Build a cache for the named provider.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            shared: Arc::new(CacheShared {
                name: name.into(),
                config,
                entries: Mutex::new(LruCache::new(capacity)),
                refreshing: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Look up `key`, promoting it in LRU order and lazily evicting entries
    /// past their stale window.
    #[must_use]
    pub fn lookup(&self, key: &str) -> CacheLookup<V> {
        let s = &self.shared;
        let ttl = Duration::from_millis(s.config.ttl_ms);
        let stale_window = Duration::from_millis(s.config.stale_window_ms);
        let mut entries = s.entries.lock().expect("cache lock poisoned");
        let Some(entry) = entries.get(key) else {
            return CacheLookup::Miss;
        };
        let age = entry.stored_at.elapsed();
        if age < ttl {
            return CacheLookup::Fresh(entry.value.clone());
        }
        if s.config.stale_while_revalidate && age < ttl + stale_window {
            return CacheLookup::Stale(entry.value.clone());
        }
        entries.pop(key);
        CacheLookup::Miss
    }

    /// Insert or replace the entry for `key`.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let mut entries = self.shared.entries.lock().expect("cache lock poisoned");
        entries.push(
            key.into(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.shared
            .entries
            .lock()
            .expect("cache lock poisoned")
            .pop(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.shared
            .entries
            .lock()
            .expect("cache lock poisoned")
            .clear();
    }

    /// Number of entries currently held (fresh or stale).
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .entries
            .lock()
            .expect("cache lock poisoned")
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serve `key` from cache when possible, otherwise run `producer` and
    /// store its result.
    ///
    /// On a stale hit the value is returned immediately and `producer` runs
    /// in the background, but only when `allow_revalidate` says so (the
    /// facade gates this on the circuit breaker not being open). Only one
    /// background refresh per key runs at a time. A failed refresh leaves
    /// the stale entry in place.
    pub async fn execute<F, Fut, E>(
        &self,
        key: &str,
        producer: F,
        allow_revalidate: bool,
    ) -> Result<V, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        match self.lookup(key) {
            CacheLookup::Fresh(value) => {
                trace!(target: "skb.cache", provider = %self.shared.name, key, "fresh hit");
                Ok(value)
            }
            CacheLookup::Stale(value) => {
                if allow_revalidate {
                    self.spawn_revalidate(key.to_string(), producer);
                }
                trace!(target: "skb.cache", provider = %self.shared.name, key, "stale hit");
                Ok(value)
            }
            CacheLookup::Miss => {
                let value = producer().await?;
                self.insert(key, value.clone());
                Ok(value)
            }
        }
    }

    fn spawn_revalidate<F, Fut, E>(&self, key: String, producer: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        {
            let mut refreshing = self.shared.refreshing.lock().expect("cache lock poisoned");
            if !refreshing.insert(key.clone()) {
                // A refresh for this key is already in flight.
                return;
            }
        }
        let cache = self.clone();
        tokio::spawn(async move {
            match producer().await {
                Ok(value) => cache.insert(key.clone(), value),
                Err(err) => {
                    // Keep serving the stale entry until its window closes.
                    warn!(
                        target: "skb.cache",
                        provider = %cache.shared.name,
                        key,
                        error = %err,
                        "background revalidation failed"
                    );
                }
            }
            cache
                .shared
                .refreshing
                .lock()
                .expect("cache lock poisoned")
                .remove(&key);
        });
    }
}

impl<V> std::fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .shared
            .entries
            .lock()
            .map(|e| e.len())
            .unwrap_or_default();
        f.debug_struct("ResponseCache")
            .field("name", &self.shared.name)
            .field("entries", &len)
            .finish()
    }
}
