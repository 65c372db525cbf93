// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-resilience
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The resilience facade: one call wrapper per provider composing cache,
//! bulkhead, rate limiter, circuit breaker, and retry into a single linear
//! pipeline.
//!
//! For `execute(key, producer, fallback)` the pipeline is:
//!
//! 1. cache lookup when a key is given (fresh hit returns immediately;
//!    stale hit returns and revalidates in the background unless the
//!    breaker is open);
//! 2. enter the bulkhead;
//! 3. acquire a rate-limit token;
//! 4. ask the circuit breaker to admit the call;
//! 5. run the producer under the retry policy, with the per-attempt
//!    timeout;
//! 6. on success: store in cache, record health, charge the breaker one
//!    success; on exhausted failure: charge the breaker one failure and
//!    either invoke the fallback or propagate.
//!
//! Cancellation releases every held resource and charges nothing.

/// Health counters and status derivation.
pub mod health;

pub use health::{HealthCounters, HealthStatus};

use serde::{Deserialize, Serialize};
use skb_cache::{CacheConfig, CacheLookup, ResponseCache};
use skb_cancel::CancelSignal;
use skb_error::{ErrorCategory, ProviderError};
use skb_ratelimit::{Bulkhead, BulkheadConfig, BulkheadError, RateLimitError, RateLimiter, RateLimiterConfig};
use skb_retry::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Everything the facade needs for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FacadeConfig {
    /// Rate-limiting settings.
    pub rate_limiting: RateLimiterConfig,
    /// Bulkhead settings.
    pub bulkhead: BulkheadConfig,
    /// Circuit-breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry settings.
    pub retry: RetryPolicy,
    /// Response-cache settings.
    pub cache: CacheConfig,
    /// Per-attempt timeout in milliseconds; `None` disables it.
    pub timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
    cancellations: AtomicU64,
}

/// Point-in-time facade counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacadeMetrics {
    /// Calls entering the facade.
    pub calls: u64,
    /// Calls that returned a value (cache hits included).
    pub successes: u64,
    /// Calls that propagated an error.
    pub failures: u64,
    /// Calls answered from cache without invoking the producer.
    pub cache_hits: u64,
    /// Failures converted to values by a fallback.
    pub fallbacks: u64,
    /// Calls that ended in cancellation.
    pub cancellations: u64,
}

/// Per-provider health snapshot exposed by the facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Provider name.
    pub provider: String,
    /// Derived status.
    pub status: HealthStatus,
    /// Success ratio over the recent window, if any calls were made.
    pub success_rate: Option<f64>,
    /// Breaker state at snapshot time.
    pub breaker: CircuitState,
    /// Requests currently holding a rate-limit permit.
    pub active_requests: u32,
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

struct FacadeInner<V> {
    provider: String,
    limiter: RateLimiter,
    bulkhead: Bulkhead,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    cache: ResponseCache<V>,
    health: HealthCounters,
    counters: Counters,
    timeout: Option<Duration>,
}

/// The per-provider resilience facade. Cloning yields another handle to the
/// same underlying components.
pub struct ResilienceFacade<V> {
    inner: Arc<FacadeInner<V>>,
}

impl<V> Clone for ResilienceFacade<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> ResilienceFacade<V> {
    /// Build a facade for the named provider.
    #[must_use]
    pub fn new(provider: impl Into<String>, config: FacadeConfig) -> Self {
        let provider = provider.into();
        Self {
            inner: Arc::new(FacadeInner {
                limiter: RateLimiter::new(provider.clone(), config.rate_limiting),
                bulkhead: Bulkhead::new(provider.clone(), config.bulkhead),
                breaker: CircuitBreaker::new(provider.clone(), config.circuit_breaker),
                retry: config.retry,
                cache: ResponseCache::new(provider.clone(), config.cache),
                health: HealthCounters::new(Duration::from_secs(60), 256),
                counters: Counters::default(),
                timeout: config.timeout_ms.map(Duration::from_millis),
                provider,
            }),
        }
    }

    /// Run `producer` through the full pipeline.
    ///
    /// `key` enables the response cache for this call (GETs); `None` skips
    /// caching entirely.
    pub async fn execute<F, Fut>(
        &self,
        key: Option<&str>,
        cancel: &CancelSignal,
        producer: F,
    ) -> Result<V, ProviderError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ProviderError>> + Send + 'static,
    {
        self.execute_inner(key, cancel, producer, None::<fn(&ProviderError) -> V>)
            .await
    }

    /// Like [`execute`](Self::execute), but a non-retryable or exhausted
    /// failure invokes `fallback` with the error and returns its value.
    pub async fn execute_with_fallback<F, Fut, G>(
        &self,
        key: Option<&str>,
        cancel: &CancelSignal,
        producer: F,
        fallback: G,
    ) -> Result<V, ProviderError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ProviderError>> + Send + 'static,
        G: FnOnce(&ProviderError) -> V,
    {
        self.execute_inner(key, cancel, producer, Some(fallback)).await
    }

    async fn execute_inner<F, Fut, G>(
        &self,
        key: Option<&str>,
        cancel: &CancelSignal,
        producer: F,
        fallback: Option<G>,
    ) -> Result<V, ProviderError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ProviderError>> + Send + 'static,
        G: FnOnce(&ProviderError) -> V,
    {
        let c = &self.inner.counters;
        c.calls.fetch_add(1, Ordering::Relaxed);

        let result = match key {
            Some(k) => {
                let this = self.clone();
                let producer = Arc::new(producer);
                let cancel2 = cancel.clone();
                let produced = Arc::new(AtomicU64::new(0));
                let produced2 = Arc::clone(&produced);
                let allow_revalidate = self.inner.breaker.state() != CircuitState::Open;
                let outcome = self
                    .inner
                    .cache
                    .execute(
                        k,
                        move || {
                            let this = this.clone();
                            let producer = Arc::clone(&producer);
                            let cancel = cancel2.clone();
                            produced2.fetch_add(1, Ordering::Relaxed);
                            async move {
                                this.run_protected(move || (*producer)(), &cancel).await
                            }
                        },
                        allow_revalidate,
                    )
                    .await;
                if outcome.is_ok() && produced.load(Ordering::Relaxed) == 0 {
                    c.cache_hits.fetch_add(1, Ordering::Relaxed);
                }
                outcome
            }
            None => self.run_protected(producer, cancel).await,
        };

        match result {
            Ok(value) => {
                c.successes.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) if err.category == ErrorCategory::Cancelled => {
                c.cancellations.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
            Err(err) => {
                c.failures.fetch_add(1, Ordering::Relaxed);
                match fallback {
                    Some(f) => {
                        warn!(
                            target: "skb.resilience",
                            provider = %self.inner.provider,
                            error = %err,
                            "falling back after exhausted failure"
                        );
                        c.fallbacks.fetch_add(1, Ordering::Relaxed);
                        Ok(f(&err))
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// The protected section: bulkhead → rate limit → breaker → retry.
    async fn run_protected<F, Fut>(
        &self,
        producer: F,
        cancel: &CancelSignal,
    ) -> Result<V, ProviderError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<V, ProviderError>> + Send,
    {
        let inner = &self.inner;
        let provider = inner.provider.as_str();

        let _slot = inner.bulkhead.acquire(cancel).await.map_err(|e| match e {
            BulkheadError::Cancelled => ProviderError::cancelled(provider),
            other => ProviderError::new(provider, ErrorCategory::Unknown, other.to_string())
                .with_context("stage", "bulkhead"),
        })?;

        let _token = inner.limiter.acquire(cancel).await.map_err(|e| match e {
            RateLimitError::Cancelled => ProviderError::cancelled(provider),
            RateLimitError::QueueFull { depth } => {
                ProviderError::new(provider, ErrorCategory::RateLimit, e.to_string())
                    .with_context("queue_depth", depth)
            }
        })?;

        inner
            .breaker
            .try_admit()
            .map_err(|e| ProviderError::circuit_open(provider, e.retry_in))?;

        let timeout = inner.timeout;
        let result = inner
            .retry
            .run(provider, cancel, |attempt| {
                let fut = producer();
                async move {
                    if attempt > 1 {
                        debug!(target: "skb.resilience", attempt, "retry attempt");
                    }
                    match timeout {
                        Some(limit) => match tokio::time::timeout(limit, fut).await {
                            Ok(out) => out,
                            Err(_) => Err(ProviderError::new(
                                provider,
                                ErrorCategory::Network,
                                format!("call timed out after {} ms", limit.as_millis()),
                            )),
                        },
                        None => fut.await,
                    }
                }
            })
            .await;

        // One exhausted retry loop charges the breaker exactly once;
        // cancellation charges nothing.
        match &result {
            Ok(_) => {
                inner.breaker.record_success();
                inner.health.record(true);
            }
            Err(err) if err.category == ErrorCategory::Cancelled => {}
            Err(err) if err.category == ErrorCategory::CircuitOpen => {}
            Err(_) => {
                inner.breaker.record_failure();
                inner.health.record(false);
            }
        }
        result
    }

    /// Derived health for this provider.
    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        self.inner
            .health
            .status(self.inner.breaker.state() == CircuitState::Open)
    }

    /// Full health snapshot.
    #[must_use]
    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            provider: self.inner.provider.clone(),
            status: self.health_status(),
            success_rate: self.inner.health.success_rate(),
            breaker: self.inner.breaker.state(),
            active_requests: self.inner.limiter.active_count(),
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn metrics(&self) -> FacadeMetrics {
        let c = &self.inner.counters;
        FacadeMetrics {
            calls: c.calls.load(Ordering::Relaxed),
            successes: c.successes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            fallbacks: c.fallbacks.load(Ordering::Relaxed),
            cancellations: c.cancellations.load(Ordering::Relaxed),
        }
    }

    /// Reset breaker, cache, and health window (counters are cumulative and
    /// keep going).
    pub fn reset(&self) {
        self.inner.breaker.reset();
        self.inner.cache.clear();
        self.inner.health.clear();
    }

    /// Requests currently holding a rate-limit permit.
    #[must_use]
    pub fn active_requests(&self) -> u32 {
        self.inner.limiter.active_count()
    }

    /// Provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.inner.provider
    }

    /// Breaker state, for callers that gate work on it.
    #[must_use]
    pub fn breaker_state(&self) -> CircuitState {
        self.inner.breaker.state()
    }
}

impl<V> std::fmt::Debug for ResilienceFacade<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceFacade")
            .field("provider", &self.inner.provider)
            .finish()
    }
}
