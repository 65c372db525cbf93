// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-provider configuration surface.
//!
//! Every adapter accepts one [`ProviderConfig`]; vendor-specific keys
//! (project ids, workspace keys, domains) travel in the
//! [`ProviderConfig::extra`] bag, and per-field mapping overrides in
//! [`ProviderConfig::test_case_field_mappings`].

use serde::{Deserialize, Serialize};
use skb_auth::{AuthHandler, Credentials};
use skb_cache::CacheConfig;
use skb_error::{ErrorCategory, ProviderError};
use skb_http::{ClientConfig, DEFAULT_RETRY_AFTER_HEADER, ResilientClient};
use skb_ratelimit::{BulkheadConfig, RateLimiterConfig};
use skb_resilience::FacadeConfig;
use skb_retry::{CircuitBreakerConfig, RetryPolicy};
use std::collections::BTreeMap;

/// Authentication section: the chosen credential method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationConfig {
    /// Credentials for this provider.
    pub credentials: Credentials,
}

/// Rate-limiting section: limiter settings plus how the vendor reports
/// throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Token-bucket and concurrency settings.
    #[serde(flatten)]
    pub limiter: RateLimiterConfig,
    /// Header carrying the vendor's backoff hint.
    pub retry_after_header_name: String,
    /// Status codes (besides 429) the vendor uses for throttling.
    pub rate_limit_status_codes: Vec<u16>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limiter: RateLimiterConfig::default(),
            retry_after_header_name: DEFAULT_RETRY_AFTER_HEADER.to_string(),
            rate_limit_status_codes: Vec::new(),
        }
    }
}

/// Resilience section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResilienceOptions {
    /// Retry settings.
    pub retry_options: RetryPolicy,
    /// Circuit-breaker settings.
    pub circuit_breaker_options: CircuitBreakerConfig,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Response-cache settings.
    pub cache: CacheConfig,
    /// Bulkhead settings.
    pub bulkhead: BulkheadConfig,
}

/// Full configuration for one provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the vendor API.
    pub base_url: String,
    /// Service name for telemetry.
    #[serde(default)]
    pub service_name: Option<String>,
    /// Provider name for telemetry; adapters fall back to their own id.
    #[serde(default)]
    pub provider_name: Option<String>,
    /// Authentication settings.
    pub authentication: AuthenticationConfig,
    /// Rate-limiting settings.
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    /// Resilience settings.
    #[serde(default)]
    pub resilience: ResilienceOptions,
    /// Headers added to every request.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    /// Canonical custom-field key → vendor field name overrides.
    #[serde(default)]
    pub test_case_field_mappings: BTreeMap<String, String>,
    /// Vendor-specific keys: project/workspace/domain ids, PATs, etc.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProviderConfig {
    /// Minimal config: base URL plus credentials, defaults for the rest.
    #[must_use]
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into(),
            service_name: None,
            provider_name: None,
            authentication: AuthenticationConfig { credentials },
            rate_limiting: RateLimitingConfig::default(),
            resilience: ResilienceOptions::default(),
            default_headers: BTreeMap::new(),
            test_case_field_mappings: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Structural validation ahead of any network use.
    pub fn validate(&self, provider: &str) -> Result<(), ProviderError> {
        if self.base_url.trim().is_empty() {
            return Err(ProviderError::new(
                provider,
                ErrorCategory::Validation,
                "base_url must not be empty",
            )
            .with_field_error("base_url", "required"));
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            ProviderError::new(
                provider,
                ErrorCategory::Validation,
                format!("base_url is not a valid URL: {e}"),
            )
            .with_field_error("base_url", "invalid")
        })?;
        if self.resilience.retry_options.max_attempts == 0 {
            return Err(ProviderError::new(
                provider,
                ErrorCategory::Validation,
                "retry_options.max_attempts must be at least 1",
            )
            .with_field_error("resilience.retry_options.max_attempts", "must be ≥ 1"));
        }
        Ok(())
    }

    /// A string value from the vendor-specific bag.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    /// Effective vendor field for a canonical custom-field key, honouring
    /// configured overrides.
    #[must_use]
    pub fn vendor_field<'a>(&'a self, canonical_key: &'a str) -> &'a str {
        self.test_case_field_mappings
            .get(canonical_key)
            .map(String::as_str)
            .unwrap_or(canonical_key)
    }

    /// Derive the HTTP-client config for this provider.
    #[must_use]
    pub fn client_config(&self, provider: &str) -> ClientConfig {
        ClientConfig {
            provider: self
                .provider_name
                .clone()
                .unwrap_or_else(|| provider.to_string()),
            base_url: self.base_url.clone(),
            default_headers: self.default_headers.clone(),
            rate_limit_status_codes: self.rate_limiting.rate_limit_status_codes.clone(),
            retry_after_header: self.rate_limiting.retry_after_header_name.clone(),
            facade: FacadeConfig {
                rate_limiting: self.rate_limiting.limiter.clone(),
                bulkhead: self.resilience.bulkhead.clone(),
                circuit_breaker: self.resilience.circuit_breaker_options.clone(),
                retry: self.resilience.retry_options.clone(),
                cache: self.resilience.cache.clone(),
                timeout_ms: self.resilience.timeout_ms,
            },
        }
    }

    /// Register credentials and build the resilient client.
    pub async fn build_client(
        &self,
        provider: &str,
        auth: &AuthHandler,
    ) -> Result<ResilientClient, ProviderError> {
        self.validate(provider)?;
        let client_config = self.client_config(provider);
        auth.register(
            client_config.provider.clone(),
            self.authentication.credentials.clone(),
        )
        .await;
        ResilientClient::new(client_config, auth.clone())
    }
}
