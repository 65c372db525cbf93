// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-error
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Categorised error taxonomy for provider operations.
//!
//! Every error raised against a remote provider carries an
//! [`ErrorCategory`], the provider name, a message, and optional HTTP
//! status, retry-after hint, cause, and structured context. Use the builder
//! returned by [`ProviderError::new`] to construct errors fluently. The
//! [`enrich`] helper attaches operation name and parameters with sensitive
//! keys redacted; no credential value ever survives into an error string.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family an error belongs to. Category drives retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Token invalid or expired (HTTP 401). Retried once after refresh.
    Authentication,
    /// Forbidden (HTTP 403). Not retryable.
    Authorization,
    /// Transport failure or timeout. Retryable.
    Network,
    /// Remote 5xx. Retryable.
    Server,
    /// Throttled (HTTP 429 or provider-declared codes). Retryable after
    /// the Retry-After hint.
    RateLimit,
    /// Malformed or missing input (HTTP 400/413/422). Not retryable.
    Validation,
    /// Missing resource (HTTP 404). Not retryable.
    NotFound,
    /// Duplicate or concurrent modification (HTTP 409). Not retryable.
    Conflict,
    /// Local rejection because the circuit breaker is open.
    CircuitOpen,
    /// Cooperative cancellation.
    Cancelled,
    /// Anything unclassified.
    Unknown,
}

impl ErrorCategory {
    /// Whether the retry engine may retry errors of this category.
    ///
    /// AUTHENTICATION is special-cased by the HTTP client (one replay after
    /// refresh) and is *not* retryable here.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::RateLimit)
    }

    /// Classify an HTTP status code into a category.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Authentication,
            403 => Self::Authorization,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimit,
            400 | 413 | 422 => Self::Validation,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }

    /// Stable string form, e.g. `"rate_limit"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Network => "network",
            Self::Server => "server",
            Self::RateLimit => "rate_limit",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::CircuitOpen => "circuit_open",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Redaction
// ---------------------------------------------------------------------------

/// Keys whose values must never appear in error strings or context.
pub const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "apiToken",
    "api_token",
    "clientSecret",
    "client_secret",
    "Authorization",
    "authorization",
    "token",
    "access_token",
    "refresh_token",
];

/// Replacement for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Returns `true` if `key` names credential material.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Redact sensitive keys in a parameter map, recursing into nested objects.
#[must_use]
pub fn redact_params(params: &serde_json::Value) -> serde_json::Value {
    match params {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_sensitive_key(k) {
                    out.insert(k.clone(), serde_json::Value::String(REDACTED.into()));
                } else {
                    out.insert(k.clone(), redact_params(v));
                }
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact_params).collect())
        }
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// An error raised by or about a provider operation.
///
/// # Builder usage
///
/// ```
/// use skb_error::{ErrorCategory, ProviderError};
///
/// let err = ProviderError::new("zephyr", ErrorCategory::Server, "upstream 502")
///     .with_status(502)
///     .with_context("endpoint", "/testcases");
/// assert!(err.is_retryable());
/// ```
pub struct ProviderError {
    /// Provider the error belongs to.
    pub provider: String,
    /// Taxonomy category.
    pub category: ErrorCategory,
    /// Human-readable description.
    pub message: String,
    /// HTTP status, when the error came from a response.
    pub status: Option<u16>,
    /// Server-supplied backoff hint (from `Retry-After`).
    pub retry_after: Option<Duration>,
    /// Per-field validation errors (VALIDATION only).
    pub field_errors: BTreeMap<String, String>,
    /// Structured diagnostic context. Sensitive keys are redacted on insert.
    pub context: BTreeMap<String, serde_json::Value>,
    /// Underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Set when a cause advertises that it is worth retrying even though
    /// the category alone would say otherwise.
    pub retryable_hint: bool,
}

impl ProviderError {
    /// Create a new error for the given provider and category.
    pub fn new(
        provider: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            category,
            message: message.into(),
            status: None,
            retry_after: None,
            field_errors: BTreeMap::new(),
            context: BTreeMap::new(),
            source: None,
            retryable_hint: false,
        }
    }

    /// Shorthand for a local cancellation error.
    pub fn cancelled(provider: impl Into<String>) -> Self {
        Self::new(provider, ErrorCategory::Cancelled, "operation cancelled")
    }

    /// Shorthand for a circuit-open rejection.
    pub fn circuit_open(provider: impl Into<String>, retry_in: Duration) -> Self {
        Self::new(
            provider,
            ErrorCategory::CircuitOpen,
            "circuit breaker is open",
        )
        .with_retry_after(retry_in)
    }

    /// Attach the originating HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a server-supplied backoff hint.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Attach a per-field validation error.
    #[must_use]
    pub fn with_field_error(mut self, field: impl Into<String>, msg: impl Into<String>) -> Self {
        self.field_errors.insert(field.into(), msg.into());
        self
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// Values under sensitive keys are replaced with [`REDACTED`]; nested
    /// objects are redacted recursively. Serialisation failures skip the
    /// entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let key = key.into();
        if let Ok(v) = serde_json::to_value(value) {
            let v = if is_sensitive_key(&key) {
                serde_json::Value::String(REDACTED.into())
            } else {
                redact_params(&v)
            };
            self.context.insert(key, v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Mark the error as retryable regardless of category.
    #[must_use]
    pub fn with_retryable_hint(mut self) -> Self {
        self.retryable_hint = true;
        self
    }

    /// Whether the retry engine may retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable_hint || self.category.is_retryable()
    }
}

impl fmt::Debug for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ProviderError");
        d.field("provider", &self.provider);
        d.field("category", &self.category);
        d.field("message", &self.message);
        if let Some(status) = self.status {
            d.field("status", &status);
        }
        if let Some(ra) = self.retry_after {
            d.field("retry_after", &ra);
        }
        if !self.field_errors.is_empty() {
            d.field("field_errors", &self.field_errors);
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        d.finish()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.category, self.provider, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Attach operation name and redacted parameters to an error.
///
/// Adapters call this at their boundary so every propagated error names the
/// operation it came from; categories are preserved.
#[must_use]
pub fn enrich(
    mut err: ProviderError,
    operation: &str,
    params: &serde_json::Value,
) -> ProviderError {
    err.context.insert(
        "operation".to_string(),
        serde_json::Value::String(operation.to_string()),
    );
    err.context.insert("params".to_string(), redact_params(params));
    err
}

// ---------------------------------------------------------------------------
// DTO
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`ProviderError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderErrorDto {
    /// Provider name.
    pub provider: String,
    /// Taxonomy category.
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// HTTP status, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Retry-after hint in milliseconds, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Per-field validation errors.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, String>,
    /// Structured context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
    /// String form of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&ProviderError> for ProviderErrorDto {
    fn from(err: &ProviderError) -> Self {
        Self {
            provider: err.provider.clone(),
            category: err.category,
            message: err.message.clone(),
            status: err.status,
            retry_after_ms: err.retry_after.map(|d| d.as_millis() as u64),
            field_errors: err.field_errors.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}
