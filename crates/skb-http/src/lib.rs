// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-http
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The resilient HTTP client: one instance per provider, wrapping
//! `reqwest` so that every outbound call
//!
//! - carries the provider's auth header (with a single replay after a 401
//!   once the auth handler has refreshed the token),
//! - is classified into the shared error taxonomy,
//! - and runs through the resilience facade under a cache key derived from
//!   method + URL + sorted query (GETs only).
//!
//! Cancellation drops the in-flight transport future, which aborts the
//! connection.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skb_auth::AuthHandler;
use skb_cancel::CancelSignal;
use skb_error::{ErrorCategory, ProviderError};
use skb_resilience::{FacadeConfig, FacadeMetrics, HealthReport, HealthStatus, ResilienceFacade};
use skb_retry::parse_retry_after;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Header consulted for rate-limit backoff hints unless the provider
/// declares another.
pub const DEFAULT_RETRY_AFTER_HEADER: &str = "Retry-After";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Settings for one provider's HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Provider name, used in errors and telemetry.
    pub provider: String,
    /// Base URL every request path is joined to.
    pub base_url: String,
    /// Headers added to every request.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    /// Status codes treated as rate limiting in addition to 429.
    #[serde(default)]
    pub rate_limit_status_codes: Vec<u16>,
    /// Header carrying the provider's backoff hint.
    #[serde(default = "default_retry_after_header")]
    pub retry_after_header: String,
    /// Resilience settings for the facade.
    #[serde(default)]
    pub facade: FacadeConfig,
}

fn default_retry_after_header() -> String {
    DEFAULT_RETRY_AFTER_HEADER.to_string()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct ClientCore {
    provider: String,
    http: reqwest::Client,
    auth: AuthHandler,
    default_headers: BTreeMap<String, String>,
    rate_limit_status_codes: Vec<u16>,
    retry_after_header: String,
}

/// Per-provider HTTP client. Cloning yields another handle to the same
/// client, facade, and auth state.
#[derive(Clone)]
pub struct ResilientClient {
    core: Arc<ClientCore>,
    base: Url,
    facade: ResilienceFacade<Value>,
}

impl ResilientClient {
    /// Build a client from its config and a (shared) auth handler.
    pub fn new(config: ClientConfig, auth: AuthHandler) -> Result<Self, ProviderError> {
        let mut base = Url::parse(&config.base_url).map_err(|e| {
            ProviderError::new(
                &config.provider,
                ErrorCategory::Validation,
                format!("invalid base URL: {e}"),
            )
        })?;
        // A trailing slash keeps Url::join from eating the last path segment.
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        let facade = ResilienceFacade::new(config.provider.clone(), config.facade);
        Ok(Self {
            core: Arc::new(ClientCore {
                provider: config.provider,
                http: reqwest::Client::new(),
                auth,
                default_headers: config.default_headers,
                rate_limit_status_codes: config.rate_limit_status_codes,
                retry_after_header: config.retry_after_header,
            }),
            base,
            facade,
        })
    }

    /// GET `path`, served from the response cache when fresh.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        cancel: &CancelSignal,
    ) -> Result<Value, ProviderError> {
        let url = self.url_for(path, query)?;
        let key = cache_key("GET", &url);
        self.dispatch(Some(key), reqwest::Method::GET, url, None, cancel)
            .await
    }

    /// GET `path` and return the raw body bytes (attachment downloads).
    /// Never cached.
    pub async fn get_bytes(
        &self,
        path: &str,
        query: &[(&str, String)],
        cancel: &CancelSignal,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = self.url_for(path, query)?;
        let core = Arc::clone(&self.core);
        let cancel2 = cancel.clone();
        let value = self
            .facade
            .execute(None, cancel, move || {
                let core = Arc::clone(&core);
                let url = url.clone();
                let cancel = cancel2.clone();
                async move { core.perform_bytes(url, cancel).await }
            })
            .await?;
        match value {
            Value::String(encoded) => BASE64.decode(encoded.as_bytes()).map_err(|e| {
                ProviderError::new(
                    self.provider(),
                    ErrorCategory::Unknown,
                    "internal byte-transfer encoding broken",
                )
                .with_source(e)
            }),
            _ => Ok(Vec::new()),
        }
    }

    /// POST `body` to `path`.
    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        cancel: &CancelSignal,
    ) -> Result<Value, ProviderError> {
        let url = self.url_for(path, &[])?;
        self.dispatch(None, reqwest::Method::POST, url, Some(body.clone()), cancel)
            .await
    }

    /// PUT `body` to `path`.
    pub async fn put(
        &self,
        path: &str,
        body: &Value,
        cancel: &CancelSignal,
    ) -> Result<Value, ProviderError> {
        let url = self.url_for(path, &[])?;
        self.dispatch(None, reqwest::Method::PUT, url, Some(body.clone()), cancel)
            .await
    }

    /// PATCH `body` to `path`.
    pub async fn patch(
        &self,
        path: &str,
        body: &Value,
        cancel: &CancelSignal,
    ) -> Result<Value, ProviderError> {
        let url = self.url_for(path, &[])?;
        self.dispatch(None, reqwest::Method::PATCH, url, Some(body.clone()), cancel)
            .await
    }

    /// DELETE `path`.
    pub async fn delete(&self, path: &str, cancel: &CancelSignal) -> Result<Value, ProviderError> {
        let url = self.url_for(path, &[])?;
        self.dispatch(None, reqwest::Method::DELETE, url, None, cancel)
            .await
    }

    /// A fresh cancellation handle for callers that want one per call.
    #[must_use]
    pub fn cancel_token(&self) -> CancelSignal {
        CancelSignal::new()
    }

    /// Force authentication now.
    pub async fn authenticate(&self) -> Result<(), ProviderError> {
        self.core.auth.authenticate(&self.core.provider).await
    }

    /// Clear this provider's cached tokens.
    pub async fn logout(&self) {
        self.core.auth.logout(&self.core.provider).await;
    }

    /// Derived health status for this provider.
    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        self.facade.health_status()
    }

    /// Full health snapshot.
    #[must_use]
    pub fn health_report(&self) -> HealthReport {
        self.facade.health_report()
    }

    /// Facade counter snapshot.
    #[must_use]
    pub fn metrics(&self) -> FacadeMetrics {
        self.facade.metrics()
    }

    /// Reset breaker, cache, and health window.
    pub fn reset(&self) {
        self.facade.reset();
    }

    /// Provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.core.provider
    }

    fn url_for(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ProviderError> {
        let mut url = self.base.join(path.trim_start_matches('/')).map_err(|e| {
            ProviderError::new(
                &self.core.provider,
                ErrorCategory::Validation,
                format!("invalid request path {path:?}: {e}"),
            )
        })?;
        if !query.is_empty() {
            let mut sorted: Vec<_> = query.to_vec();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut pairs = url.query_pairs_mut();
            for (k, v) in sorted {
                pairs.append_pair(k, &v);
            }
        }
        Ok(url)
    }

    async fn dispatch(
        &self,
        key: Option<String>,
        method: reqwest::Method,
        url: Url,
        body: Option<Value>,
        cancel: &CancelSignal,
    ) -> Result<Value, ProviderError> {
        let core = Arc::clone(&self.core);
        let cancel2 = cancel.clone();
        self.facade
            .execute(key.as_deref(), cancel, move || {
                let core = Arc::clone(&core);
                let method = method.clone();
                let url = url.clone();
                let body = body.clone();
                let cancel = cancel2.clone();
                async move { core.perform(method, url, body, cancel).await }
            })
            .await
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("provider", &self.core.provider)
            .field("base_url", &self.base.as_str())
            .finish()
    }
}

/// Cache key: method, URL path, and the (already sorted) query string.
fn cache_key(method: &str, url: &Url) -> String {
    format!("{method} {url}")
}

// ---------------------------------------------------------------------------
// One attempt on the wire
// ---------------------------------------------------------------------------

impl ClientCore {
    /// Send one request, replaying exactly once after a 401 refresh.
    async fn perform(
        &self,
        method: reqwest::Method,
        url: Url,
        body: Option<Value>,
        cancel: CancelSignal,
    ) -> Result<Value, ProviderError> {
        let response = self
            .send(method.clone(), url.clone(), body.as_ref(), &cancel)
            .await?;
        let response = if response.status().as_u16() == 401 {
            self.auth.handle_unauthorized(&self.provider).await?;
            debug!(target: "skb.http", provider = %self.provider, %url, "replaying after auth refresh");
            self.send(method, url, body.as_ref(), &cancel).await?
        } else {
            response
        };
        self.classify(response).await
    }

    /// Byte-transfer variant: the body is returned base64-encoded inside a
    /// JSON string so it can flow through the value-typed facade.
    async fn perform_bytes(&self, url: Url, cancel: CancelSignal) -> Result<Value, ProviderError> {
        let response = self
            .send(reqwest::Method::GET, url.clone(), None, &cancel)
            .await?;
        let response = if response.status().as_u16() == 401 {
            self.auth.handle_unauthorized(&self.provider).await?;
            self.send(reqwest::Method::GET, url, None, &cancel).await?
        } else {
            response
        };
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let retry_after = self.retry_after_of(&response);
            let text = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, retry_after, &text));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(Value::String(BASE64.encode(&bytes)))
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: Url,
        body: Option<&Value>,
        cancel: &CancelSignal,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut request = self.http.request(method, url);
        for (name, value) in &self.default_headers {
            request = request.header(name, value);
        }
        let (auth_name, auth_value) = self.auth.auth_header(&self.provider).await?;
        request = request.header(auth_name, auth_value);
        if let Some(body) = body {
            request = request.json(body);
        }
        // Dropping the send future on cancellation aborts the connection.
        tokio::select! {
            response = request.send() => response.map_err(|e| self.transport_error(e)),
            _ = cancel.cancelled() => Err(ProviderError::cancelled(&self.provider)),
        }
    }

    /// Map a response to a value or a taxonomy error.
    async fn classify(&self, response: reqwest::Response) -> Result<Value, ProviderError> {
        let status = response.status().as_u16();
        let retry_after = self.retry_after_of(&response);
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        if (200..300).contains(&status) {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)));
        }
        Err(self.status_error(status, retry_after, &text))
    }

    fn status_error(
        &self,
        status: u16,
        retry_after: Option<std::time::Duration>,
        body: &str,
    ) -> ProviderError {
        let provider = self.provider.as_str();
        let category = if status == 429 || self.rate_limit_status_codes.contains(&status) {
            ErrorCategory::RateLimit
        } else {
            ErrorCategory::from_status(status)
        };
        let mut err = ProviderError::new(
            provider,
            category,
            format!("provider returned HTTP {status}"),
        )
        .with_status(status);
        if let Some(retry_after) = retry_after {
            err = err.with_retry_after(retry_after);
        }
        if category == ErrorCategory::Validation {
            for (field, message) in extract_field_errors(body) {
                err = err.with_field_error(field, message);
            }
        }
        err
    }

    fn retry_after_of(&self, response: &reqwest::Response) -> Option<std::time::Duration> {
        response
            .headers()
            .get(self.retry_after_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after)
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        let code = if err.is_timeout() {
            "ETIMEDOUT"
        } else if err.is_connect() {
            "ECONNREFUSED"
        } else {
            "ECONNRESET"
        };
        ProviderError::new(
            &self.provider,
            ErrorCategory::Network,
            format!("transport failure: {err}"),
        )
        .with_context("code", code)
        .with_source(err)
    }
}

/// Pull a field→message map out of a validation response body.
///
/// Understands `{"errors": {"field": "msg"}}` and
/// `{"fieldErrors": [{"field": "...", "message": "..."}]}`; anything else
/// yields no entries.
fn extract_field_errors(body: &str) -> Vec<(String, String)> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if let Some(Value::Object(map)) = value.get("errors") {
        for (field, msg) in map {
            if let Some(msg) = msg.as_str() {
                out.push((field.clone(), msg.to_string()));
            }
        }
    }
    if let Some(Value::Array(items)) = value.get("fieldErrors") {
        for item in items {
            let field = item.get("field").and_then(|v| v.as_str());
            let message = item.get("message").and_then(|v| v.as_str());
            if let (Some(field), Some(message)) = (field, message) {
                out.push((field.to_string(), message.to_string()));
            }
        }
    }
    out
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_includes_method_and_sorted_query() {
        let url = Url::parse("https://api.example/v2/testcases?folderId=1&page=2").unwrap();
        let key = cache_key("GET", &url);
        assert!(key.starts_with("GET https://api.example/v2/testcases"));
        assert!(key.contains("folderId=1"));
    }

    #[test]
    fn field_errors_from_object_shape() {
        let body = r#"{"errors": {"title": "required", "priority": "unknown"}}"#;
        let errors = extract_field_errors(body);
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&("title".into(), "required".into())));
    }

    #[test]
    fn field_errors_from_array_shape() {
        let body = r#"{"fieldErrors": [{"field": "name", "message": "too long"}]}"#;
        let errors = extract_field_errors(body);
        assert_eq!(errors, vec![("name".into(), "too long".into())]);
    }

    #[test]
    fn field_errors_tolerate_garbage() {
        assert!(extract_field_errors("not json").is_empty());
        assert!(extract_field_errors("{}").is_empty());
        assert!(extract_field_errors(r#"{"errors": "flat string"}"#).is_empty());
    }
}
