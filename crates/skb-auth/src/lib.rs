// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-auth
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Authentication lifecycle for providers.
//!
//! Three methods are supported: long-lived API tokens, password logins
//! against a vendor login endpoint, and OAuth (`client_credentials` and
//! `password` grants, with refresh-token use when one is available). Tokens
//! are cached per provider and refreshed proactively ahead of expiry; a
//! downstream 401 forces a re-authentication through
//! [`AuthHandler::handle_unauthorized`], after which the HTTP client
//! replays the original request exactly once.
//!
//! Credential material never appears in `Debug` output, log events, or
//! error strings.

use serde::{Deserialize, Serialize};
use skb_error::{ErrorCategory, ProviderError, REDACTED};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default header tokens are injected into.
pub const DEFAULT_TOKEN_HEADER: &str = "Authorization";
/// Default prefix prepended to the token value.
pub const DEFAULT_TOKEN_PREFIX: &str = "Bearer ";
/// Tokens are refreshed this long before their reported expiry.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(30);

fn default_token_pointer() -> String {
    "/token".to_string()
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// OAuth grant flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthGrant {
    /// `grant_type=client_credentials`.
    ClientCredentials,
    /// `grant_type=password` (resource-owner password).
    Password,
}

/// Per-provider credential configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Credentials {
    /// Long-lived API token injected as `<prefix><token>` into a header.
    Token {
        /// The token value.
        token: String,
        /// Header to inject into; defaults to [`DEFAULT_TOKEN_HEADER`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header_name: Option<String>,
        /// Prefix before the token; defaults to [`DEFAULT_TOKEN_PREFIX`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    /// POST `{username, password}` to a login URL and extract the session
    /// token from the JSON response.
    Password {
        /// Absolute login endpoint URL.
        login_url: String,
        /// Login user.
        username: String,
        /// Login password.
        password: String,
        /// JSON pointer locating the token in the login response.
        #[serde(default = "default_token_pointer")]
        token_pointer: String,
    },
    /// OAuth token endpoint with client credentials.
    Oauth {
        /// Absolute token endpoint URL.
        token_url: String,
        /// Grant flavour.
        grant: OAuthGrant,
        /// OAuth client id.
        client_id: String,
        /// OAuth client secret.
        client_secret: String,
        /// Resource-owner username (password grant only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Resource-owner password (password grant only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        /// Optional scope string.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
}

impl Credentials {
    /// Method tag for telemetry: `"TOKEN"`, `"PASSWORD"`, or `"OAUTH"`.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Token { .. } => "TOKEN",
            Self::Password { .. } => "PASSWORD",
            Self::Oauth { .. } => "OAUTH",
        }
    }
}

// Secrets must not leak through Debug.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { header_name, prefix, .. } => f
                .debug_struct("Token")
                .field("token", &REDACTED)
                .field("header_name", header_name)
                .field("prefix", prefix)
                .finish(),
            Self::Password {
                login_url,
                username,
                token_pointer,
                ..
            } => f
                .debug_struct("Password")
                .field("login_url", login_url)
                .field("username", username)
                .field("password", &REDACTED)
                .field("token_pointer", token_pointer)
                .finish(),
            Self::Oauth {
                token_url,
                grant,
                client_id,
                username,
                scope,
                ..
            } => f
                .debug_struct("Oauth")
                .field("token_url", token_url)
                .field("grant", grant)
                .field("client_id", client_id)
                .field("client_secret", &REDACTED)
                .field("username", username)
                .field("password", &REDACTED)
                .field("scope", scope)
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

struct CachedToken {
    value: String,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

struct AuthEntry {
    credentials: Credentials,
    cached: Option<CachedToken>,
}

struct HandlerInner {
    http: reqwest::Client,
    entries: Mutex<HashMap<String, AuthEntry>>,
}

/// Registry of per-provider credentials with token caching.
///
/// Cloning yields another handle to the same registry; only the handler
/// mutates cached credentials, all other components read through
/// [`auth_header`](AuthHandler::auth_header).
#[derive(Clone)]
pub struct AuthHandler {
    inner: Arc<HandlerInner>,
}

impl Default for AuthHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthHandler {
    /// Build a handler with its own HTTP client for token endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                http: reqwest::Client::new(),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register (or replace) the credentials for a provider.
    pub async fn register(&self, provider: impl Into<String>, credentials: Credentials) {
        let provider = provider.into();
        debug!(target: "skb.auth", provider = %provider, method = credentials.method(), "credentials registered");
        self.inner.entries.lock().await.insert(
            provider,
            AuthEntry {
                credentials,
                cached: None,
            },
        );
    }

    /// Header name/value pair to inject into an outbound request.
    ///
    /// For PASSWORD and OAUTH methods this authenticates on first use and
    /// whenever the cached token is within [`EXPIRY_SKEW`] of expiry.
    pub async fn auth_header(&self, provider: &str) -> Result<(String, String), ProviderError> {
        let mut entries = self.inner.entries.lock().await;
        let entry = entries.get_mut(provider).ok_or_else(|| {
            ProviderError::new(
                provider,
                ErrorCategory::Authentication,
                "no credentials registered",
            )
        })?;

        match &entry.credentials {
            Credentials::Token {
                token,
                header_name,
                prefix,
            } => {
                let header = header_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TOKEN_HEADER.to_string());
                let prefix = prefix
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TOKEN_PREFIX.to_string());
                Ok((header, format!("{prefix}{token}")))
            }
            Credentials::Password { .. } | Credentials::Oauth { .. } => {
                let needs_fetch = match &entry.cached {
                    Some(cached) => cached.is_expired(),
                    None => true,
                };
                if needs_fetch {
                    let fresh = self.fetch_token(provider, entry).await?;
                    entry.cached = Some(fresh);
                }
                let cached = entry.cached.as_ref().ok_or_else(|| {
                    ProviderError::new(provider, ErrorCategory::Authentication, "token fetch produced nothing")
                })?;
                Ok((
                    DEFAULT_TOKEN_HEADER.to_string(),
                    format!("{DEFAULT_TOKEN_PREFIX}{}", cached.value),
                ))
            }
        }
    }

    /// Force authentication now, replacing any cached token.
    pub async fn authenticate(&self, provider: &str) -> Result<(), ProviderError> {
        let mut entries = self.inner.entries.lock().await;
        let entry = entries.get_mut(provider).ok_or_else(|| {
            ProviderError::new(
                provider,
                ErrorCategory::Authentication,
                "no credentials registered",
            )
        })?;
        match &entry.credentials {
            Credentials::Token { .. } => Ok(()),
            _ => {
                let fresh = self.fetch_token(provider, entry).await?;
                entry.cached = Some(fresh);
                Ok(())
            }
        }
    }

    /// React to a downstream 401: discard the cached token and
    /// re-authenticate.
    ///
    /// For static TOKEN credentials there is nothing to refresh, so the
    /// rejection is terminal and surfaces as an AUTHENTICATION error.
    pub async fn handle_unauthorized(&self, provider: &str) -> Result<(), ProviderError> {
        let mut entries = self.inner.entries.lock().await;
        let entry = entries.get_mut(provider).ok_or_else(|| {
            ProviderError::new(
                provider,
                ErrorCategory::Authentication,
                "no credentials registered",
            )
        })?;
        match &entry.credentials {
            Credentials::Token { .. } => Err(ProviderError::new(
                provider,
                ErrorCategory::Authentication,
                "API token rejected by provider",
            )
            .with_status(401)),
            _ => {
                debug!(target: "skb.auth", provider, "401 received, re-authenticating");
                entry.cached = None;
                let fresh = self.fetch_token(provider, entry).await?;
                entry.cached = Some(fresh);
                Ok(())
            }
        }
    }

    /// Drop the cached token for one provider.
    pub async fn logout(&self, provider: &str) {
        if let Some(entry) = self.inner.entries.lock().await.get_mut(provider) {
            entry.cached = None;
        }
    }

    /// Drop every cached token.
    pub async fn logout_all(&self) {
        for entry in self.inner.entries.lock().await.values_mut() {
            entry.cached = None;
        }
    }

    async fn fetch_token(
        &self,
        provider: &str,
        entry: &AuthEntry,
    ) -> Result<CachedToken, ProviderError> {
        match &entry.credentials {
            Credentials::Token { .. } => Err(ProviderError::new(
                provider,
                ErrorCategory::Authentication,
                "static tokens are not fetched",
            )),
            Credentials::Password {
                login_url,
                username,
                password,
                token_pointer,
            } => {
                let body = serde_json::json!({"username": username, "password": password});
                let response = self
                    .inner
                    .http
                    .post(login_url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| transport_error(provider, "login request failed", e))?;
                let status = response.status().as_u16();
                if !response.status().is_success() {
                    return Err(ProviderError::new(
                        provider,
                        ErrorCategory::Authentication,
                        "login rejected",
                    )
                    .with_status(status));
                }
                let payload: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| transport_error(provider, "login response unreadable", e))?;
                let token = payload
                    .pointer(token_pointer)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        ProviderError::new(
                            provider,
                            ErrorCategory::Authentication,
                            format!("login response missing token at {token_pointer}"),
                        )
                    })?;
                Ok(CachedToken {
                    value: token.to_string(),
                    refresh_token: None,
                    expires_at: None,
                })
            }
            Credentials::Oauth {
                token_url,
                grant,
                client_id,
                client_secret,
                username,
                password,
                scope,
            } => {
                let refresh = entry
                    .cached
                    .as_ref()
                    .and_then(|c| c.refresh_token.clone());
                let mut form: Vec<(&str, String)> = Vec::new();
                match refresh {
                    // Prefer the refresh grant whenever a refresh token is
                    // available.
                    Some(refresh_token) => {
                        form.push(("grant_type", "refresh_token".into()));
                        form.push(("refresh_token", refresh_token));
                    }
                    None => match grant {
                        OAuthGrant::ClientCredentials => {
                            form.push(("grant_type", "client_credentials".into()));
                        }
                        OAuthGrant::Password => {
                            form.push(("grant_type", "password".into()));
                            form.push(("username", username.clone().unwrap_or_default()));
                            form.push(("password", password.clone().unwrap_or_default()));
                        }
                    },
                }
                form.push(("client_id", client_id.clone()));
                form.push(("client_secret", client_secret.clone()));
                if let Some(scope) = scope {
                    form.push(("scope", scope.clone()));
                }

                let response = self
                    .inner
                    .http
                    .post(token_url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(|e| transport_error(provider, "token request failed", e))?;
                let status = response.status().as_u16();
                if !response.status().is_success() {
                    return Err(ProviderError::new(
                        provider,
                        ErrorCategory::Authentication,
                        "token endpoint rejected the grant",
                    )
                    .with_status(status));
                }
                let payload: OAuthTokenResponse = response
                    .json()
                    .await
                    .map_err(|e| transport_error(provider, "token response unreadable", e))?;
                let expires_at = payload.expires_in.map(|secs| {
                    let lifetime = Duration::from_secs(secs);
                    Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW)
                });
                debug!(target: "skb.auth", provider, "token acquired");
                Ok(CachedToken {
                    value: payload.access_token,
                    refresh_token: payload.refresh_token,
                    expires_at,
                })
            }
        }
    }
}

impl std::fmt::Debug for AuthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHandler").finish_non_exhaustive()
    }
}

/// Network-level failure talking to a token endpoint: retryable, marked as
/// network-caused.
fn transport_error(provider: &str, message: &str, err: reqwest::Error) -> ProviderError {
    ProviderError::new(provider, ErrorCategory::Network, message)
        .with_source(err)
        .with_retryable_hint()
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_shows_secrets() {
        let creds = [
            Credentials::Token {
                token: "tok-secret".into(),
                header_name: None,
                prefix: None,
            },
            Credentials::Password {
                login_url: "https://alm.example/login".into(),
                username: "kim".into(),
                password: "pw-secret".into(),
                token_pointer: "/token".into(),
            },
            Credentials::Oauth {
                token_url: "https://id.example/token".into(),
                grant: OAuthGrant::ClientCredentials,
                client_id: "cid".into(),
                client_secret: "cs-secret".into(),
                username: None,
                password: None,
                scope: None,
            },
        ];
        for c in &creds {
            let dbg = format!("{c:?}");
            assert!(!dbg.contains("tok-secret"), "token leaked: {dbg}");
            assert!(!dbg.contains("pw-secret"), "password leaked: {dbg}");
            assert!(!dbg.contains("cs-secret"), "client secret leaked: {dbg}");
        }
    }

    #[test]
    fn method_tags() {
        let t = Credentials::Token {
            token: "x".into(),
            header_name: None,
            prefix: None,
        };
        assert_eq!(t.method(), "TOKEN");
    }

    #[test]
    fn credentials_serde_shape() {
        let json = serde_json::json!({
            "method": "OAUTH",
            "token_url": "https://id.example/token",
            "grant": "client_credentials",
            "client_id": "cid",
            "client_secret": "cs"
        });
        let creds: Credentials = serde_json::from_value(json).expect("parses");
        assert_eq!(creds.method(), "OAUTH");
        let json = serde_json::json!({
            "method": "TOKEN",
            "token": "abc"
        });
        let creds: Credentials = serde_json::from_value(json).expect("parses");
        assert_eq!(creds.method(), "TOKEN");
    }

    #[tokio::test]
    async fn token_method_builds_header_with_defaults() {
        let handler = AuthHandler::new();
        handler
            .register(
                "zephyr",
                Credentials::Token {
                    token: "abc123".into(),
                    header_name: None,
                    prefix: None,
                },
            )
            .await;
        let (name, value) = handler.auth_header("zephyr").await.expect("header");
        assert_eq!(name, "Authorization");
        assert_eq!(value, "Bearer abc123");
    }

    #[tokio::test]
    async fn token_method_honours_custom_header_and_prefix() {
        let handler = AuthHandler::new();
        handler
            .register(
                "alm",
                Credentials::Token {
                    token: "abc".into(),
                    header_name: Some("X-Api-Key".into()),
                    prefix: Some(String::new()),
                },
            )
            .await;
        let (name, value) = handler.auth_header("alm").await.expect("header");
        assert_eq!(name, "X-Api-Key");
        assert_eq!(value, "abc");
    }

    #[tokio::test]
    async fn unregistered_provider_is_an_auth_error() {
        let handler = AuthHandler::new();
        let err = handler.auth_header("missing").await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Authentication);
    }

    #[tokio::test]
    async fn token_401_is_terminal() {
        let handler = AuthHandler::new();
        handler
            .register(
                "zephyr",
                Credentials::Token {
                    token: "stale".into(),
                    header_name: None,
                    prefix: None,
                },
            )
            .await;
        let err = handler.handle_unauthorized("zephyr").await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Authentication);
        assert_eq!(err.status, Some(401));
    }
}
