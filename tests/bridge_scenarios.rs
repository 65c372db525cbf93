// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end bridge scenarios across crates: auth refresh, throttling
//! backoff, circuit recovery, and the cross-vendor mapping checks.

use serde_json::json;
use skidbladnir::auth::{AuthHandler, Credentials, OAuthGrant};
use skidbladnir::cancel::CancelSignal;
use skidbladnir::core::{ExecutionStatus, FieldValue, Priority, TestCaseStatus, TestStep};
use skidbladnir::error::ErrorCategory;
use skidbladnir::http::{ClientConfig, ResilientClient};
use skidbladnir::resilience::FacadeConfig;
use skidbladnir::retry::{CircuitBreakerConfig, RetryPolicy};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn client(server: &MockServer, auth: AuthHandler, facade: FacadeConfig) -> ResilientClient {
    init_tracing();
    ResilientClient::new(
        ClientConfig {
            provider: "scenario".into(),
            base_url: server.uri(),
            default_headers: BTreeMap::new(),
            rate_limit_status_codes: Vec::new(),
            retry_after_header: "Retry-After".into(),
            facade,
        },
        auth,
    )
    .expect("client builds")
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 10,
        backoff_factor: 2.0,
        jitter: 0.0,
        ..RetryPolicy::default()
    }
}

// ---------------------------------------------------------------------------
// Token auto-refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oauth_refresh_replays_the_original_request_once() {
    let server = MockServer::start().await;
    // One token endpoint hit for the initial grant...
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "expired-token",
            "expires_in": 3600
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    // ...and exactly one more for the refresh after the 401.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("Authorization", "Bearer expired-token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("Authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthHandler::new();
    auth.register(
        "scenario",
        Credentials::Oauth {
            token_url: format!("{}/oauth/token", server.uri()),
            grant: OAuthGrant::ClientCredentials,
            client_id: "cid".into(),
            client_secret: "cs".into(),
            username: None,
            password: None,
            scope: None,
        },
    )
    .await;
    let client = client(&server, auth, FacadeConfig::default());
    let cancel = CancelSignal::new();

    let value = client.get("/data", &[], &cancel).await.expect("refreshed");
    assert_eq!(value, json!({"ok": true}));
    // Exactly two resource calls and two token-endpoint hits happened; the
    // mock expectations above verify the counts on drop.
}

// ---------------------------------------------------------------------------
// 429 backoff honours Retry-After
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limited_calls_wait_at_least_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthHandler::new();
    auth.register(
        "scenario",
        Credentials::Token {
            token: "t".into(),
            header_name: None,
            prefix: None,
        },
    )
    .await;
    let client = client(
        &server,
        auth,
        FacadeConfig {
            retry: fast_retry(3),
            ..FacadeConfig::default()
        },
    );
    let cancel = CancelSignal::new();

    let started = Instant::now();
    let value = client
        .get("/limited", &[], &cancel)
        .await
        .expect("third call succeeds");
    assert_eq!(value, json!({"ok": true}));
    // Two floored waits of two seconds each.
    assert!(
        started.elapsed() >= Duration::from_secs(4),
        "observed {:?}",
        started.elapsed()
    );
}

// ---------------------------------------------------------------------------
// Circuit trips and recovers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn circuit_trips_after_failures_and_recovers_after_reset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/unstable"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/unstable"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let auth = AuthHandler::new();
    auth.register(
        "scenario",
        Credentials::Token {
            token: "t".into(),
            header_name: None,
            prefix: None,
        },
    )
    .await;
    let client = client(
        &server,
        auth,
        FacadeConfig {
            retry: fast_retry(1),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout_ms: 100,
                half_open_success_threshold: 1,
            },
            ..FacadeConfig::default()
        },
    );
    let cancel = CancelSignal::new();

    // Three 500s open the circuit. Distinct queries defeat the GET cache.
    for n in 0..3 {
        let err = client
            .get("/unstable", &[("n", n.to_string())], &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Server, "call {n}");
    }
    // The fourth call fails locally without touching the server.
    let err = client
        .get("/unstable", &[("n", "3".into())], &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::CircuitOpen);

    // After the reset window a probe succeeds and the circuit closes.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let value = client
        .get("/unstable", &[("n", "4".into())], &cancel)
        .await
        .expect("half-open probe succeeds");
    assert_eq!(value, json!({"ok": true}));
    let value = client
        .get("/unstable", &[("n", "5".into())], &cancel)
        .await
        .expect("circuit closed again");
    assert_eq!(value, json!({"ok": true}));
}

// ---------------------------------------------------------------------------
// Azure DevOps step round-trip
// ---------------------------------------------------------------------------

#[test]
fn azure_steps_html_round_trip() {
    let steps = vec![TestStep::new(1, "<b>a</b>", "r")];
    let html = skidbladnir::azure::steps::to_steps_html(&steps);
    assert_eq!(
        html,
        r#"<steps id="0"><step id="1" type="ActionStep"><parameterizedString>&lt;b&gt;a&lt;/b&gt;</parameterizedString><parameterizedString>r</parameterizedString></step></steps>"#
    );
    let parsed = skidbladnir::azure::steps::from_steps_html(&html);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].sequence, 1);
    assert_eq!(parsed[0].action, "<b>a</b>");
    assert_eq!(parsed[0].expected_result, "r");
}

// ---------------------------------------------------------------------------
// Zephyr custom-field coercion
// ---------------------------------------------------------------------------

#[test]
fn zephyr_custom_fields_coerce_by_shape() {
    let raw = json!({
        "id": 1,
        "name": "t",
        "customFields": {
            "intField": 42,
            "boolTrue": "true",
            "dateField": "2025-04-15T14:30:45Z"
        }
    });
    let tc = skidbladnir::zephyr::mapper::to_test_case(&raw, &BTreeMap::new());
    assert_eq!(tc.custom_fields["intField"], FieldValue::Integer(42));
    assert_eq!(tc.custom_fields["boolTrue"], FieldValue::Boolean(true));
    match &tc.custom_fields["dateField"] {
        FieldValue::Date(d) => assert_eq!(
            d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2025-04-15T14:30:45.000Z"
        ),
        other => panic!("expected Date, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// qTest priority mapping
// ---------------------------------------------------------------------------

#[test]
fn qtest_priorities_numeric_text_and_fallback() {
    use skidbladnir::qtest::mapper::to_canonical_priority;
    assert_eq!(to_canonical_priority("1"), Priority::Critical);
    assert_eq!(to_canonical_priority("2"), Priority::High);
    assert_eq!(to_canonical_priority("3"), Priority::Medium);
    assert_eq!(to_canonical_priority("4"), Priority::Low);
    assert_eq!(to_canonical_priority("critical"), Priority::Critical);
    assert_eq!(to_canonical_priority("high"), Priority::High);
    assert_eq!(to_canonical_priority("medium"), Priority::Medium);
    assert_eq!(to_canonical_priority("low"), Priority::Low);
    for other in ["0", "5", "urgent", ""] {
        assert_eq!(to_canonical_priority(other), Priority::Medium, "{other:?}");
    }
}

// ---------------------------------------------------------------------------
// Cross-vendor enum round-trips
// ---------------------------------------------------------------------------

#[test]
fn every_vendor_round_trips_canonical_enums() {
    for status in TestCaseStatus::ALL {
        assert_eq!(
            skidbladnir::zephyr::mapper::to_canonical_status(
                skidbladnir::zephyr::mapper::from_canonical_status(*status)
            ),
            *status
        );
        assert_eq!(
            skidbladnir::qtest::mapper::to_canonical_status(
                skidbladnir::qtest::mapper::from_canonical_status(*status)
            ),
            *status
        );
        assert_eq!(
            skidbladnir::azure::mapper::to_canonical_status(
                skidbladnir::azure::mapper::from_canonical_status(*status)
            ),
            *status
        );
        assert_eq!(
            skidbladnir::rally::mapper::to_canonical_status(
                skidbladnir::rally::mapper::from_canonical_status(*status)
            ),
            *status
        );
        assert_eq!(
            skidbladnir::alm::mapper::to_canonical_status(
                skidbladnir::alm::mapper::from_canonical_status(*status)
            ),
            *status
        );
        assert_eq!(
            skidbladnir::visure::mapper::to_canonical_status(
                skidbladnir::visure::mapper::from_canonical_status(*status)
            ),
            *status
        );
    }
    for status in ExecutionStatus::ALL {
        assert_eq!(
            skidbladnir::zephyr::mapper::to_canonical_execution_status(
                skidbladnir::zephyr::mapper::from_canonical_execution_status(*status)
            ),
            *status
        );
        assert_eq!(
            skidbladnir::qtest::mapper::to_canonical_execution_status(
                skidbladnir::qtest::mapper::from_canonical_execution_status(*status)
            ),
            *status
        );
        assert_eq!(
            skidbladnir::azure::mapper::to_canonical_outcome(
                skidbladnir::azure::mapper::from_canonical_outcome(*status)
            ),
            *status
        );
    }
}
