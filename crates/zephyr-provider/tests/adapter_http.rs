// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter-level behavior against a mock Zephyr Scale server.

use serde_json::json;
use skb_auth::Credentials;
use skb_cancel::CancelSignal;
use skb_provider::{PageQuery, Provider, ProviderConfig, SourceProvider, TargetProvider, TestCaseQuery};
use skb_core::{TestCase, TestCaseStatus};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zephyr_provider::ZephyrProvider;

async fn initialised(server: &MockServer) -> ZephyrProvider {
    let mut adapter = ZephyrProvider::new();
    let config = ProviderConfig::new(
        server.uri(),
        Credentials::Token {
            token: "tok".into(),
            header_name: None,
            prefix: None,
        },
    );
    adapter.initialize(config).await.expect("initialises");
    adapter
}

#[tokio::test]
async fn lists_test_cases_with_paging_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/testcases"))
        .and(query_param("projectKey", "PROJ"))
        .and(query_param("maxResults", "2"))
        .and(query_param("startAt", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                {"id": 1, "name": "a", "status": {"name": "Approved"}},
                {"id": 2, "name": "b", "status": {"name": "Draft"}}
            ],
            "total": 7
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let query = TestCaseQuery {
        paging: PageQuery { page: 2, page_size: 2 },
        ..TestCaseQuery::default()
    };
    let page = adapter
        .test_cases("PROJ", &query, &cancel)
        .await
        .expect("page");
    assert_eq!(page.total, 7);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].status, TestCaseStatus::Approved);
    assert!(page.has_more());
}

#[tokio::test]
async fn single_test_case_includes_steps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/testcases/101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 101, "name": "Login", "status": {"name": "Draft"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/testcases/101/teststeps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                {"inline": {"description": "open", "expectedResult": "opened"}},
                {"inline": {"description": "login", "expectedResult": "logged in"}}
            ]
        })))
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let tc = adapter
        .test_case("PROJ", "101", &cancel)
        .await
        .expect("test case");
    assert_eq!(tc.steps.len(), 2);
    assert_eq!(
        tc.steps.iter().map(|s| s.sequence).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn create_test_case_posts_vendor_tokens_and_returns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/testcases"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 555, "key": "PROJ-T555"})))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let mut tc = TestCase::new("source-1", "Created case");
    tc.status = TestCaseStatus::Approved;
    let id = adapter
        .create_test_case("PROJ", &tc, &cancel)
        .await
        .expect("created");
    assert_eq!(id, "555");
}

#[tokio::test]
async fn malformed_project_id_is_rejected_locally() {
    let server = MockServer::start().await;
    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let err = adapter
        .test_cases("bad project", &TestCaseQuery::default(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.category, skb_error::ErrorCategory::Validation);
    // Nothing reached the server.
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn connection_probe_falls_back_to_project_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthcheck"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": []})))
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let status = adapter.test_connection(&cancel).await.expect("probe");
    assert!(status.connected);
}
