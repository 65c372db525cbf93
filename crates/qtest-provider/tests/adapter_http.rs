// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter-level behavior against a mock qTest server.

use qtest_provider::QTestProvider;
use serde_json::json;
use skb_auth::Credentials;
use skb_cancel::CancelSignal;
use skb_core::{ExecutionStatus, Priority, TestExecution};
use skb_provider::{PageQuery, Provider, ProviderConfig, SourceProvider, TargetProvider, TestCaseQuery};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn initialised(server: &MockServer) -> QTestProvider {
    let mut adapter = QTestProvider::new();
    adapter
        .initialize(ProviderConfig::new(
            server.uri(),
            Credentials::Token {
                token: "tok".into(),
                header_name: None,
                prefix: None,
            },
        ))
        .await
        .expect("initialises");
    adapter
}

#[tokio::test]
async fn test_cases_parse_numeric_priorities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/7/test-cases"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": 1, "name": "a", "properties": [
                    {"field_name": "Priority", "field_value": "1"}
                ]},
                {"id": 2, "name": "b", "properties": [
                    {"field_name": "Priority", "field_value": "4"}
                ]}
            ],
            "total": 2
        })))
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let page = adapter
        .test_cases("7", &TestCaseQuery::default(), &cancel)
        .await
        .expect("page");
    assert_eq!(page.items[0].priority, Priority::Critical);
    assert_eq!(page.items[1].priority, Priority::Low);
}

#[tokio::test]
async fn executions_are_posted_as_one_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/7/auto-test-logs"))
        .and(body_partial_json(json!({
            "test_logs": [{"status": "PASSED"}, {"status": "FAILED"}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let mut passed = TestExecution::new("a", "901");
    passed.status = ExecutionStatus::Passed;
    let mut failed = TestExecution::new("b", "902");
    failed.status = ExecutionStatus::Failed;
    adapter
        .create_test_executions("7", &[passed, failed], &cancel)
        .await
        .expect("batch accepted");
}

#[tokio::test]
async fn non_numeric_project_id_is_rejected_before_the_wire() {
    let server = MockServer::start().await;
    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let err = adapter
        .test_cycles("PROJ", &PageQuery::default(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.category, skb_error::ErrorCategory::Validation);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn field_definition_creation_is_unsupported() {
    let server = MockServer::start().await;
    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let definition = skb_core::FieldDefinition {
        id: String::new(),
        name: "Points".into(),
        field_type: skb_core::FieldType::Number,
        required: false,
        allowed_values: Vec::new(),
        entity: skb_core::EntityType::TestCase,
    };
    let err = adapter
        .create_field_definition("7", &definition, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.category, skb_error::ErrorCategory::Validation);
    assert_eq!(err.context.get("unsupported"), Some(&json!(true)));
}
