// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter-level behavior against a mock Azure DevOps organisation.

use azure_provider::AzureProvider;
use serde_json::json;
use skb_auth::Credentials;
use skb_cancel::CancelSignal;
use skb_core::{TestCase, TestCaseStatus};
use skb_provider::{Provider, ProviderConfig, SourceProvider, TargetProvider, TestCaseQuery};
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn initialised(server: &MockServer) -> AzureProvider {
    let mut adapter = AzureProvider::new();
    let mut config = ProviderConfig::new(
        server.uri(),
        Credentials::Token {
            token: "ignored".into(),
            header_name: None,
            prefix: None,
        },
    );
    config
        .extra
        .insert("personal_access_token".into(), json!("pat-secret"));
    adapter.initialize(config).await.expect("initialises");
    adapter
}

#[tokio::test]
async fn pat_becomes_a_basic_auth_header() {
    let server = MockServer::start().await;
    // base64(":pat-secret")
    Mock::given(method("GET"))
        .and(path("/_apis/projects"))
        .and(header("Authorization", "Basic OnBhdC1zZWNyZXQ="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [], "count": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let status = adapter.test_connection(&cancel).await.expect("probe");
    assert!(status.connected);
}

#[tokio::test]
async fn wiql_then_batch_fetch_parses_steps_html() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Fabrikam/_apis/wit/wiql"))
        .and(body_partial_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workItems": [{"id": 42}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_apis/wit/workitems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "id": 42,
                "fields": {
                    "System.Title": "Login",
                    "System.State": "Ready",
                    "Microsoft.VSTS.Common.Priority": 1,
                    "Microsoft.VSTS.TCM.Steps":
                        "<steps id=\"0\"><step id=\"1\" type=\"ActionStep\"><parameterizedString>&lt;b&gt;a&lt;/b&gt;</parameterizedString><parameterizedString>r</parameterizedString></step></steps>"
                }
            }],
            "count": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let page = adapter
        .test_cases("Fabrikam", &TestCaseQuery::default(), &cancel)
        .await
        .expect("page");
    assert_eq!(page.total, 1);
    let tc = &page.items[0];
    assert_eq!(tc.status, TestCaseStatus::Ready);
    assert_eq!(tc.steps.len(), 1);
    assert_eq!(tc.steps[0].action, "<b>a</b>");
    assert_eq!(tc.steps[0].expected_result, "r");
}

#[tokio::test]
async fn create_posts_a_patch_document_to_the_test_case_type() {
    let server = MockServer::start().await;
    // The test-case type segment arrives percent-encoded ("$Test%20Case").
    Mock::given(method("POST"))
        .and(path_regex(r"^/Fabrikam/_apis/wit/workitems/\$Test(%20| )Case$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4242})))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = initialised(&server).await;
    let cancel = CancelSignal::new();
    let mut tc = TestCase::new("src-1", "Created");
    tc.push_step("<b>a</b>", "r");
    let id = adapter
        .create_test_case("Fabrikam", &tc, &cancel)
        .await
        .expect("created");
    assert_eq!(id, "4242");

    // The body really was a JSON-Patch array with the escaped steps HTML.
    let requests = server.received_requests().await.unwrap_or_default();
    let create = requests
        .iter()
        .find(|r| r.url.path().contains("Test") && r.method.to_string() == "POST")
        .expect("create request");
    let body: serde_json::Value = serde_json::from_slice(&create.body).expect("json body");
    let ops = body.as_array().expect("patch array");
    let steps_op = ops
        .iter()
        .find(|op| op["path"] == json!("/fields/Microsoft.VSTS.TCM.Steps"))
        .expect("steps op");
    assert!(
        steps_op["value"]
            .as_str()
            .unwrap_or("")
            .contains("&lt;b&gt;a&lt;/b&gt;")
    );
}
