// SPDX-License-Identifier: MIT OR Apache-2.0
//! zephyr-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Zephyr Scale adapter: implements the Source and Target capability
//! contracts on top of the resilient HTTP client and the Zephyr mapper.
//!
//! Project ids on the canonical side are Zephyr project keys (e.g.
//! `"PROJ"`); entity ids are the numeric Zephyr ids carried as opaque
//! strings.

/// Pure payload mapping functions and enum tables.
pub mod mapper;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use skb_auth::AuthHandler;
use skb_cancel::CancelSignal;
use skb_core::{
    Attachment, FieldDefinition, Folder, Project, TestCase, TestCycle, TestExecution, TestStep,
};
use skb_error::{ErrorCategory, ProviderError, enrich};
use skb_http::ResilientClient;
use skb_provider::{
    AttachmentContent, AttachmentOwner, ConnectionStatus, Page, PageQuery, Provider,
    ProviderCapabilities, ProviderConfig, ProviderMetadata, SourceProvider, TargetProvider,
    TestCaseQuery,
};
use skb_ratelimit::RateLimiterConfig;
use std::collections::HashMap;
use tracing::info;

/// Stable provider id.
pub const PROVIDER_ID: &str = "zephyr";
/// Human-readable provider name.
pub const PROVIDER_NAME: &str = "Zephyr Scale";

struct State {
    config: ProviderConfig,
    client: ResilientClient,
}

/// Zephyr Scale adapter.
#[derive(Default)]
pub struct ZephyrProvider {
    state: Option<State>,
}

impl ZephyrProvider {
    /// An uninitialised adapter; call
    /// [`initialize`](Provider::initialize) before use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<&State, ProviderError> {
        self.state.as_ref().ok_or_else(|| {
            ProviderError::new(
                PROVIDER_ID,
                ErrorCategory::Validation,
                "provider not initialised",
            )
        })
    }

    fn client(&self) -> Result<&ResilientClient, ProviderError> {
        Ok(&self.state()?.client)
    }
}

/// Reject empty or structurally impossible vendor ids before they reach
/// the wire.
fn require_id<'a>(kind: &str, value: &'a str) -> Result<&'a str, ProviderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) || trimmed.contains('/') {
        return Err(ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!("malformed {kind} id: {value:?}"),
        )
        .with_field_error(kind, "must be a non-empty id without spaces or slashes"));
    }
    Ok(trimmed)
}

/// Resolve folder paths for a flat vendor folder list.
fn fold_paths(raw_folders: &[Value]) -> Vec<Folder> {
    let mut by_id: HashMap<String, &Value> = HashMap::new();
    for folder in raw_folders {
        if let Some(id) = folder.get("id").map(|v| match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        }) {
            if !id.is_empty() {
                by_id.insert(id, folder);
            }
        }
    }
    let mut resolved: HashMap<String, Folder> = HashMap::new();
    // Parents resolve before children; the pass count bounds us against
    // malformed (cyclic) parent links.
    for _ in 0..=raw_folders.len() {
        let mut progressed = false;
        for (id, raw) in &by_id {
            if resolved.contains_key(id) {
                continue;
            }
            let parent_id = raw
                .get("parentId")
                .and_then(|v| match v {
                    Value::Number(n) => Some(n.to_string()),
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                });
            let folder = match &parent_id {
                None => mapper::to_folder(raw, None),
                Some(pid) => match resolved.get(pid) {
                    Some(parent) => mapper::to_folder(raw, Some(&parent.path)),
                    None if by_id.contains_key(pid) => continue,
                    // Orphaned parent reference: treat as a root.
                    None => mapper::to_folder(raw, None),
                },
            };
            resolved.insert(id.clone(), folder);
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
    let mut folders: Vec<Folder> = resolved.into_values().collect();
    folders.sort_by(|a, b| a.path.cmp(&b.path));
    folders
}

#[async_trait]
impl Provider for ZephyrProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::source_and_target().with_rate_limiting(RateLimiterConfig {
            max_requests_per_second: 10,
            max_requests_per_minute: 500,
            max_concurrent_requests: 5,
            ..RateLimiterConfig::default()
        })
    }

    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), ProviderError> {
        let auth = AuthHandler::new();
        let client = config.build_client(PROVIDER_ID, &auth).await?;
        info!(target: "skb.zephyr", base_url = %config.base_url, "adapter initialised");
        self.state = Some(State { config, client });
        Ok(())
    }

    async fn test_connection(
        &self,
        cancel: &CancelSignal,
    ) -> Result<ConnectionStatus, ProviderError> {
        let client = self.client()?;
        match client.get("healthcheck", &[], cancel).await {
            Ok(_) => Ok(ConnectionStatus {
                connected: true,
                detail: "healthcheck ok".into(),
            }),
            Err(err) if err.category == ErrorCategory::NotFound => {
                // Older deployments lack /healthcheck; a project listing
                // works as a probe.
                client
                    .get("projects", &[("maxResults", "1".into())], cancel)
                    .await?;
                Ok(ConnectionStatus {
                    connected: true,
                    detail: "project listing ok".into(),
                })
            }
            Err(err) => Err(err),
        }
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: PROVIDER_ID.into(),
            name: PROVIDER_NAME.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            base_url: self.state.as_ref().map(|s| s.config.base_url.clone()),
        }
    }

    fn health_report(&self) -> Option<skb_resilience::HealthReport> {
        self.state.as_ref().map(|s| s.client.health_report())
    }
}

#[async_trait]
impl SourceProvider for ZephyrProvider {
    async fn projects(&self, cancel: &CancelSignal) -> Result<Vec<Project>, ProviderError> {
        let raw = self.client()?.get("projects", &[], cancel).await?;
        Ok(mapper::page_values(&raw)
            .iter()
            .map(mapper::to_project)
            .collect())
    }

    async fn folders(
        &self,
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<Folder>, ProviderError> {
        let project = require_id("project", project_id)?;
        let raw = self
            .client()?
            .get(
                "folders",
                &[
                    ("projectKey", project.to_string()),
                    ("maxResults", "200".into()),
                ],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "folders", &json!({"project": project})))?;
        Ok(fold_paths(&mapper::page_values(&raw)))
    }

    async fn test_cases(
        &self,
        project_id: &str,
        query: &TestCaseQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCase>, ProviderError> {
        let project = require_id("project", project_id)?;
        let state = self.state()?;
        let page = query.paging.page.max(1);
        let page_size = query.paging.page_size.max(1);
        let start_at = query
            .start_at
            .unwrap_or((page - 1).saturating_mul(page_size));
        let mut params = vec![
            ("projectKey", project.to_string()),
            ("maxResults", page_size.to_string()),
            ("startAt", start_at.to_string()),
        ];
        if let Some(folder) = &query.folder_id {
            params.push(("folderId", require_id("folder", folder)?.to_string()));
        }
        let raw = state
            .client
            .get("testcases", &params, cancel)
            .await
            .map_err(|e| enrich(e, "test_cases", &json!({"project": project})))?;
        let mut items: Vec<TestCase> = mapper::page_values(&raw)
            .iter()
            .map(|v| mapper::to_test_case(v, &state.config.test_case_field_mappings))
            .collect();
        if let Some(status) = query.status {
            items.retain(|tc| tc.status == status);
        }
        Ok(Page {
            items,
            total: mapper::page_total(&raw),
            page,
            page_size,
        })
    }

    async fn test_case(
        &self,
        _project_id: &str,
        test_case_id: &str,
        cancel: &CancelSignal,
    ) -> Result<TestCase, ProviderError> {
        let id = require_id("test_case", test_case_id)?;
        let state = self.state()?;
        let raw = state
            .client
            .get(&format!("testcases/{id}"), &[], cancel)
            .await
            .map_err(|e| enrich(e, "test_case", &json!({"id": id})))?;
        let mut tc = mapper::to_test_case(&raw, &state.config.test_case_field_mappings);
        let steps = state
            .client
            .get(&format!("testcases/{id}/teststeps"), &[], cancel)
            .await
            .map(|raw| mapper::to_steps(&raw))
            .unwrap_or_default();
        tc.steps = steps;
        Ok(tc)
    }

    async fn test_cycles(
        &self,
        project_id: &str,
        query: &PageQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCycle>, ProviderError> {
        let project = require_id("project", project_id)?;
        let raw = self
            .client()?
            .get(
                "testcycles",
                &[
                    ("projectKey", project.to_string()),
                    ("maxResults", query.page_size.to_string()),
                    (
                        "startAt",
                        ((query.page.max(1) - 1) * query.page_size).to_string(),
                    ),
                ],
                cancel,
            )
            .await?;
        Ok(Page {
            items: mapper::page_values(&raw).iter().map(mapper::to_cycle).collect(),
            total: mapper::page_total(&raw),
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn test_executions(
        &self,
        project_id: &str,
        cycle_id: &str,
        query: &PageQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestExecution>, ProviderError> {
        let project = require_id("project", project_id)?;
        let cycle = require_id("cycle", cycle_id)?;
        let raw = self
            .client()?
            .get(
                "testexecutions",
                &[
                    ("projectKey", project.to_string()),
                    ("testCycle", cycle.to_string()),
                    ("maxResults", query.page_size.to_string()),
                    (
                        "startAt",
                        ((query.page.max(1) - 1) * query.page_size).to_string(),
                    ),
                ],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "test_executions", &json!({"cycle": cycle})))?;
        Ok(Page {
            items: mapper::page_values(&raw)
                .iter()
                .map(mapper::to_execution)
                .collect(),
            total: mapper::page_total(&raw),
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn attachment_content(
        &self,
        _project_id: &str,
        attachment_id: &str,
        cancel: &CancelSignal,
    ) -> Result<AttachmentContent, ProviderError> {
        let id = require_id("attachment", attachment_id)?;
        let data = self
            .client()?
            .get_bytes(&format!("attachments/{id}"), &[], cancel)
            .await?;
        Ok(AttachmentContent {
            file_name: id.to_string(),
            content_type: skb_core::DEFAULT_CONTENT_TYPE.into(),
            data,
        })
    }

    async fn field_definitions(
        &self,
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<FieldDefinition>, ProviderError> {
        let project = require_id("project", project_id)?;
        let raw = self
            .client()?
            .get(
                "customfields",
                &[("projectKey", project.to_string())],
                cancel,
            )
            .await?;
        Ok(mapper::to_field_definitions(&raw))
    }
}

#[async_trait]
impl TargetProvider for ZephyrProvider {
    async fn create_folder(
        &self,
        project_id: &str,
        folder: &Folder,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_id("project", project_id)?;
        let mut body = json!({
            "projectKey": project,
            "name": folder.name,
            "folderType": "TEST_CASE",
        });
        if let Some(parent) = &folder.parent_id {
            body["parentId"] = json!(require_id("folder", parent)?);
        }
        let raw = self.client()?.post("folders", &body, cancel).await?;
        created_id(&raw, "folder")
    }

    async fn create_test_case(
        &self,
        project_id: &str,
        test_case: &TestCase,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_id("project", project_id)?;
        let body = mapper::from_test_case(test_case, project);
        let raw = self
            .client()?
            .post("testcases", &body, cancel)
            .await
            .map_err(|e| enrich(e, "create_test_case", &json!({"title": test_case.title})))?;
        created_id(&raw, "test case")
    }

    async fn create_test_steps(
        &self,
        _project_id: &str,
        test_case_id: &str,
        steps: &[TestStep],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let id = require_id("test_case", test_case_id)?;
        let body = mapper::from_steps(steps);
        self.client()?
            .post(&format!("testcases/{id}/teststeps"), &body, cancel)
            .await?;
        Ok(())
    }

    async fn create_test_cycle(
        &self,
        project_id: &str,
        cycle: &TestCycle,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_id("project", project_id)?;
        let body = mapper::from_cycle(cycle, project);
        let raw = self.client()?.post("testcycles", &body, cancel).await?;
        created_id(&raw, "test cycle")
    }

    async fn create_test_executions(
        &self,
        project_id: &str,
        executions: &[TestExecution],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let project = require_id("project", project_id)?;
        // Strictly sequential: preserves per-caller ordering and keeps the
        // vendor's own rate limits predictable.
        for execution in executions {
            let body = mapper::from_execution(execution, project);
            self.client()?
                .post("testexecutions", &body, cancel)
                .await
                .map_err(|e| {
                    enrich(e, "create_test_executions", &json!({"execution": execution.id}))
                })?;
        }
        Ok(())
    }

    async fn upload_attachment(
        &self,
        _project_id: &str,
        owner: &AttachmentOwner,
        attachment: &Attachment,
        data: &[u8],
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let path = match owner {
            AttachmentOwner::TestCase(id) => {
                format!("testcases/{}/attachments", require_id("test_case", id)?)
            }
            AttachmentOwner::TestExecution(id) => {
                format!("testexecutions/{}/attachments", require_id("execution", id)?)
            }
        };
        let body = json!({
            "filename": attachment.file_name,
            "contentType": attachment.content_type,
            "contentBase64": BASE64.encode(data),
        });
        let raw = self.client()?.post(&path, &body, cancel).await?;
        created_id(&raw, "attachment")
    }

    async fn create_field_definition(
        &self,
        project_id: &str,
        definition: &FieldDefinition,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_id("project", project_id)?;
        let body = json!({
            "projectKey": project,
            "name": definition.name,
            "type": serde_json::to_value(definition.field_type)
                .unwrap_or(Value::String("CUSTOM".into())),
            "required": definition.required,
            "options": definition.allowed_values,
        });
        let raw = self.client()?.post("customfields", &body, cancel).await?;
        created_id(&raw, "custom field")
    }
}

/// Pull the created entity id (or key) out of a write response.
fn created_id(raw: &Value, entity: &str) -> Result<String, ProviderError> {
    raw.get("id")
        .map(|v| match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .or_else(|| {
            raw.get("key")
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .ok_or_else(|| {
            ProviderError::new(
                PROVIDER_ID,
                ErrorCategory::Unknown,
                format!("create {entity} response carried no id"),
            )
        })
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation_rejects_malformed_input() {
        assert!(require_id("project", "PROJ").is_ok());
        for bad in ["", "  ", "has space", "has/slash"] {
            let err = require_id("project", bad).unwrap_err();
            assert_eq!(err.category, ErrorCategory::Validation, "input {bad:?}");
        }
    }

    #[test]
    fn uninitialised_adapter_refuses_calls() {
        let adapter = ZephyrProvider::new();
        let err = adapter.client().unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);
    }

    #[test]
    fn capabilities_declare_full_read_write() {
        let caps = ZephyrProvider::new().capabilities();
        assert!(caps.can_be_source);
        assert!(caps.can_be_target);
        assert!(caps.supports_test_steps);
        assert_eq!(caps.rate_limiting.max_requests_per_minute, 500);
    }

    #[test]
    fn created_id_prefers_id_then_key() {
        assert_eq!(created_id(&json!({"id": 12}), "x").unwrap(), "12");
        assert_eq!(created_id(&json!({"key": "PROJ-T1"}), "x").unwrap(), "PROJ-T1");
        assert!(created_id(&json!({}), "x").is_err());
    }

    #[test]
    fn folder_paths_resolve_parents_in_any_order() {
        let raw = vec![
            json!({"id": 3, "name": "MFA", "parentId": 2}),
            json!({"id": 1, "name": "Regression"}),
            json!({"id": 2, "name": "Login", "parentId": 1}),
        ];
        let folders = fold_paths(&raw);
        let paths: Vec<&str> = folders.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/Regression", "/Regression/Login", "/Regression/Login/MFA"]);
    }

    #[test]
    fn folder_cycles_do_not_hang() {
        let raw = vec![
            json!({"id": 1, "name": "A", "parentId": 2}),
            json!({"id": 2, "name": "B", "parentId": 1}),
        ];
        // Both are in a parent cycle; resolution terminates (entries are
        // simply dropped rather than looping forever).
        let folders = fold_paths(&raw);
        assert!(folders.len() <= 2);
    }
}
