// SPDX-License-Identifier: MIT OR Apache-2.0
//! qtest-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! qTest adapter: Source and Target contracts over the qTest Manager v3
//! REST API (`/api/v3` base path in the configured URL).
//!
//! qTest project and entity ids are numeric; canonical opaque ids are
//! parsed and rejected with a VALIDATION error when they are not numbers.
//! qTest does not allow creating field definitions through the API, so
//! `create_field_definition` fails as unsupported.

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
pub const PROVIDER_ID: &str = "qtest";
/// Human-readable provider name.
pub const PROVIDER_NAME: &str = "qTest Manager";

struct State {
    config: ProviderConfig,
    client: ResilientClient,
}

/// qTest adapter.
#[derive(Default)]
pub struct QTestProvider {
    state: Option<State>,
}

impl QTestProvider {
    /// An uninitialised adapter.
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
}

/// qTest ids are numeric; reject anything else before the wire.
fn numeric_id(kind: &str, value: &str) -> Result<i64, ProviderError> {
    value.trim().parse::<i64>().map_err(|_| {
        ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!("malformed {kind} id: {value:?}"),
        )
        .with_field_error(kind, "must be a numeric qTest id")
    })
}

#[async_trait]
impl Provider for QTestProvider {
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
            max_requests_per_second: 5,
            max_requests_per_minute: 300,
            max_concurrent_requests: 4,
            ..RateLimiterConfig::default()
        })
    }

    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), ProviderError> {
        let auth = AuthHandler::new();
        let client = config.build_client(PROVIDER_ID, &auth).await?;
        info!(target: "skb.qtest", base_url = %config.base_url, "adapter initialised");
        self.state = Some(State { config, client });
        Ok(())
    }

    async fn test_connection(
        &self,
        cancel: &CancelSignal,
    ) -> Result<ConnectionStatus, ProviderError> {
        let raw = self.state()?.client.get("projects", &[], cancel).await?;
        let count = mapper::page_items(&raw).len();
        Ok(ConnectionStatus {
            connected: true,
            detail: format!("{count} project(s) visible"),
        })
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
impl SourceProvider for QTestProvider {
    async fn projects(&self, cancel: &CancelSignal) -> Result<Vec<Project>, ProviderError> {
        let raw = self.state()?.client.get("projects", &[], cancel).await?;
        Ok(mapper::page_items(&raw).iter().map(mapper::to_project).collect())
    }

    async fn folders(
        &self,
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<Folder>, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let raw = self
            .state()?
            .client
            .get(&format!("projects/{project}/modules"), &[], cancel)
            .await
            .map_err(|e| enrich(e, "folders", &json!({"project": project})))?;
        let items = mapper::page_items(&raw);

        // Modules arrive flat; resolve parent paths in dependency order.
        let mut by_id: HashMap<String, Value> = HashMap::new();
        for item in &items {
            if let Some(id) = item.get("id").map(|v| v.to_string()) {
                by_id.insert(id.trim_matches('"').to_string(), item.clone());
            }
        }
        let mut resolved: HashMap<String, Folder> = HashMap::new();
        for _ in 0..=items.len() {
            let mut progressed = false;
            for (id, raw_folder) in &by_id {
                if resolved.contains_key(id) {
                    continue;
                }
                let parent = raw_folder
                    .get("parent_id")
                    .filter(|v| !v.is_null())
                    .map(|v| v.to_string().trim_matches('"').to_string());
                let folder = match &parent {
                    None => mapper::to_folder(raw_folder, None),
                    Some(pid) => match resolved.get(pid) {
                        Some(parent_folder) => {
                            mapper::to_folder(raw_folder, Some(&parent_folder.path))
                        }
                        None if by_id.contains_key(pid) => continue,
                        None => mapper::to_folder(raw_folder, None),
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
        Ok(folders)
    }

    async fn test_cases(
        &self,
        project_id: &str,
        query: &TestCaseQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCase>, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let state = self.state()?;
        let page = query.paging.page.max(1);
        let page_size = query.paging.page_size.max(1);
        let mut params = vec![
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        if let Some(folder) = &query.folder_id {
            params.push(("parentId", numeric_id("folder", folder)?.to_string()));
        }
        let raw = state
            .client
            .get(&format!("projects/{project}/test-cases"), &params, cancel)
            .await
            .map_err(|e| enrich(e, "test_cases", &json!({"project": project})))?;
        let mut items: Vec<TestCase> = mapper::page_items(&raw)
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
        project_id: &str,
        test_case_id: &str,
        cancel: &CancelSignal,
    ) -> Result<TestCase, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let case = numeric_id("test_case", test_case_id)?;
        let state = self.state()?;
        let raw = state
            .client
            .get(
                &format!("projects/{project}/test-cases/{case}"),
                &[("expandProps", "true".into())],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "test_case", &json!({"id": case})))?;
        let mut tc = mapper::to_test_case(&raw, &state.config.test_case_field_mappings);
        if tc.steps.is_empty() {
            tc.steps = state
                .client
                .get(
                    &format!("projects/{project}/test-cases/{case}/test-steps"),
                    &[],
                    cancel,
                )
                .await
                .map(|raw| mapper::to_steps(&raw))
                .unwrap_or_default();
        }
        Ok(tc)
    }

    async fn test_cycles(
        &self,
        project_id: &str,
        query: &PageQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCycle>, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &format!("projects/{project}/test-cycles"),
                &[
                    ("page", query.page.to_string()),
                    ("pageSize", query.page_size.to_string()),
                ],
                cancel,
            )
            .await?;
        Ok(Page {
            items: mapper::page_items(&raw).iter().map(mapper::to_cycle).collect(),
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
        let project = numeric_id("project", project_id)?;
        let cycle = numeric_id("cycle", cycle_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &format!("projects/{project}/test-logs"),
                &[
                    ("testCycleId", cycle.to_string()),
                    ("page", query.page.to_string()),
                    ("pageSize", query.page_size.to_string()),
                ],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "test_executions", &json!({"cycle": cycle})))?;
        Ok(Page {
            items: mapper::page_items(&raw)
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
        project_id: &str,
        attachment_id: &str,
        cancel: &CancelSignal,
    ) -> Result<AttachmentContent, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let attachment = numeric_id("attachment", attachment_id)?;
        let data = self
            .state()?
            .client
            .get_bytes(
                &format!("projects/{project}/attachments/{attachment}"),
                &[],
                cancel,
            )
            .await?;
        Ok(AttachmentContent {
            file_name: attachment.to_string(),
            content_type: skb_core::DEFAULT_CONTENT_TYPE.into(),
            data,
        })
    }

    async fn field_definitions(
        &self,
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<FieldDefinition>, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &format!("projects/{project}/settings/test-cases/fields"),
                &[],
                cancel,
            )
            .await?;
        Ok(mapper::to_field_definitions(&raw))
    }
}

#[async_trait]
impl TargetProvider for QTestProvider {
    async fn create_folder(
        &self,
        project_id: &str,
        folder: &Folder,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let mut body = json!({"name": folder.name});
        if let Some(parent) = &folder.parent_id {
            body["parent_id"] = json!(numeric_id("folder", parent)?);
        }
        let raw = self
            .state()?
            .client
            .post(&format!("projects/{project}/modules"), &body, cancel)
            .await?;
        created_id(&raw, "module")
    }

    async fn create_test_case(
        &self,
        project_id: &str,
        test_case: &TestCase,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let body = mapper::from_test_case(test_case);
        let raw = self
            .state()?
            .client
            .post(&format!("projects/{project}/test-cases"), &body, cancel)
            .await
            .map_err(|e| enrich(e, "create_test_case", &json!({"title": test_case.title})))?;
        created_id(&raw, "test case")
    }

    async fn create_test_steps(
        &self,
        project_id: &str,
        test_case_id: &str,
        steps: &[TestStep],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let project = numeric_id("project", project_id)?;
        let case = numeric_id("test_case", test_case_id)?;
        let body = mapper::from_steps(steps);
        self.state()?
            .client
            .post(
                &format!("projects/{project}/test-cases/{case}/test-steps"),
                &body,
                cancel,
            )
            .await?;
        Ok(())
    }

    async fn create_test_cycle(
        &self,
        project_id: &str,
        cycle: &TestCycle,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let body = mapper::from_cycle(cycle);
        let raw = self
            .state()?
            .client
            .post(&format!("projects/{project}/test-cycles"), &body, cancel)
            .await?;
        created_id(&raw, "test cycle")
    }

    async fn create_test_executions(
        &self,
        project_id: &str,
        executions: &[TestExecution],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let project = numeric_id("project", project_id)?;
        if executions.is_empty() {
            return Ok(());
        }
        // The batch endpoint takes every log in one call.
        let body = json!({
            "test_logs": executions
                .iter()
                .map(mapper::from_execution)
                .collect::<Vec<_>>(),
        });
        self.state()?
            .client
            .post(&format!("projects/{project}/auto-test-logs"), &body, cancel)
            .await
            .map_err(|e| enrich(e, "create_test_executions", &json!({"count": executions.len()})))?;
        Ok(())
    }

    async fn upload_attachment(
        &self,
        project_id: &str,
        owner: &AttachmentOwner,
        attachment: &Attachment,
        data: &[u8],
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let path = match owner {
            AttachmentOwner::TestCase(id) => format!(
                "projects/{project}/test-cases/{}/attachments",
                numeric_id("test_case", id)?
            ),
            AttachmentOwner::TestExecution(id) => format!(
                "projects/{project}/test-logs/{}/attachments",
                numeric_id("execution", id)?
            ),
        };
        let body = json!({
            "name": attachment.file_name,
            "content_type": attachment.content_type,
            "data": BASE64.encode(data),
        });
        let raw = self.state()?.client.post(&path, &body, cancel).await?;
        created_id(&raw, "attachment")
    }

    async fn create_field_definition(
        &self,
        _project_id: &str,
        definition: &FieldDefinition,
        _cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        // qTest field settings are admin-console only.
        Err(ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!(
                "qTest does not allow creating field definitions via API (field {:?})",
                definition.name
            ),
        )
        .with_context("unsupported", true))
    }
}

fn created_id(raw: &Value, entity: &str) -> Result<String, ProviderError> {
    raw.get("id")
        .map(|v| match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
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
    fn numeric_ids_are_required() {
        assert_eq!(numeric_id("project", " 42 ").unwrap(), 42);
        for bad in ["", "abc", "12a", "1.5"] {
            let err = numeric_id("project", bad).unwrap_err();
            assert_eq!(err.category, ErrorCategory::Validation, "{bad:?}");
        }
    }

    #[test]
    fn field_definition_writes_are_unsupported() {
        let caps = QTestProvider::new().capabilities();
        assert!(caps.can_be_target);
        // The declared capability list still includes field definitions as
        // readable; writes fail at call time with a validation error.
        assert!(caps.supports_custom_fields);
    }

    #[test]
    fn uninitialised_adapter_refuses_calls() {
        let adapter = QTestProvider::new();
        assert!(adapter.state().is_err());
    }
}
