// SPDX-License-Identifier: MIT OR Apache-2.0
//! visure-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Visure adapter. Visure models tests as requirement-linked items behind
//! a plain REST surface; the adapter reads everything and writes folders,
//! test cases (steps travel inline), cycles, runs, attachments, and,
//! unlike most vendors, custom-attribute definitions.

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
use tracing::info;

/// Stable provider id.
pub const PROVIDER_ID: &str = "visure";
/// Human-readable provider name.
pub const PROVIDER_NAME: &str = "Visure";

struct State {
    config: ProviderConfig,
    client: ResilientClient,
}

/// Visure adapter.
#[derive(Default)]
pub struct VisureProvider {
    state: Option<State>,
}

impl VisureProvider {
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

fn require_id<'a>(kind: &str, value: &'a str) -> Result<&'a str, ProviderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains(char::is_whitespace) {
        return Err(ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!("malformed {kind} id: {value:?}"),
        )
        .with_field_error(kind, "must be a non-empty id without spaces or slashes"));
    }
    Ok(trimmed)
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

#[async_trait]
impl Provider for VisureProvider {
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
            max_requests_per_second: 6,
            max_requests_per_minute: 300,
            max_concurrent_requests: 4,
            ..RateLimiterConfig::default()
        })
    }

    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), ProviderError> {
        let auth = AuthHandler::new();
        let client = config.build_client(PROVIDER_ID, &auth).await?;
        info!(target: "skb.visure", base_url = %config.base_url, "adapter initialised");
        self.state = Some(State { config, client });
        Ok(())
    }

    async fn test_connection(
        &self,
        cancel: &CancelSignal,
    ) -> Result<ConnectionStatus, ProviderError> {
        let raw = self.state()?.client.get("projects", &[], cancel).await?;
        Ok(ConnectionStatus {
            connected: true,
            detail: format!("{} project(s) visible", mapper::page_items(&raw).len()),
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
impl SourceProvider for VisureProvider {
    async fn projects(&self, cancel: &CancelSignal) -> Result<Vec<Project>, ProviderError> {
        let raw = self.state()?.client.get("projects", &[], cancel).await?;
        Ok(mapper::page_items(&raw)
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
            .state()?
            .client
            .get(&format!("projects/{project}/folders"), &[], cancel)
            .await
            .map_err(|e| enrich(e, "folders", &json!({"project": project})))?;
        let items = mapper::page_items(&raw);
        let mut resolved: Vec<Folder> = Vec::new();
        let mut pending: Vec<&Value> = items.iter().collect();
        let mut passes = 0;
        while !pending.is_empty() && passes <= items.len() {
            passes += 1;
            let mut next = Vec::new();
            for raw_folder in pending {
                let draft = mapper::to_folder(raw_folder, None);
                match &draft.parent_id {
                    None => resolved.push(draft),
                    Some(parent_id) => match resolved.iter().find(|f| &f.id == parent_id) {
                        Some(parent) => {
                            let parent_path = parent.path.clone();
                            resolved.push(mapper::to_folder(raw_folder, Some(&parent_path)));
                        }
                        None => next.push(raw_folder),
                    },
                }
            }
            if next.len() == items.len() {
                break;
            }
            pending = next;
        }
        resolved.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(resolved)
    }

    async fn test_cases(
        &self,
        project_id: &str,
        query: &TestCaseQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCase>, ProviderError> {
        let project = require_id("project", project_id)?;
        let state = self.state()?;
        let mut params = vec![
            ("page", query.paging.page.to_string()),
            ("pageSize", query.paging.page_size.to_string()),
        ];
        if let Some(folder) = &query.folder_id {
            params.push(("folderId", require_id("folder", folder)?.to_string()));
        }
        if let Some(status) = query.status {
            params.push(("status", mapper::from_canonical_status(status).to_string()));
        }
        let raw = state
            .client
            .get(&format!("projects/{project}/testcases"), &params, cancel)
            .await
            .map_err(|e| enrich(e, "test_cases", &json!({"project": project})))?;
        Ok(Page {
            items: mapper::page_items(&raw)
                .iter()
                .map(|v| mapper::to_test_case(v, &state.config.test_case_field_mappings))
                .collect(),
            total: mapper::page_total(&raw),
            page: query.paging.page,
            page_size: query.paging.page_size,
        })
    }

    async fn test_case(
        &self,
        project_id: &str,
        test_case_id: &str,
        cancel: &CancelSignal,
    ) -> Result<TestCase, ProviderError> {
        let project = require_id("project", project_id)?;
        let id = require_id("test_case", test_case_id)?;
        let state = self.state()?;
        let raw = state
            .client
            .get(
                &format!("projects/{project}/testcases/{id}"),
                &[],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "test_case", &json!({"id": id})))?;
        Ok(mapper::to_test_case(&raw, &state.config.test_case_field_mappings))
    }

    async fn test_cycles(
        &self,
        project_id: &str,
        query: &PageQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCycle>, ProviderError> {
        let project = require_id("project", project_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &format!("projects/{project}/testcycles"),
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
        let project = require_id("project", project_id)?;
        let cycle = require_id("cycle", cycle_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &format!("projects/{project}/testcycles/{cycle}/runs"),
                &[
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
        _project_id: &str,
        attachment_id: &str,
        cancel: &CancelSignal,
    ) -> Result<AttachmentContent, ProviderError> {
        let id = require_id("attachment", attachment_id)?;
        let data = self
            .state()?
            .client
            .get_bytes(&format!("attachments/{id}/content"), &[], cancel)
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
            .state()?
            .client
            .get(&format!("projects/{project}/attributes"), &[], cancel)
            .await?;
        Ok(mapper::to_field_definitions(&raw))
    }
}

#[async_trait]
impl TargetProvider for VisureProvider {
    async fn create_folder(
        &self,
        project_id: &str,
        folder: &Folder,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_id("project", project_id)?;
        let mut body = json!({"name": folder.name});
        if let Some(parent) = &folder.parent_id {
            body["parentId"] = json!(require_id("folder", parent)?);
        }
        let raw = self
            .state()?
            .client
            .post(&format!("projects/{project}/folders"), &body, cancel)
            .await?;
        created_id(&raw, "folder")
    }

    async fn create_test_case(
        &self,
        project_id: &str,
        test_case: &TestCase,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_id("project", project_id)?;
        let body = mapper::from_test_case(test_case);
        let raw = self
            .state()?
            .client
            .post(&format!("projects/{project}/testcases"), &body, cancel)
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
        let project = require_id("project", project_id)?;
        let id = require_id("test_case", test_case_id)?;
        let body = json!({"steps": mapper::from_steps(steps)});
        self.state()?
            .client
            .put(
                &format!("projects/{project}/testcases/{id}/steps"),
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
        let project = require_id("project", project_id)?;
        let mut body = json!({"name": cycle.name});
        if !cycle.description.is_empty() {
            body["description"] = json!(cycle.description);
        }
        if let Some(env) = &cycle.environment {
            body["environment"] = json!(env);
        }
        let raw = self
            .state()?
            .client
            .post(&format!("projects/{project}/testcycles"), &body, cancel)
            .await?;
        created_id(&raw, "test cycle")
    }

    async fn create_test_executions(
        &self,
        project_id: &str,
        executions: &[TestExecution],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let project = require_id("project", project_id)?;
        for execution in executions {
            let cycle = execution.cycle_id.as_deref().ok_or_else(|| {
                ProviderError::new(
                    PROVIDER_ID,
                    ErrorCategory::Validation,
                    format!("execution {:?} has no cycle id", execution.id),
                )
            })?;
            let body = mapper::from_execution(execution);
            self.state()?
                .client
                .post(
                    &format!("projects/{project}/testcycles/{cycle}/runs"),
                    &body,
                    cancel,
                )
                .await
                .map_err(|e| {
                    enrich(e, "create_test_executions", &json!({"execution": execution.id}))
                })?;
        }
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
        let project = require_id("project", project_id)?;
        let path = match owner {
            AttachmentOwner::TestCase(id) => format!(
                "projects/{project}/testcases/{}/attachments",
                require_id("test_case", id)?
            ),
            AttachmentOwner::TestExecution(id) => format!(
                "projects/{project}/runs/{}/attachments",
                require_id("execution", id)?
            ),
        };
        let body = json!({
            "fileName": attachment.file_name,
            "contentType": attachment.content_type,
            "data": BASE64.encode(data),
        });
        let raw = self.state()?.client.post(&path, &body, cancel).await?;
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
            "name": definition.name,
            "type": serde_json::to_value(definition.field_type)
                .unwrap_or(Value::String("CUSTOM".into())),
            "required": definition.required,
            "options": definition.allowed_values,
        });
        let raw = self
            .state()?
            .client
            .post(&format!("projects/{project}/attributes"), &body, cancel)
            .await?;
        created_id(&raw, "attribute")
    }
}
