// SPDX-License-Identifier: MIT OR Apache-2.0
//! azure-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Azure DevOps adapter: test cases are `Test Case` work items fetched
//! through WIQL + batch work-item reads and written as JSON-Patch
//! documents; steps travel as embedded HTML
//! (see [`steps`]); executions are test-run results.
//!
//! The configured base URL is the organisation URL
//! (`https://dev.azure.com/{org}`); the team project lives in the
//! canonical `project_id` parameter. A `personal_access_token` entry in
//! the config's vendor bag is turned into the `Basic` auth header Azure
//! expects.

/// Pure payload mapping functions and enum tables.
pub mod mapper;
/// Embedded steps-HTML codec.
pub mod steps;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use skb_auth::{AuthHandler, Credentials};
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
pub const PROVIDER_ID: &str = "azure";
/// Human-readable provider name.
pub const PROVIDER_NAME: &str = "Azure DevOps";
/// REST API version pinned on every call.
pub const API_VERSION: &str = "7.0";

struct State {
    config: ProviderConfig,
    client: ResilientClient,
}

/// Azure DevOps adapter.
#[derive(Default)]
pub struct AzureProvider {
    state: Option<State>,
}

impl AzureProvider {
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

/// Team-project names may not be empty or carry path separators.
fn require_project(value: &str) -> Result<&str, ProviderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!("malformed project name: {value:?}"),
        )
        .with_field_error("project", "must be a non-empty team project name"));
    }
    Ok(trimmed)
}

/// Work-item and run ids are numeric.
fn numeric_id(kind: &str, value: &str) -> Result<i64, ProviderError> {
    value.trim().parse::<i64>().map_err(|_| {
        ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!("malformed {kind} id: {value:?}"),
        )
        .with_field_error(kind, "must be a numeric Azure DevOps id")
    })
}

fn api_version_param() -> (&'static str, String) {
    ("api-version", API_VERSION.to_string())
}

#[async_trait]
impl Provider for AzureProvider {
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
            max_requests_per_second: 8,
            max_requests_per_minute: 400,
            max_concurrent_requests: 6,
            ..RateLimiterConfig::default()
        })
    }

    async fn initialize(&mut self, mut config: ProviderConfig) -> Result<(), ProviderError> {
        // A PAT in the vendor bag becomes the Basic header Azure expects;
        // explicit credentials in the config win otherwise.
        if let Some(pat) = config.extra_str("personal_access_token") {
            let encoded = BASE64.encode(format!(":{pat}"));
            config.authentication.credentials = Credentials::Token {
                token: encoded,
                header_name: None,
                prefix: Some("Basic ".into()),
            };
        }
        let auth = AuthHandler::new();
        let client = config.build_client(PROVIDER_ID, &auth).await?;
        info!(target: "skb.azure", base_url = %config.base_url, "adapter initialised");
        self.state = Some(State { config, client });
        Ok(())
    }

    async fn test_connection(
        &self,
        cancel: &CancelSignal,
    ) -> Result<ConnectionStatus, ProviderError> {
        let raw = self
            .state()?
            .client
            .get("_apis/projects", &[api_version_param()], cancel)
            .await?;
        Ok(ConnectionStatus {
            connected: true,
            detail: format!("{} project(s) visible", mapper::collection_count(&raw)),
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
impl SourceProvider for AzureProvider {
    async fn projects(&self, cancel: &CancelSignal) -> Result<Vec<Project>, ProviderError> {
        let raw = self
            .state()?
            .client
            .get("_apis/projects", &[api_version_param()], cancel)
            .await?;
        Ok(mapper::collection_values(&raw)
            .iter()
            .map(mapper::to_project)
            .collect())
    }

    async fn folders(
        &self,
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<Folder>, ProviderError> {
        let project = require_project(project_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &format!("{project}/_apis/wit/classificationnodes/Areas"),
                &[api_version_param(), ("$depth", "10".into())],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "folders", &json!({"project": project})))?;
        Ok(mapper::to_folders(&raw))
    }

    async fn test_cases(
        &self,
        project_id: &str,
        query: &TestCaseQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCase>, ProviderError> {
        let project = require_project(project_id)?;
        let state = self.state()?;

        // WIQL gives the full matching id set; the page is carved locally.
        let mut wiql = format!(
            "SELECT [System.Id] FROM WorkItems \
             WHERE [System.TeamProject] = '{project}' \
             AND [System.WorkItemType] = 'Test Case'"
        );
        if let Some(folder) = &query.folder_id {
            let area = folder.trim_start_matches('/').replace('/', "\\");
            wiql.push_str(&format!(" AND [System.AreaPath] UNDER '{area}'"));
        }
        wiql.push_str(" ORDER BY [System.Id]");
        let raw = state
            .client
            .post(
                &format!("{project}/_apis/wit/wiql?api-version={API_VERSION}"),
                &json!({"query": wiql}),
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "test_cases", &json!({"project": project})))?;
        let all_ids: Vec<i64> = raw
            .get("workItems")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|wi| wi.get("id").and_then(Value::as_i64))
                    .collect()
            })
            .unwrap_or_default();

        let page = query.paging.page.max(1);
        let page_size = query.paging.page_size.max(1);
        let start = query
            .start_at
            .unwrap_or((page - 1).saturating_mul(page_size)) as usize;
        let slice: Vec<i64> = all_ids
            .iter()
            .skip(start)
            .take(page_size as usize)
            .copied()
            .collect();

        let mut items = Vec::with_capacity(slice.len());
        if !slice.is_empty() {
            let ids = slice
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let raw = state
                .client
                .get(
                    "_apis/wit/workitems",
                    &[
                        api_version_param(),
                        ("ids", ids),
                        ("$expand", "fields".into()),
                    ],
                    cancel,
                )
                .await?;
            items = mapper::collection_values(&raw)
                .iter()
                .map(|wi| mapper::to_test_case(wi, &state.config.test_case_field_mappings))
                .collect();
            if let Some(status) = query.status {
                items.retain(|tc| tc.status == status);
            }
        }
        Ok(Page {
            items,
            total: all_ids.len() as u64,
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
        let id = numeric_id("test_case", test_case_id)?;
        let state = self.state()?;
        let raw = state
            .client
            .get(
                &format!("_apis/wit/workitems/{id}"),
                &[api_version_param(), ("$expand", "all".into())],
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
        let project = require_project(project_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &format!("{project}/_apis/test/runs"),
                &[
                    api_version_param(),
                    ("$top", query.page_size.to_string()),
                    (
                        "$skip",
                        ((query.page.max(1) - 1) * query.page_size).to_string(),
                    ),
                ],
                cancel,
            )
            .await?;
        let items = mapper::collection_values(&raw)
            .iter()
            .map(|run| {
                let id = run
                    .get("id")
                    .map(|v| match v {
                        Value::Number(n) => n.to_string(),
                        Value::String(s) => s.clone(),
                        _ => String::new(),
                    })
                    .unwrap_or_default();
                let mut cycle = TestCycle::new(
                    id,
                    run.get("name").and_then(Value::as_str).unwrap_or_default(),
                );
                cycle.status = run
                    .get("state")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                cycle
            })
            .collect();
        Ok(Page {
            items,
            total: mapper::collection_count(&raw),
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
        let project = require_project(project_id)?;
        let run = numeric_id("run", cycle_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &format!("{project}/_apis/test/runs/{run}/results"),
                &[
                    api_version_param(),
                    ("$top", query.page_size.to_string()),
                    (
                        "$skip",
                        ((query.page.max(1) - 1) * query.page_size).to_string(),
                    ),
                ],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "test_executions", &json!({"run": run})))?;
        let run_id = run.to_string();
        Ok(Page {
            items: mapper::collection_values(&raw)
                .iter()
                .map(|r| mapper::to_execution(r, Some(&run_id)))
                .collect(),
            total: mapper::collection_count(&raw),
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
        let id = attachment_id.trim();
        if id.is_empty() {
            return Err(ProviderError::new(
                PROVIDER_ID,
                ErrorCategory::Validation,
                "attachment id must not be empty",
            ));
        }
        let data = self
            .state()?
            .client
            .get_bytes(
                &format!("_apis/wit/attachments/{id}"),
                &[api_version_param()],
                cancel,
            )
            .await?;
        Ok(AttachmentContent {
            file_name: id.to_string(),
            content_type: skb_core::DEFAULT_CONTENT_TYPE.into(),
            data,
        })
    }

    async fn field_definitions(
        &self,
        _project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<FieldDefinition>, ProviderError> {
        let raw = self
            .state()?
            .client
            .get("_apis/wit/fields", &[api_version_param()], cancel)
            .await?;
        Ok(mapper::to_field_definitions(&raw))
    }
}

#[async_trait]
impl TargetProvider for AzureProvider {
    async fn create_folder(
        &self,
        project_id: &str,
        folder: &Folder,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_project(project_id)?;
        // Areas are created under their parent path segment.
        let parent_path = folder
            .path
            .trim_start_matches('/')
            .rsplit_once('/')
            .map(|(parent, _)| parent.to_string())
            .unwrap_or_default();
        let path = if parent_path.is_empty() {
            format!("{project}/_apis/wit/classificationnodes/Areas?api-version={API_VERSION}")
        } else {
            format!(
                "{project}/_apis/wit/classificationnodes/Areas/{parent_path}?api-version={API_VERSION}"
            )
        };
        let raw = self
            .state()?
            .client
            .post(&path, &json!({"name": folder.name}), cancel)
            .await?;
        Ok(raw
            .get("id")
            .map(|v| match v {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| folder.name.clone()))
    }

    async fn create_test_case(
        &self,
        project_id: &str,
        test_case: &TestCase,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_project(project_id)?;
        let patch = mapper::from_test_case(test_case);
        let raw = self
            .state()?
            .client
            .post(
                &format!("{project}/_apis/wit/workitems/$Test%20Case?api-version={API_VERSION}"),
                &patch,
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "create_test_case", &json!({"title": test_case.title})))?;
        raw.get("id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER_ID,
                    ErrorCategory::Unknown,
                    "work item create response carried no id",
                )
            })
    }

    async fn create_test_steps(
        &self,
        _project_id: &str,
        test_case_id: &str,
        steps: &[TestStep],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let id = numeric_id("test_case", test_case_id)?;
        let patch = json!([{
            "op": "add",
            "path": format!("/fields/{}", mapper::FIELD_STEPS),
            "value": steps::to_steps_html(steps),
        }]);
        self.state()?
            .client
            .patch(
                &format!("_apis/wit/workitems/{id}?api-version={API_VERSION}"),
                &patch,
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
        let project = require_project(project_id)?;
        let mut body = json!({"name": cycle.name, "automated": false});
        if let Some(start) = cycle.planned_start {
            body["startDate"] = json!(start.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
        }
        if let Some(end) = cycle.planned_end {
            body["completeDate"] = json!(end.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
        }
        let raw = self
            .state()?
            .client
            .post(
                &format!("{project}/_apis/test/runs?api-version={API_VERSION}"),
                &body,
                cancel,
            )
            .await?;
        raw.get("id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER_ID,
                    ErrorCategory::Unknown,
                    "test run create response carried no id",
                )
            })
    }

    async fn create_test_executions(
        &self,
        project_id: &str,
        executions: &[TestExecution],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let project = require_project(project_id)?;
        // Results post per run; group by the canonical cycle id.
        let mut by_run: std::collections::BTreeMap<String, Vec<&TestExecution>> =
            std::collections::BTreeMap::new();
        for execution in executions {
            let run = execution.cycle_id.clone().ok_or_else(|| {
                ProviderError::new(
                    PROVIDER_ID,
                    ErrorCategory::Validation,
                    format!("execution {:?} has no run (cycle) id", execution.id),
                )
            })?;
            by_run.entry(run).or_default().push(execution);
        }
        for (run, group) in by_run {
            let run_id = numeric_id("run", &run)?;
            let body = Value::Array(group.iter().map(|e| mapper::from_execution(e)).collect());
            self.state()?
                .client
                .post(
                    &format!(
                        "{project}/_apis/test/runs/{run_id}/results?api-version={API_VERSION}"
                    ),
                    &body,
                    cancel,
                )
                .await
                .map_err(|e| enrich(e, "create_test_executions", &json!({"run": run_id})))?;
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
        let body = json!({
            "fileName": attachment.file_name,
            "contentType": attachment.content_type,
            "content": BASE64.encode(data),
        });
        let raw = self
            .state()?
            .client
            .post(
                &format!("_apis/wit/attachments?api-version={API_VERSION}"),
                &body,
                cancel,
            )
            .await?;
        let attachment_url = raw
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let attachment_id = raw
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(|| attachment_url.clone());

        // Link the uploaded blob to its owning work item.
        let owner_id = match owner {
            AttachmentOwner::TestCase(id) => numeric_id("test_case", id)?,
            AttachmentOwner::TestExecution(id) => numeric_id("execution", id)?,
        };
        let patch = json!([{
            "op": "add",
            "path": "/relations/-",
            "value": {"rel": "AttachedFile", "url": attachment_url},
        }]);
        self.state()?
            .client
            .patch(
                &format!("_apis/wit/workitems/{owner_id}?api-version={API_VERSION}"),
                &patch,
                cancel,
            )
            .await?;
        Ok(attachment_id)
    }

    async fn create_field_definition(
        &self,
        _project_id: &str,
        definition: &FieldDefinition,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let type_name = match definition.field_type {
            skb_core::FieldType::String | skb_core::FieldType::Enum => "string",
            skb_core::FieldType::Text => "html",
            skb_core::FieldType::Number => "double",
            skb_core::FieldType::Integer => "integer",
            skb_core::FieldType::Date | skb_core::FieldType::DateTime => "dateTime",
            skb_core::FieldType::Boolean => "boolean",
            skb_core::FieldType::User | skb_core::FieldType::MultiUser => "identity",
            _ => "string",
        };
        let reference_name = format!(
            "Custom.{}",
            definition.name.replace(char::is_whitespace, "")
        );
        let body = json!({
            "name": definition.name,
            "referenceName": reference_name,
            "type": type_name,
            "usage": "workItem",
        });
        let raw = self
            .state()?
            .client
            .post(
                &format!("_apis/wit/fields?api-version={API_VERSION}"),
                &body,
                cancel,
            )
            .await?;
        Ok(raw
            .get("referenceName")
            .and_then(Value::as_str)
            .unwrap_or(&reference_name)
            .to_string())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_validation() {
        assert!(require_project("Fabrikam").is_ok());
        for bad in ["", "a/b", "a\\b", "  "] {
            assert!(require_project(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn numeric_id_validation() {
        assert_eq!(numeric_id("test_case", "42").unwrap(), 42);
        assert!(numeric_id("test_case", "TC-42").is_err());
    }

    #[test]
    fn capabilities_are_full_read_write() {
        let caps = AzureProvider::new().capabilities();
        assert!(caps.can_be_source && caps.can_be_target);
        assert!(caps.supports_hierarchy);
    }
}
