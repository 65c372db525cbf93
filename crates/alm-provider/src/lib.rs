// SPDX-License-Identifier: MIT OR Apache-2.0
//! alm-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! HP ALM (Quality Center) adapter. Every collection travels in the
//! entity/Fields envelope under
//! `rest/domains/{domain}/projects/{project}/...`; the ALM domain comes
//! from the config's vendor bag (`domain`), and the canonical project id
//! is the ALM project name. Logins use the PASSWORD method against the
//! authentication point; the handler re-authenticates on session expiry.

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
pub const PROVIDER_ID: &str = "alm";
/// Human-readable provider name.
pub const PROVIDER_NAME: &str = "HP ALM";

struct State {
    config: ProviderConfig,
    client: ResilientClient,
    domain: String,
}

/// HP ALM adapter.
#[derive(Default)]
pub struct AlmProvider {
    state: Option<State>,
}

impl AlmProvider {
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

    fn project_path(&self, project: &str, tail: &str) -> Result<String, ProviderError> {
        let state = self.state()?;
        Ok(format!(
            "rest/domains/{}/projects/{}/{}",
            state.domain, project, tail
        ))
    }
}

fn require_name<'a>(kind: &str, value: &'a str) -> Result<&'a str, ProviderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains(char::is_whitespace) {
        return Err(ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!("malformed {kind}: {value:?}"),
        )
        .with_field_error(kind, "must be a non-empty name without spaces or slashes"));
    }
    Ok(trimmed)
}

fn numeric_id(kind: &str, value: &str) -> Result<i64, ProviderError> {
    value.trim().parse::<i64>().map_err(|_| {
        ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!("malformed {kind} id: {value:?}"),
        )
        .with_field_error(kind, "must be a numeric ALM id")
    })
}

fn start_index(query: &PageQuery) -> u32 {
    (query.page.max(1) - 1) * query.page_size + 1
}

#[async_trait]
impl Provider for AlmProvider {
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
            max_requests_per_minute: 250,
            max_concurrent_requests: 3,
            ..RateLimiterConfig::default()
        })
    }

    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), ProviderError> {
        let domain = config
            .extra_str("domain")
            .map(ToString::to_string)
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER_ID,
                    ErrorCategory::Validation,
                    "ALM config requires a `domain` entry",
                )
                .with_field_error("domain", "required")
            })?;
        let auth = AuthHandler::new();
        let client = config.build_client(PROVIDER_ID, &auth).await?;
        info!(target: "skb.alm", base_url = %config.base_url, domain = %domain, "adapter initialised");
        self.state = Some(State {
            config,
            client,
            domain,
        });
        Ok(())
    }

    async fn test_connection(
        &self,
        cancel: &CancelSignal,
    ) -> Result<ConnectionStatus, ProviderError> {
        self.state()?
            .client
            .get("rest/is-authenticated", &[], cancel)
            .await?;
        Ok(ConnectionStatus {
            connected: true,
            detail: "session authenticated".into(),
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
impl SourceProvider for AlmProvider {
    async fn projects(&self, cancel: &CancelSignal) -> Result<Vec<Project>, ProviderError> {
        let state = self.state()?;
        let raw = state
            .client
            .get(
                &format!("rest/domains/{}/projects", state.domain),
                &[],
                cancel,
            )
            .await?;
        let items = match raw.get("projects").and_then(Value::as_array) {
            Some(items) => items.clone(),
            None => mapper::entities(&raw),
        };
        Ok(items.iter().map(mapper::to_project).collect())
    }

    async fn folders(
        &self,
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<Folder>, ProviderError> {
        let project = require_name("project", project_id)?;
        let path = self.project_path(project, "test-folders")?;
        let raw = self
            .state()?
            .client
            .get(&path, &[("page-size", "200".into())], cancel)
            .await
            .map_err(|e| enrich(e, "folders", &json!({"project": project})))?;
        let items = mapper::entities(&raw);
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
        let project = require_name("project", project_id)?;
        let state = self.state()?;
        let path = self.project_path(project, "tests")?;
        let mut params = vec![
            ("page-size", query.paging.page_size.to_string()),
            ("start-index", start_index(&query.paging).to_string()),
        ];
        if let Some(folder) = &query.folder_id {
            params.push((
                "query",
                format!("{{parent-id[{}]}}", numeric_id("folder", folder)?),
            ));
        }
        let raw = state
            .client
            .get(&path, &params, cancel)
            .await
            .map_err(|e| enrich(e, "test_cases", &json!({"project": project})))?;
        let mut items: Vec<TestCase> = mapper::entities(&raw)
            .iter()
            .map(|v| mapper::to_test_case(v, &state.config.test_case_field_mappings))
            .collect();
        if let Some(status) = query.status {
            items.retain(|tc| tc.status == status);
        }
        Ok(Page {
            items,
            total: mapper::total_results(&raw),
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
        let project = require_name("project", project_id)?;
        let id = numeric_id("test_case", test_case_id)?;
        let state = self.state()?;
        let raw = state
            .client
            .get(&self.project_path(project, &format!("tests/{id}"))?, &[], cancel)
            .await
            .map_err(|e| enrich(e, "test_case", &json!({"id": id})))?;
        let mut tc = mapper::to_test_case(&raw, &state.config.test_case_field_mappings);
        let steps_raw = state
            .client
            .get(
                &self.project_path(project, "design-steps")?,
                &[
                    ("query", format!("{{parent-id[{id}]}}")),
                    ("page-size", "200".into()),
                ],
                cancel,
            )
            .await
            .unwrap_or(Value::Null);
        tc.steps = mapper::to_steps(&steps_raw);
        Ok(tc)
    }

    async fn test_cycles(
        &self,
        project_id: &str,
        query: &PageQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCycle>, ProviderError> {
        let project = require_name("project", project_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &self.project_path(project, "test-sets")?,
                &[
                    ("page-size", query.page_size.to_string()),
                    ("start-index", start_index(query).to_string()),
                ],
                cancel,
            )
            .await?;
        Ok(Page {
            items: mapper::entities(&raw).iter().map(mapper::to_cycle).collect(),
            total: mapper::total_results(&raw),
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
        let project = require_name("project", project_id)?;
        let cycle = numeric_id("cycle", cycle_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &self.project_path(project, "runs")?,
                &[
                    ("query", format!("{{cycle-id[{cycle}]}}")),
                    ("page-size", query.page_size.to_string()),
                    ("start-index", start_index(query).to_string()),
                ],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "test_executions", &json!({"cycle": cycle})))?;
        Ok(Page {
            items: mapper::entities(&raw)
                .iter()
                .map(mapper::to_execution)
                .collect(),
            total: mapper::total_results(&raw),
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
        let project = require_name("project", project_id)?;
        let id = numeric_id("attachment", attachment_id)?;
        let data = self
            .state()?
            .client
            .get_bytes(
                &self.project_path(project, &format!("attachments/{id}"))?,
                &[("alt", "application/octet-stream".into())],
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
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<FieldDefinition>, ProviderError> {
        let project = require_name("project", project_id)?;
        let raw = self
            .state()?
            .client
            .get(
                &self.project_path(project, "customization/entities/test/fields")?,
                &[],
                cancel,
            )
            .await?;
        Ok(mapper::to_field_definitions(&raw))
    }
}

#[async_trait]
impl TargetProvider for AlmProvider {
    async fn create_folder(
        &self,
        project_id: &str,
        folder: &Folder,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_name("project", project_id)?;
        let mut fields = vec![("name", folder.name.clone())];
        if let Some(parent) = &folder.parent_id {
            fields.push(("parent-id", numeric_id("folder", parent)?.to_string()));
        }
        let body = mapper::entity("test-folder", &fields);
        let raw = self
            .state()?
            .client
            .post(&self.project_path(project, "test-folders")?, &body, cancel)
            .await?;
        entity_id(&raw, "test folder")
    }

    async fn create_test_case(
        &self,
        project_id: &str,
        test_case: &TestCase,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_name("project", project_id)?;
        let body = mapper::from_test_case(test_case, "MANUAL");
        let raw = self
            .state()?
            .client
            .post(&self.project_path(project, "tests")?, &body, cancel)
            .await
            .map_err(|e| enrich(e, "create_test_case", &json!({"title": test_case.title})))?;
        entity_id(&raw, "test")
    }

    async fn create_test_steps(
        &self,
        project_id: &str,
        test_case_id: &str,
        steps: &[TestStep],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let project = require_name("project", project_id)?;
        let test = numeric_id("test_case", test_case_id)?.to_string();
        for step in steps {
            let body = mapper::from_step(&test, step);
            self.state()?
                .client
                .post(&self.project_path(project, "design-steps")?, &body, cancel)
                .await
                .map_err(|e| enrich(e, "create_test_steps", &json!({"sequence": step.sequence})))?;
        }
        Ok(())
    }

    async fn create_test_cycle(
        &self,
        project_id: &str,
        cycle: &TestCycle,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = require_name("project", project_id)?;
        let mut fields = vec![
            ("name", cycle.name.clone()),
            ("subtype-id", "hp.qc.test-set.default".to_string()),
        ];
        if !cycle.description.is_empty() {
            fields.push(("description", cycle.description.clone()));
        }
        let body = mapper::entity("test-set", &fields);
        let raw = self
            .state()?
            .client
            .post(&self.project_path(project, "test-sets")?, &body, cancel)
            .await?;
        entity_id(&raw, "test set")
    }

    async fn create_test_executions(
        &self,
        project_id: &str,
        executions: &[TestExecution],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let project = require_name("project", project_id)?;
        for execution in executions {
            let body = mapper::from_execution(execution);
            self.state()?
                .client
                .post(&self.project_path(project, "runs")?, &body, cancel)
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
        let project = require_name("project", project_id)?;
        let (entity_type, owner_id) = match owner {
            AttachmentOwner::TestCase(id) => ("tests", numeric_id("test_case", id)?),
            AttachmentOwner::TestExecution(id) => ("runs", numeric_id("execution", id)?),
        };
        let body = json!({
            "name": attachment.file_name,
            "content-type": attachment.content_type,
            "data": BASE64.encode(data),
        });
        let raw = self
            .state()?
            .client
            .post(
                &self.project_path(project, &format!("{entity_type}/{owner_id}/attachments"))?,
                &body,
                cancel,
            )
            .await?;
        entity_id(&raw, "attachment").or_else(|_| Ok(attachment.file_name.clone()))
    }

    async fn create_field_definition(
        &self,
        _project_id: &str,
        definition: &FieldDefinition,
        _cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        // Field customization is project-admin territory in ALM.
        Err(ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!(
                "ALM does not allow creating field definitions via REST (field {:?})",
                definition.name
            ),
        )
        .with_context("unsupported", true))
    }
}

/// Pull the created id out of an entity response (entity envelope or bare
/// entity).
fn entity_id(raw: &Value, entity: &str) -> Result<String, ProviderError> {
    let direct = mapper::field_value(raw, "id").map(ToString::to_string);
    let from_envelope = mapper::entities(raw)
        .first()
        .and_then(|e| mapper::field_value(e, "id").map(ToString::to_string));
    direct.or(from_envelope).ok_or_else(|| {
        ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Unknown,
            format!("create {entity} response carried no id"),
        )
    })
}
