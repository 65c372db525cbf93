// SPDX-License-Identifier: MIT OR Apache-2.0
//! rally-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Rally (Broadcom) adapter over WSAPI v2. The canonical project id is the
//! Rally project ObjectID; entity ids are ObjectIDs carried as opaque
//! strings. Rally authenticates with an API key in the `zsessionid`
//! header, which the config expresses as TOKEN credentials with a custom
//! header name.

/// Pure payload mapping functions and enum tables.
pub mod mapper;

use async_trait::async_trait;
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
pub const PROVIDER_ID: &str = "rally";
/// Human-readable provider name.
pub const PROVIDER_NAME: &str = "Rally";

struct State {
    config: ProviderConfig,
    client: ResilientClient,
}

/// Rally adapter.
#[derive(Default)]
pub struct RallyProvider {
    state: Option<State>,
}

impl RallyProvider {
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

fn numeric_id(kind: &str, value: &str) -> Result<i64, ProviderError> {
    value.trim().parse::<i64>().map_err(|_| {
        ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!("malformed {kind} id: {value:?}"),
        )
        .with_field_error(kind, "must be a numeric Rally ObjectID")
    })
}

fn paging_params(query: &PageQuery) -> [(&'static str, String); 2] {
    let start = (query.page.max(1) - 1) * query.page_size + 1;
    [
        ("pagesize", query.page_size.to_string()),
        ("start", start.to_string()),
    ]
}

#[async_trait]
impl Provider for RallyProvider {
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
            max_requests_per_second: 4,
            max_requests_per_minute: 200,
            max_concurrent_requests: 3,
            ..RateLimiterConfig::default()
        })
    }

    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), ProviderError> {
        let auth = AuthHandler::new();
        let client = config.build_client(PROVIDER_ID, &auth).await?;
        info!(target: "skb.rally", base_url = %config.base_url, "adapter initialised");
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
            .get("subscription", &[], cancel)
            .await?;
        let name = raw
            .get("Subscription")
            .and_then(|s| s.get("Name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        Ok(ConnectionStatus {
            connected: true,
            detail: format!("subscription {name}"),
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
impl SourceProvider for RallyProvider {
    async fn projects(&self, cancel: &CancelSignal) -> Result<Vec<Project>, ProviderError> {
        let raw = self
            .state()?
            .client
            .get("project", &[("pagesize", "200".into())], cancel)
            .await?;
        Ok(mapper::query_results(&raw)
            .iter()
            .map(mapper::to_project)
            .collect())
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
            .get(
                "testfolder",
                &[
                    ("query", format!("(Project = /project/{project})")),
                    ("pagesize", "200".into()),
                ],
                cancel,
            )
            .await
            .map_err(|e| enrich(e, "folders", &json!({"project": project})))?;
        // Resolve paths parents-first over the flat result.
        let items = mapper::query_results(&raw);
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
                    Some(parent_id) => {
                        match resolved.iter().find(|f| &f.id == parent_id) {
                            Some(parent) => {
                                let parent_path = parent.path.clone();
                                resolved.push(mapper::to_folder(raw_folder, Some(&parent_path)));
                            }
                            None => next.push(raw_folder),
                        }
                    }
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
        let project = numeric_id("project", project_id)?;
        let state = self.state()?;
        let mut params = vec![
            ("query", format!("(Project = /project/{project})")),
            ("fetch", "true".to_string()),
        ];
        if let Some(folder) = &query.folder_id {
            let folder = numeric_id("folder", folder)?;
            params[0] = (
                "query",
                format!("((Project = /project/{project}) AND (TestFolder = /testfolder/{folder}))"),
            );
        }
        for (key, value) in paging_params(&query.paging) {
            params.push((key, value));
        }
        let raw = state
            .client
            .get("testcase", &params, cancel)
            .await
            .map_err(|e| enrich(e, "test_cases", &json!({"project": project})))?;
        let mut items: Vec<TestCase> = mapper::query_results(&raw)
            .iter()
            .map(|v| mapper::to_test_case(v, &state.config.test_case_field_mappings))
            .collect();
        if let Some(status) = query.status {
            items.retain(|tc| tc.status == status);
        }
        Ok(Page {
            items,
            total: mapper::query_total(&raw),
            page: query.paging.page,
            page_size: query.paging.page_size,
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
            .get(&format!("testcase/{id}"), &[], cancel)
            .await
            .map_err(|e| enrich(e, "test_case", &json!({"id": id})))?;
        let object = raw.get("TestCase").unwrap_or(&raw);
        let mut tc = mapper::to_test_case(object, &state.config.test_case_field_mappings);
        let steps_raw = state
            .client
            .get(
                "testcasestep",
                &[
                    ("query", format!("(TestCase = /testcase/{id})")),
                    ("pagesize", "200".into()),
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
        let project = numeric_id("project", project_id)?;
        let mut params = vec![("query", format!("(Project = /project/{project})"))];
        for (key, value) in paging_params(query) {
            params.push((key, value));
        }
        let raw = self.state()?.client.get("testset", &params, cancel).await?;
        Ok(Page {
            items: mapper::query_results(&raw)
                .iter()
                .map(mapper::to_cycle)
                .collect(),
            total: mapper::query_total(&raw),
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn test_executions(
        &self,
        _project_id: &str,
        cycle_id: &str,
        query: &PageQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestExecution>, ProviderError> {
        let cycle = numeric_id("cycle", cycle_id)?;
        let mut params = vec![("query", format!("(TestSet = /testset/{cycle})"))];
        for (key, value) in paging_params(query) {
            params.push((key, value));
        }
        let raw = self
            .state()?
            .client
            .get("testcaseresult", &params, cancel)
            .await
            .map_err(|e| enrich(e, "test_executions", &json!({"cycle": cycle})))?;
        Ok(Page {
            items: mapper::query_results(&raw)
                .iter()
                .map(mapper::to_execution)
                .collect(),
            total: mapper::query_total(&raw),
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
        let id = numeric_id("attachment", attachment_id)?;
        let data = self
            .state()?
            .client
            .get_bytes(&format!("attachmentcontent/{id}"), &[], cancel)
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
            .get(
                "typedefinition/testcase/attributes",
                &[("pagesize", "200".into())],
                cancel,
            )
            .await?;
        Ok(mapper::to_field_definitions(&raw))
    }
}

#[async_trait]
impl TargetProvider for RallyProvider {
    async fn create_folder(
        &self,
        project_id: &str,
        folder: &Folder,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let mut body = json!({
            "TestFolder": {
                "Name": folder.name,
                "Project": {"_ref": format!("/project/{project}")},
            }
        });
        if let Some(parent) = &folder.parent_id {
            body["TestFolder"]["Parent"] =
                json!({"_ref": format!("/testfolder/{}", numeric_id("folder", parent)?)});
        }
        let raw = self
            .state()?
            .client
            .post("testfolder/create", &body, cancel)
            .await?;
        mapper::created_object_id(&raw).ok_or_else(|| no_created_id("test folder"))
    }

    async fn create_test_case(
        &self,
        project_id: &str,
        test_case: &TestCase,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        let project = numeric_id("project", project_id)?;
        let mut body = mapper::from_test_case(test_case);
        body["TestCase"]["Project"] = json!({"_ref": format!("/project/{project}")});
        let raw = self
            .state()?
            .client
            .post("testcase/create", &body, cancel)
            .await
            .map_err(|e| enrich(e, "create_test_case", &json!({"title": test_case.title})))?;
        mapper::created_object_id(&raw).ok_or_else(|| no_created_id("test case"))
    }

    async fn create_test_steps(
        &self,
        _project_id: &str,
        test_case_id: &str,
        steps: &[TestStep],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let case = numeric_id("test_case", test_case_id)?;
        let case_ref = format!("/testcase/{case}");
        // WSAPI creates one step per request; keep them sequential so the
        // indices land in order.
        for step in steps {
            let body = mapper::from_step(&case_ref, step);
            self.state()?
                .client
                .post("testcasestep/create", &body, cancel)
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
        let project = numeric_id("project", project_id)?;
        let body = json!({
            "TestSet": {
                "Name": cycle.name,
                "Project": {"_ref": format!("/project/{project}")},
            }
        });
        let raw = self
            .state()?
            .client
            .post("testset/create", &body, cancel)
            .await?;
        mapper::created_object_id(&raw).ok_or_else(|| no_created_id("test set"))
    }

    async fn create_test_executions(
        &self,
        _project_id: &str,
        executions: &[TestExecution],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError> {
        let build = self
            .state()?
            .config
            .extra_str("build")
            .unwrap_or("migrated")
            .to_string();
        for execution in executions {
            let body = mapper::from_execution(execution, &build);
            self.state()?
                .client
                .post("testcaseresult/create", &body, cancel)
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
        use base64::Engine as _;
        let owner_ref = match owner {
            AttachmentOwner::TestCase(id) => {
                format!("/testcase/{}", numeric_id("test_case", id)?)
            }
            AttachmentOwner::TestExecution(id) => {
                format!("/testcaseresult/{}", numeric_id("execution", id)?)
            }
        };
        // Content object first, then the attachment referencing it.
        let content_body = json!({
            "AttachmentContent": {
                "Content": base64::engine::general_purpose::STANDARD.encode(data),
            }
        });
        let raw = self
            .state()?
            .client
            .post("attachmentcontent/create", &content_body, cancel)
            .await?;
        let content_id =
            mapper::created_object_id(&raw).ok_or_else(|| no_created_id("attachment content"))?;
        let attachment_body = json!({
            "Attachment": {
                "Artifact": {"_ref": owner_ref},
                "Content": {"_ref": format!("/attachmentcontent/{content_id}")},
                "Name": attachment.file_name,
                "ContentType": attachment.content_type,
                "Size": attachment.size_bytes,
            }
        });
        let raw = self
            .state()?
            .client
            .post("attachment/create", &attachment_body, cancel)
            .await?;
        mapper::created_object_id(&raw).ok_or_else(|| no_created_id("attachment"))
    }

    async fn create_field_definition(
        &self,
        _project_id: &str,
        definition: &FieldDefinition,
        _cancel: &CancelSignal,
    ) -> Result<String, ProviderError> {
        // Rally custom attributes are workspace-admin configuration.
        Err(ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Validation,
            format!(
                "Rally does not allow creating attribute definitions via WSAPI (field {:?})",
                definition.name
            ),
        )
        .with_context("unsupported", true))
    }
}

fn no_created_id(entity: &str) -> ProviderError {
    ProviderError::new(
        PROVIDER_ID,
        ErrorCategory::Unknown,
        format!("create {entity} response carried no ObjectID"),
    )
}
