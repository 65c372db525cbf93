// SPDX-License-Identifier: MIT OR Apache-2.0
//! excel-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Source-only adapter over Excel exports. Teams that cannot expose an
//! API hand over a workbook exported to CSV worksheets; this adapter
//! implements the same Source contract as the HTTP vendors so the
//! migration path stays uniform.
//!
//! Expected layout under the configured `workbook_dir`:
//!
//! ```text
//! test_cases.csv        (required)
//! test_steps.csv        (optional)
//! folders.csv           (optional)
//! projects.csv          (optional; a single project is synthesised
//!                        from the directory name otherwise)
//! test_cycles.csv       (optional)
//! test_executions.csv   (optional)
//! attachments/          (optional; files addressed by name)
//! ```

/// Row-level mapping functions.
pub mod mapper;

use async_trait::async_trait;
use mapper::Row;
use skb_cancel::CancelSignal;
use skb_core::{EntityType, FieldDefinition, Folder, Project, TestCase, TestCycle, TestExecution};
use skb_error::{ErrorCategory, ProviderError};
use skb_provider::{
    AttachmentContent, ConnectionStatus, Page, PageQuery, Provider, ProviderCapabilities,
    ProviderConfig, ProviderMetadata, SourceProvider, TestCaseQuery,
};
use skb_ratelimit::RateLimiterConfig;
use std::path::{Path, PathBuf};
use tracing::info;

/// Stable provider id.
pub const PROVIDER_ID: &str = "excel";
/// Human-readable provider name.
pub const PROVIDER_NAME: &str = "Excel export";

/// Excel-export source adapter.
#[derive(Default)]
pub struct ExcelProvider {
    workbook_dir: Option<PathBuf>,
}

impl ExcelProvider {
    /// An uninitialised adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn dir(&self) -> Result<&Path, ProviderError> {
        self.workbook_dir.as_deref().ok_or_else(|| {
            ProviderError::new(
                PROVIDER_ID,
                ErrorCategory::Validation,
                "provider not initialised",
            )
        })
    }

    async fn rows(&self, file: &str) -> Result<Vec<Row>, ProviderError> {
        let path = self.dir()?.join(file);
        read_rows(path).await
    }

    async fn optional_rows(&self, file: &str) -> Result<Vec<Row>, ProviderError> {
        let path = self.dir()?.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_rows(path).await
    }
}

/// Parse one CSV worksheet into header→cell rows, off the async runtime.
async fn read_rows(path: PathBuf) -> Result<Vec<Row>, ProviderError> {
    let shown = path.display().to_string();
    tokio::task::spawn_blocking(move || {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| csv_error(&path, e))?;
        let headers = reader
            .headers()
            .map_err(|e| csv_error(&path, e))?
            .clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(&path, e))?;
            let mut row = Row::new();
            for (idx, header) in headers.iter().enumerate() {
                if let Some(value) = record.get(idx) {
                    row.insert(header.to_string(), value.to_string());
                }
            }
            rows.push(row);
        }
        Ok(rows)
    })
    .await
    .map_err(|e| {
        ProviderError::new(
            PROVIDER_ID,
            ErrorCategory::Unknown,
            format!("worksheet read task failed for {shown}"),
        )
        .with_source(e)
    })?
}

fn csv_error(path: &Path, err: csv::Error) -> ProviderError {
    ProviderError::new(
        PROVIDER_ID,
        ErrorCategory::Validation,
        format!("cannot read worksheet {}", path.display()),
    )
    .with_source(err)
}

#[async_trait]
impl Provider for ExcelProvider {
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
        let mut caps = ProviderCapabilities::source_only().with_rate_limiting(RateLimiterConfig {
            // Local files; the limiter is effectively off.
            enabled: false,
            ..RateLimiterConfig::default()
        });
        caps.entity_types = vec![
            EntityType::Project,
            EntityType::Folder,
            EntityType::TestCase,
            EntityType::TestCycle,
            EntityType::TestExecution,
            EntityType::Attachment,
        ];
        caps.supports_custom_fields = true;
        caps
    }

    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), ProviderError> {
        let dir = config
            .extra_str("workbook_dir")
            .map(PathBuf::from)
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER_ID,
                    ErrorCategory::Validation,
                    "excel config requires a `workbook_dir` entry",
                )
                .with_field_error("workbook_dir", "required")
            })?;
        if !dir.is_dir() {
            return Err(ProviderError::new(
                PROVIDER_ID,
                ErrorCategory::NotFound,
                format!("workbook directory {} does not exist", dir.display()),
            ));
        }
        if !dir.join("test_cases.csv").is_file() {
            return Err(ProviderError::new(
                PROVIDER_ID,
                ErrorCategory::Validation,
                "workbook directory has no test_cases.csv",
            )
            .with_field_error("workbook_dir", "missing test_cases.csv"));
        }
        info!(target: "skb.excel", dir = %dir.display(), "adapter initialised");
        self.workbook_dir = Some(dir);
        Ok(())
    }

    async fn test_connection(
        &self,
        _cancel: &CancelSignal,
    ) -> Result<ConnectionStatus, ProviderError> {
        let rows = self.rows("test_cases.csv").await?;
        Ok(ConnectionStatus {
            connected: true,
            detail: format!("{} test case row(s)", rows.len()),
        })
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: PROVIDER_ID.into(),
            name: PROVIDER_NAME.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            base_url: self
                .workbook_dir
                .as_ref()
                .map(|d| d.display().to_string()),
        }
    }
}

#[async_trait]
impl SourceProvider for ExcelProvider {
    async fn projects(&self, _cancel: &CancelSignal) -> Result<Vec<Project>, ProviderError> {
        let rows = self.optional_rows("projects.csv").await?;
        if rows.is_empty() {
            // Synthesise one project from the workbook directory name.
            let name = self
                .dir()?
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "workbook".to_string());
            return Ok(vec![Project {
                id: "workbook".into(),
                name,
                key: String::new(),
            }]);
        }
        Ok(rows.iter().map(mapper::to_project).collect())
    }

    async fn folders(
        &self,
        _project_id: &str,
        _cancel: &CancelSignal,
    ) -> Result<Vec<Folder>, ProviderError> {
        let rows = self.optional_rows("folders.csv").await?;
        let mut resolved: Vec<Folder> = Vec::new();
        let mut pending: Vec<&Row> = rows.iter().collect();
        let mut passes = 0;
        while !pending.is_empty() && passes <= rows.len() {
            passes += 1;
            let mut next = Vec::new();
            for row in pending {
                let draft = mapper::to_folder(row, None);
                match &draft.parent_id {
                    None => resolved.push(draft),
                    Some(parent_id) => match resolved.iter().find(|f| &f.id == parent_id) {
                        Some(parent) => {
                            let parent_path = parent.path.clone();
                            resolved.push(mapper::to_folder(row, Some(&parent_path)));
                        }
                        None => next.push(row),
                    },
                }
            }
            if next.len() == rows.len() {
                break;
            }
            pending = next;
        }
        resolved.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(resolved)
    }

    async fn test_cases(
        &self,
        _project_id: &str,
        query: &TestCaseQuery,
        _cancel: &CancelSignal,
    ) -> Result<Page<TestCase>, ProviderError> {
        let case_rows = self.rows("test_cases.csv").await?;
        let step_rows = self.optional_rows("test_steps.csv").await?;

        let mut cases: Vec<TestCase> = case_rows
            .iter()
            .map(|row| {
                let mut tc = mapper::to_test_case(row);
                let mine: Vec<Row> = step_rows
                    .iter()
                    .filter(|s| s.get("test_case_id").map(String::as_str) == Some(tc.id.as_str()))
                    .cloned()
                    .collect();
                tc.steps = mapper::to_steps(&mine);
                tc
            })
            .collect();
        if let Some(folder) = &query.folder_id {
            cases.retain(|tc| tc.folder_id.as_deref() == Some(folder.as_str()));
        }
        if let Some(status) = query.status {
            cases.retain(|tc| tc.status == status);
        }

        let total = cases.len() as u64;
        let page = query.paging.page.max(1);
        let page_size = query.paging.page_size.max(1);
        let start = query
            .start_at
            .unwrap_or((page - 1).saturating_mul(page_size)) as usize;
        let items = cases
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        Ok(Page {
            items,
            total,
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
        let all = self
            .test_cases(
                project_id,
                &TestCaseQuery {
                    paging: skb_provider::PageQuery {
                        page: 1,
                        page_size: u32::MAX,
                    },
                    ..TestCaseQuery::default()
                },
                cancel,
            )
            .await?;
        all.items
            .into_iter()
            .find(|tc| tc.id == test_case_id)
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER_ID,
                    ErrorCategory::NotFound,
                    format!("no test case with id {test_case_id:?} in the workbook"),
                )
            })
    }

    async fn test_cycles(
        &self,
        _project_id: &str,
        query: &PageQuery,
        _cancel: &CancelSignal,
    ) -> Result<Page<TestCycle>, ProviderError> {
        let rows = self.optional_rows("test_cycles.csv").await?;
        let total = rows.len() as u64;
        let items = rows
            .iter()
            .skip(((query.page.max(1) - 1) * query.page_size) as usize)
            .take(query.page_size as usize)
            .map(mapper::to_cycle)
            .collect();
        Ok(Page {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn test_executions(
        &self,
        _project_id: &str,
        cycle_id: &str,
        query: &PageQuery,
        _cancel: &CancelSignal,
    ) -> Result<Page<TestExecution>, ProviderError> {
        let rows = self.optional_rows("test_executions.csv").await?;
        let filtered: Vec<TestExecution> = rows
            .iter()
            .map(mapper::to_execution)
            .filter(|e| e.cycle_id.as_deref() == Some(cycle_id))
            .collect();
        let total = filtered.len() as u64;
        let items = filtered
            .into_iter()
            .skip(((query.page.max(1) - 1) * query.page_size) as usize)
            .take(query.page_size as usize)
            .collect();
        Ok(Page {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn attachment_content(
        &self,
        _project_id: &str,
        attachment_id: &str,
        _cancel: &CancelSignal,
    ) -> Result<AttachmentContent, ProviderError> {
        let name = attachment_id.trim();
        if name.is_empty() || name.contains("..") || name.contains('/') {
            return Err(ProviderError::new(
                PROVIDER_ID,
                ErrorCategory::Validation,
                format!("malformed attachment name: {attachment_id:?}"),
            ));
        }
        let path = self.dir()?.join("attachments").join(name);
        let data = tokio::fs::read(&path).await.map_err(|e| {
            ProviderError::new(
                PROVIDER_ID,
                ErrorCategory::NotFound,
                format!("no attachment file {}", path.display()),
            )
            .with_source(e)
        })?;
        Ok(AttachmentContent {
            file_name: name.to_string(),
            content_type: skb_core::DEFAULT_CONTENT_TYPE.into(),
            data,
        })
    }

    async fn field_definitions(
        &self,
        _project_id: &str,
        _cancel: &CancelSignal,
    ) -> Result<Vec<FieldDefinition>, ProviderError> {
        // Exports carry no schema; custom columns are discovered per row.
        Ok(Vec::new())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use skb_auth::Credentials;
    use std::io::Write as _;

    fn workbook() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cases = std::fs::File::create(dir.path().join("test_cases.csv")).expect("file");
        writeln!(
            cases,
            "id,key,title,status,priority,labels,folder_id,Estimate"
        )
        .expect("write");
        writeln!(cases, "tc-1,X-1,First case,approved,high,smoke|auth,f-1,5").expect("write");
        writeln!(cases, "tc-2,X-2,Second case,draft,low,,f-2,").expect("write");
        let mut steps = std::fs::File::create(dir.path().join("test_steps.csv")).expect("file");
        writeln!(steps, "test_case_id,sequence,action,expected_result").expect("write");
        writeln!(steps, "tc-1,2,second,done").expect("write");
        writeln!(steps, "tc-1,1,first,ok").expect("write");
        let mut folders = std::fs::File::create(dir.path().join("folders.csv")).expect("file");
        writeln!(folders, "id,name,parent_id").expect("write");
        writeln!(folders, "f-1,Regression,").expect("write");
        writeln!(folders, "f-2,Login,f-1").expect("write");
        dir
    }

    fn config(dir: &tempfile::TempDir) -> ProviderConfig {
        let mut config = ProviderConfig::new(
            "file:///workbook",
            Credentials::Token {
                token: "unused".into(),
                header_name: None,
                prefix: None,
            },
        );
        config.extra.insert(
            "workbook_dir".into(),
            serde_json::json!(dir.path().display().to_string()),
        );
        config
    }

    #[tokio::test]
    async fn initialises_and_lists_cases_with_steps() {
        let dir = workbook();
        let mut adapter = ExcelProvider::new();
        adapter.initialize(config(&dir)).await.expect("initialises");
        let cancel = CancelSignal::new();

        let status = adapter.test_connection(&cancel).await.expect("probe");
        assert!(status.connected);

        let page = adapter
            .test_cases("workbook", &TestCaseQuery::default(), &cancel)
            .await
            .expect("page");
        assert_eq!(page.total, 2);
        let first = &page.items[0];
        assert_eq!(first.key.as_deref(), Some("X-1"));
        assert_eq!(first.status, skb_core::TestCaseStatus::Approved);
        assert_eq!(first.labels, vec!["smoke", "auth"]);
        // Steps are attached and ordered by the sequence column.
        assert_eq!(first.steps.len(), 2);
        assert_eq!(first.steps[0].action, "first");
        assert_eq!(
            first.custom_fields["Estimate"],
            skb_core::FieldValue::Integer(5)
        );
    }

    #[tokio::test]
    async fn folder_paths_resolve_from_csv() {
        let dir = workbook();
        let mut adapter = ExcelProvider::new();
        adapter.initialize(config(&dir)).await.expect("initialises");
        let cancel = CancelSignal::new();
        let folders = adapter.folders("workbook", &cancel).await.expect("folders");
        let paths: Vec<&str> = folders.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/Regression", "/Regression/Login"]);
    }

    #[tokio::test]
    async fn missing_workbook_dir_fails_initialisation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut bad = config(&dir);
        bad.extra.insert(
            "workbook_dir".into(),
            serde_json::json!(format!("{}/absent", dir.path().display())),
        );
        let mut adapter = ExcelProvider::new();
        let err = adapter.initialize(bad).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn workbook_without_cases_sheet_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut adapter = ExcelProvider::new();
        let err = adapter.initialize(config(&dir)).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn unknown_test_case_is_not_found() {
        let dir = workbook();
        let mut adapter = ExcelProvider::new();
        adapter.initialize(config(&dir)).await.expect("initialises");
        let cancel = CancelSignal::new();
        let err = adapter
            .test_case("workbook", "tc-999", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn attachment_names_are_sanitised() {
        let dir = workbook();
        std::fs::create_dir(dir.path().join("attachments")).expect("mkdir");
        std::fs::write(dir.path().join("attachments/log.txt"), b"hello").expect("write");
        let mut adapter = ExcelProvider::new();
        adapter.initialize(config(&dir)).await.expect("initialises");
        let cancel = CancelSignal::new();

        let content = adapter
            .attachment_content("workbook", "log.txt", &cancel)
            .await
            .expect("content");
        assert_eq!(content.data, b"hello");

        let err = adapter
            .attachment_content("workbook", "../escape", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);
    }
}
