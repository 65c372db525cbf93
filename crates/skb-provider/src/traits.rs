// SPDX-License-Identifier: MIT OR Apache-2.0
//! The capability contracts adapters implement.
//!
//! [`Provider`] is the base facet every adapter carries; [`SourceProvider`]
//! and [`TargetProvider`] are orthogonal read/write facets. All id
//! parameters are opaque canonical strings; adapters parse vendor ids out
//! of them and reject malformed ones with a VALIDATION error.

use crate::capability::ProviderCapabilities;
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skb_cancel::CancelSignal;
use skb_core::{
    Attachment, FieldDefinition, Folder, Project, TestCase, TestCaseStatus, TestCycle,
    TestExecution, TestStep,
};
use skb_error::ProviderError;
use skb_resilience::HealthReport;

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// One page of a collection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total items across all pages, when the vendor reports it.
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
}

impl<T> Page<T> {
    /// A page holding everything (single-page collections).
    #[must_use]
    pub fn single(items: Vec<T>) -> Self {
        let total = items.len() as u64;
        Self {
            items,
            total,
            page: 1,
            page_size: total.max(1) as u32,
        }
    }

    /// Whether a later page exists.
    #[must_use]
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total
    }
}

/// Generic paging parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
        }
    }
}

/// Filters for test-case listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TestCaseQuery {
    /// Restrict to one folder.
    pub folder_id: Option<String>,
    /// Paging.
    pub paging: PageQuery,
    /// Restrict to a canonical status.
    pub status: Option<TestCaseStatus>,
    /// Offset-based start index for vendors that page by offset.
    pub start_at: Option<u32>,
}

// ---------------------------------------------------------------------------
// Misc result types
// ---------------------------------------------------------------------------

/// Result of probing the vendor API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether the probe succeeded.
    pub connected: bool,
    /// Human-readable detail (version banner, failure summary).
    pub detail: String,
}

/// Static facts about an adapter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Stable provider id (e.g. `"zephyr"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Adapter version.
    pub version: String,
    /// Configured base URL, when initialised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Downloaded attachment bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentContent {
    /// Original file name.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

/// Entity an uploaded attachment hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AttachmentOwner {
    /// Attach to a test case.
    TestCase(String),
    /// Attach to an execution record.
    TestExecution(String),
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Base facet: identity, capabilities, lifecycle.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider id (e.g. `"qtest"`).
    fn id(&self) -> &str;
    /// Human-readable provider name.
    fn name(&self) -> &str;
    /// Adapter version string.
    fn version(&self) -> &str;
    /// Declared capabilities.
    fn capabilities(&self) -> ProviderCapabilities;
    /// Validate the config and prepare the adapter for use. Called once
    /// before registration.
    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), ProviderError>;
    /// Probe the vendor API.
    async fn test_connection(
        &self,
        cancel: &CancelSignal,
    ) -> Result<ConnectionStatus, ProviderError>;
    /// Static metadata snapshot.
    fn metadata(&self) -> ProviderMetadata;
    /// Health snapshot from the underlying client, when initialised.
    fn health_report(&self) -> Option<HealthReport> {
        None
    }
}

/// Read facet.
#[async_trait]
pub trait SourceProvider: Provider {
    /// List projects.
    async fn projects(&self, cancel: &CancelSignal) -> Result<Vec<Project>, ProviderError>;

    /// List folders of a project.
    async fn folders(
        &self,
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<Folder>, ProviderError>;

    /// Page through test cases.
    async fn test_cases(
        &self,
        project_id: &str,
        query: &TestCaseQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCase>, ProviderError>;

    /// Fetch one test case.
    async fn test_case(
        &self,
        project_id: &str,
        test_case_id: &str,
        cancel: &CancelSignal,
    ) -> Result<TestCase, ProviderError>;

    /// Page through test cycles.
    async fn test_cycles(
        &self,
        project_id: &str,
        query: &PageQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestCycle>, ProviderError>;

    /// Page through executions of a cycle.
    async fn test_executions(
        &self,
        project_id: &str,
        cycle_id: &str,
        query: &PageQuery,
        cancel: &CancelSignal,
    ) -> Result<Page<TestExecution>, ProviderError>;

    /// Download one attachment.
    async fn attachment_content(
        &self,
        project_id: &str,
        attachment_id: &str,
        cancel: &CancelSignal,
    ) -> Result<AttachmentContent, ProviderError>;

    /// List custom-field definitions.
    async fn field_definitions(
        &self,
        project_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<FieldDefinition>, ProviderError>;
}

/// Write facet. Operations return the created vendor id as an opaque
/// canonical string.
#[async_trait]
pub trait TargetProvider: Provider {
    /// Create a folder.
    async fn create_folder(
        &self,
        project_id: &str,
        folder: &Folder,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError>;

    /// Create a test case (without steps when the vendor stores them
    /// separately).
    async fn create_test_case(
        &self,
        project_id: &str,
        test_case: &TestCase,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError>;

    /// Attach steps to an existing test case.
    async fn create_test_steps(
        &self,
        project_id: &str,
        test_case_id: &str,
        steps: &[TestStep],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError>;

    /// Create a test cycle.
    async fn create_test_cycle(
        &self,
        project_id: &str,
        cycle: &TestCycle,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError>;

    /// Record execution results.
    async fn create_test_executions(
        &self,
        project_id: &str,
        executions: &[TestExecution],
        cancel: &CancelSignal,
    ) -> Result<(), ProviderError>;

    /// Upload an attachment to its owner.
    async fn upload_attachment(
        &self,
        project_id: &str,
        owner: &AttachmentOwner,
        attachment: &Attachment,
        data: &[u8],
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError>;

    /// Create a custom-field definition. Vendors that forbid schema writes
    /// fail with a VALIDATION error marked unsupported.
    async fn create_field_definition(
        &self,
        project_id: &str,
        definition: &FieldDefinition,
        cancel: &CancelSignal,
    ) -> Result<String, ProviderError>;
}
