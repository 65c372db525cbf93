// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The canonical, vendor-neutral model for test-management assets.
//!
//! Every provider mapper translates its vendor's native payloads into the
//! entities defined here and back. Entities are value objects: each mapping
//! call produces a fresh instance, and adapters never retain mutable
//! references to them. Anything a mapper does not recognise is preserved
//! verbatim in the [`TestCase::attributes`] passthrough bag so a later
//! reverse mapping can restore it.

/// Field-type taxonomy and the shared coercion policy.
pub mod fields;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub use fields::{FieldType, FieldValue, coerce, coerce_array, infer};

/// Canonical model version embedded in exported snapshots.
pub const CANONICAL_VERSION: &str = "skb/v1";

/// Reserved key in [`TestCase::attributes`] under which unrecognised vendor
/// fields are preserved verbatim.
pub const CUSTOM_FIELDS_ATTR: &str = "custom_fields";

/// Default MIME type for attachments whose content type is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Vendor-specific passthrough bag attached to canonical entities.
pub type Attributes = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Lifecycle status of a canonical [`TestCase`].
///
/// Vendors that do not distinguish all six states map onto the nearest one
/// through their mapper's status table; unknown vendor tokens fall back to
/// [`TestCaseStatus::Draft`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestCaseStatus {
    /// Authoring has started but the case is not ready to run.
    #[default]
    Draft,
    /// The case is ready to be executed.
    Ready,
    /// The case is waiting for review.
    ReadyForReview,
    /// Review found problems that must be addressed.
    NeedsWork,
    /// The case passed review.
    Approved,
    /// The case is retired and excluded from new cycles.
    Deprecated,
}

impl TestCaseStatus {
    /// All canonical statuses, in declaration order.
    pub const ALL: &'static [Self] = &[
        Self::Draft,
        Self::Ready,
        Self::ReadyForReview,
        Self::NeedsWork,
        Self::Approved,
        Self::Deprecated,
    ];

    /// Stable string form, e.g. `"READY_FOR_REVIEW"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Ready => "READY",
            Self::ReadyForReview => "READY_FOR_REVIEW",
            Self::NeedsWork => "NEEDS_WORK",
            Self::Approved => "APPROVED",
            Self::Deprecated => "DEPRECATED",
        }
    }
}

impl std::fmt::Display for TestCaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a canonical [`TestCase`].
///
/// Unknown vendor tokens fall back to [`Priority::Medium`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Must-run case; failure blocks release.
    Critical,
    /// Important case covering core behavior.
    High,
    /// Standard coverage.
    #[default]
    Medium,
    /// Nice-to-have coverage.
    Low,
}

impl Priority {
    /// All canonical priorities, in declaration order.
    pub const ALL: &'static [Self] = &[Self::Critical, Self::High, Self::Medium, Self::Low];

    /// Stable string form, e.g. `"CRITICAL"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a canonical [`TestExecution`] or a single [`StepResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// The execution passed.
    Passed,
    /// The execution failed.
    Failed,
    /// The execution could not proceed (environment, dependency).
    Blocked,
    /// The case does not apply in this context.
    NotApplicable,
    /// The execution has not finished (or never ran).
    #[default]
    Open,
}

impl ExecutionStatus {
    /// All canonical execution statuses, in declaration order.
    pub const ALL: &'static [Self] = &[
        Self::Passed,
        Self::Failed,
        Self::Blocked,
        Self::NotApplicable,
        Self::Open,
    ];

    /// Stable string form, e.g. `"NOT_APPLICABLE"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::Open => "OPEN",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity a provider can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Projects.
    Project,
    /// Folder hierarchy.
    Folder,
    /// Test cases (including steps).
    TestCase,
    /// Test cycles.
    TestCycle,
    /// Execution records.
    TestExecution,
    /// Binary attachments.
    Attachment,
    /// Custom-field schema definitions.
    FieldDefinition,
}

// ---------------------------------------------------------------------------
// UserRef
// ---------------------------------------------------------------------------

/// Reference to a user in the originating system.
///
/// Vendors disagree on whether users are addressed by id, login, or display
/// name; the canonical form keeps whichever parts were present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserRef {
    /// Vendor-side user id, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserRef {
    /// Build a reference from a display name.
    #[must_use]
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            id: None,
            display_name: Some(display_name.into()),
        }
    }

    /// Build a reference from a vendor id.
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            display_name: None,
        }
    }

    /// Preferred human-readable label: display name when available, else id,
    /// else the empty string.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// TestStep
// ---------------------------------------------------------------------------

/// A single ordered step of a [`TestCase`].
///
/// Within a case, sequences start at 1, are unique, and ascend contiguously
/// after a load; [`TestCase::renumber_steps`] restores that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    /// 1-based position of the step within its case.
    pub sequence: u32,
    /// What the tester does.
    pub action: String,
    /// What the tester should observe.
    pub expected_result: String,
    /// Optional input data for the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_data: Option<String>,
    /// Attachments scoped to this step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl TestStep {
    /// Build a step with the given sequence, action, and expected result.
    #[must_use]
    pub fn new(
        sequence: u32,
        action: impl Into<String>,
        expected_result: impl Into<String>,
    ) -> Self {
        Self {
            sequence,
            action: action.into(),
            expected_result: expected_result.into(),
            test_data: None,
            attachments: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TestCase
// ---------------------------------------------------------------------------

/// The central canonical entity: one test case with its steps and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Opaque canonical id (usually the vendor id as a string).
    pub id: String,
    /// Optional human-facing key (e.g. `"PROJ-T123"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Title of the case.
    pub title: String,
    /// Free HTML/text description.
    #[serde(default)]
    pub description: String,
    /// What the case sets out to verify.
    #[serde(default)]
    pub objective: String,
    /// Preconditions that must hold before execution.
    #[serde(default)]
    pub precondition: String,
    /// Lifecycle status. Defaults to [`TestCaseStatus::Draft`] when the
    /// source value is unknown or missing.
    #[serde(default)]
    pub status: TestCaseStatus,
    /// Priority. Defaults to [`Priority::Medium`] when the source value is
    /// unknown or missing.
    #[serde(default)]
    pub priority: Priority,
    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<TestStep>,
    /// Free-form labels / tags.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Owning folder, if the vendor has a hierarchy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    /// Creation timestamp in the source system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last-update timestamp in the source system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Who created the case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserRef>,
    /// Who last updated the case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserRef>,
    /// Typed custom-field values keyed by canonical field key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, FieldValue>,
    /// Vendor-specific passthrough. Unrecognised vendor fields live under
    /// [`CUSTOM_FIELDS_ATTR`] so a reverse mapping can restore them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl TestCase {
    /// Build a minimal case with defaults for everything but id and title.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: None,
            title: title.into(),
            description: String::new(),
            objective: String::new(),
            precondition: String::new(),
            status: TestCaseStatus::default(),
            priority: Priority::default(),
            steps: Vec::new(),
            labels: Vec::new(),
            folder_id: None,
            created_at: None,
            updated_at: None,
            created_by: None,
            updated_by: None,
            custom_fields: BTreeMap::new(),
            attributes: Attributes::new(),
        }
    }

    /// Build a case with a freshly generated UUID id.
    #[must_use]
    pub fn with_generated_id(title: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), title)
    }

    /// Append a step, assigning the next contiguous sequence number.
    pub fn push_step(&mut self, action: impl Into<String>, expected: impl Into<String>) {
        let seq = self.steps.len() as u32 + 1;
        self.steps.push(TestStep::new(seq, action, expected));
    }

    /// Restore the step-sequence invariant: 1-based, unique, contiguous,
    /// in current vector order.
    pub fn renumber_steps(&mut self) {
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.sequence = idx as u32 + 1;
        }
    }

    /// Record an unrecognised vendor field in the passthrough bag.
    pub fn retain_vendor_field(&mut self, name: impl Into<String>, value: serde_json::Value) {
        let bag = self
            .attributes
            .entry(CUSTOM_FIELDS_ATTR.to_string())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let serde_json::Value::Object(map) = bag {
            map.insert(name.into(), value);
        }
    }

    /// Look up a preserved vendor field from the passthrough bag.
    #[must_use]
    pub fn vendor_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes
            .get(CUSTOM_FIELDS_ATTR)
            .and_then(|bag| bag.get(name))
    }
}

// ---------------------------------------------------------------------------
// TestCycle
// ---------------------------------------------------------------------------

/// A planned grouping of test cases to execute together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCycle {
    /// Opaque canonical id.
    pub id: String,
    /// Cycle name.
    pub name: String,
    /// Free description.
    #[serde(default)]
    pub description: String,
    /// Vendor-reported cycle status (vendors do not share a status model
    /// for cycles, so this stays a free string).
    #[serde(default)]
    pub status: String,
    /// Optional execution environment label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Ids of the member test cases.
    #[serde(default)]
    pub test_case_ids: Vec<String>,
    /// Scheduled start of the cycle window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_start: Option<DateTime<Utc>>,
    /// Scheduled end of the cycle window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_end: Option<DateTime<Utc>>,
}

impl TestCycle {
    /// Build a minimal cycle.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            status: String::new(),
            environment: None,
            test_case_ids: Vec::new(),
            planned_start: None,
            planned_end: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TestExecution
// ---------------------------------------------------------------------------

/// Result of running a single step during an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Vendor-side step id, when the vendor tracks steps as entities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// 1-based sequence of the step this result belongs to.
    pub sequence: u32,
    /// Outcome of the step.
    pub status: ExecutionStatus,
    /// What actually happened.
    #[serde(default)]
    pub actual_result: String,
    /// Free comment on the step outcome.
    #[serde(default)]
    pub comment: String,
}

/// One recorded run of a test case inside a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExecution {
    /// Opaque canonical id.
    pub id: String,
    /// Id of the executed test case.
    pub test_case_id: String,
    /// Id of the owning cycle, when the vendor scopes runs to cycles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<String>,
    /// Overall outcome.
    #[serde(default)]
    pub status: ExecutionStatus,
    /// When the run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    /// Who ran it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_by: Option<UserRef>,
    /// Environment label for the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Wall-clock duration of the run, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    /// Ordered per-step outcomes.
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    /// Free comment on the run.
    #[serde(default)]
    pub comment: String,
    /// Typed custom-field values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, FieldValue>,
}

impl TestExecution {
    /// Build a minimal execution record.
    #[must_use]
    pub fn new(id: impl Into<String>, test_case_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            test_case_id: test_case_id.into(),
            cycle_id: None,
            status: ExecutionStatus::default(),
            executed_at: None,
            executed_by: None,
            environment: None,
            duration_seconds: None,
            step_results: Vec::new(),
            comment: String::new(),
            custom_fields: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// A binary attachment referenced by a case, step, or execution.
///
/// Content lives either behind an opaque [`Attachment::blob_key`] into the
/// external blob store, or inline as base64 for small payloads. The blob
/// itself is owned by the store and has an independent lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Opaque canonical id.
    pub id: String,
    /// Original file name.
    pub file_name: String,
    /// MIME type; [`DEFAULT_CONTENT_TYPE`] when the vendor did not say.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Opaque key into the external blob store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_key: Option<String>,
    /// Base64 payload for small inline attachments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_base64: Option<String>,
    /// Who uploaded the attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserRef>,
    /// When it was uploaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Attachment {
    /// Build an attachment with the default content type.
    #[must_use]
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            size_bytes,
            blob_key: None,
            inline_base64: None,
            created_by: None,
            created_at: None,
        }
    }

    /// Set the content type, falling back to the default for empty input.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let ct: String = content_type.into();
        self.content_type = if ct.trim().is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            ct
        };
        self
    }
}

// ---------------------------------------------------------------------------
// FieldDefinition
// ---------------------------------------------------------------------------

/// Schema definition of a (custom) field on some entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Opaque canonical id.
    pub id: String,
    /// Field name as shown to users.
    pub name: String,
    /// Canonical type of the field's values.
    pub field_type: FieldType,
    /// Whether the vendor requires a value.
    #[serde(default)]
    pub required: bool,
    /// Allowed values for ENUM / ARRAY-of-ENUM fields.
    #[serde(default)]
    pub allowed_values: Vec<String>,
    /// Entity type this field is attached to.
    pub entity: EntityType,
}

// ---------------------------------------------------------------------------
// Folder / Project
// ---------------------------------------------------------------------------

/// A node in a vendor's folder hierarchy.
///
/// `path` always equals the slash-joined names of the ancestors plus this
/// folder's own name; hierarchies are trees (no cycles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Opaque canonical id.
    pub id: String,
    /// Folder name.
    pub name: String,
    /// Slash-delimited path from the root, e.g. `"/Regression/Login"`.
    pub path: String,
    /// Parent folder id; `None` for roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Folder {
    /// Build a root folder (path is `"/" + name`).
    #[must_use]
    pub fn root(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = format!("/{name}");
        Self {
            id: id.into(),
            name,
            path,
            parent_id: None,
        }
    }

    /// Build a child folder beneath the given parent.
    #[must_use]
    pub fn child_of(parent: &Folder, id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = format!("{}/{name}", parent.path);
        Self {
            id: id.into(),
            name,
            path,
            parent_id: Some(parent.id.clone()),
        }
    }
}

/// A project (top-level container) in a vendor system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Opaque canonical id.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Short project key (e.g. `"PROJ"`); empty when the vendor has none.
    #[serde(default)]
    pub key: String,
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_default_is_draft() {
        assert_eq!(TestCaseStatus::default(), TestCaseStatus::Draft);
    }

    #[test]
    fn priority_default_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn execution_status_default_is_open() {
        assert_eq!(ExecutionStatus::default(), ExecutionStatus::Open);
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&TestCaseStatus::ReadyForReview).unwrap();
        assert_eq!(json, r#""READY_FOR_REVIEW""#);
    }

    #[test]
    fn status_as_str_matches_serde() {
        for s in TestCaseStatus::ALL {
            let json = serde_json::to_string(s).unwrap();
            assert_eq!(json, format!(r#""{}""#, s.as_str()));
        }
        for p in Priority::ALL {
            let json = serde_json::to_string(p).unwrap();
            assert_eq!(json, format!(r#""{}""#, p.as_str()));
        }
        for e in ExecutionStatus::ALL {
            let json = serde_json::to_string(e).unwrap();
            assert_eq!(json, format!(r#""{}""#, e.as_str()));
        }
    }

    #[test]
    fn user_ref_label_prefers_display_name() {
        let u = UserRef {
            id: Some("u-1".into()),
            display_name: Some("Dana".into()),
        };
        assert_eq!(u.label(), "Dana");
        assert_eq!(UserRef::by_id("u-1").label(), "u-1");
        assert_eq!(UserRef::default().label(), "");
    }

    #[test]
    fn push_step_assigns_contiguous_sequences() {
        let mut tc = TestCase::new("1", "Login");
        tc.push_step("open page", "page shown");
        tc.push_step("enter creds", "dashboard shown");
        let seqs: Vec<u32> = tc.steps.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn renumber_steps_restores_invariant() {
        let mut tc = TestCase::new("1", "t");
        tc.steps = vec![
            TestStep::new(7, "a", "r"),
            TestStep::new(3, "b", "s"),
            TestStep::new(9, "c", "t"),
        ];
        tc.renumber_steps();
        let seqs: Vec<u32> = tc.steps.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        // order of the actions is untouched
        assert_eq!(tc.steps[0].action, "a");
        assert_eq!(tc.steps[2].action, "c");
    }

    #[test]
    fn vendor_field_round_trips_through_bag() {
        let mut tc = TestCase::new("1", "t");
        tc.retain_vendor_field("vendorOnly", serde_json::json!({"x": 1}));
        assert_eq!(tc.vendor_field("vendorOnly"), Some(&serde_json::json!({"x": 1})));
        assert!(tc.vendor_field("absent").is_none());
        // serde round-trip keeps the bag
        let json = serde_json::to_string(&tc).unwrap();
        let back: TestCase = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vendor_field("vendorOnly"), Some(&serde_json::json!({"x": 1})));
    }

    #[test]
    fn attachment_defaults_content_type() {
        let a = Attachment::new("1", "log.txt", 10);
        assert_eq!(a.content_type, DEFAULT_CONTENT_TYPE);
        let a = a.with_content_type("  ");
        assert_eq!(a.content_type, DEFAULT_CONTENT_TYPE);
        let a = a.with_content_type("text/plain");
        assert_eq!(a.content_type, "text/plain");
    }

    #[test]
    fn folder_paths_concatenate_ancestor_names() {
        let root = Folder::root("1", "Regression");
        assert_eq!(root.path, "/Regression");
        let child = Folder::child_of(&root, "2", "Login");
        assert_eq!(child.path, "/Regression/Login");
        assert_eq!(child.parent_id.as_deref(), Some("1"));
        let grandchild = Folder::child_of(&child, "3", "MFA");
        assert_eq!(grandchild.path, "/Regression/Login/MFA");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TestCase::with_generated_id("a");
        let b = TestCase::with_generated_id("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_case_serde_roundtrip() {
        let mut tc = TestCase::new("tc-1", "Login works");
        tc.key = Some("PROJ-T1".into());
        tc.status = TestCaseStatus::Approved;
        tc.priority = Priority::High;
        tc.labels = vec!["smoke".into()];
        tc.push_step("open", "opened");
        tc.custom_fields
            .insert("estimate".into(), FieldValue::Integer(5));
        let json = serde_json::to_string(&tc).unwrap();
        let back: TestCase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tc);
    }

    #[test]
    fn execution_serde_roundtrip() {
        let mut ex = TestExecution::new("e-1", "tc-1");
        ex.status = ExecutionStatus::Failed;
        ex.step_results.push(StepResult {
            step_id: None,
            sequence: 1,
            status: ExecutionStatus::Failed,
            actual_result: "boom".into(),
            comment: String::new(),
        });
        let json = serde_json::to_string(&ex).unwrap();
        let back: TestExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ex);
    }
}
