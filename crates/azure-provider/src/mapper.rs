// SPDX-License-Identifier: MIT OR Apache-2.0
//! Azure DevOps work-item mapping.
//!
//! Test cases are work items of type `Test Case`: a flat `fields` map of
//! reference-name keys (`System.Title`, `Microsoft.VSTS.TCM.Steps`, ...)
//! with steps embedded as HTML. Writes go out as JSON-Patch documents.

use crate::steps;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use skb_core::{
    Attachment, ExecutionStatus, FieldDefinition, FieldType, Folder, Priority, Project, TestCase,
    TestCaseStatus, TestExecution, UserRef, infer,
};
use std::collections::BTreeMap;

/// Work-item field holding the title.
pub const FIELD_TITLE: &str = "System.Title";
/// Work-item field holding the HTML description.
pub const FIELD_DESCRIPTION: &str = "System.Description";
/// Work-item field holding the lifecycle state.
pub const FIELD_STATE: &str = "System.State";
/// Work-item field holding the numeric priority.
pub const FIELD_PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
/// Work-item field holding the embedded steps HTML.
pub const FIELD_STEPS: &str = "Microsoft.VSTS.TCM.Steps";
/// Work-item field holding semicolon-separated tags.
pub const FIELD_TAGS: &str = "System.Tags";
/// Work-item field holding the area path (folder).
pub const FIELD_AREA: &str = "System.AreaPath";

/// Vendor state tokens and their canonical mapping.
pub const STATUS_TABLE: &[(&str, TestCaseStatus)] = &[
    ("Design", TestCaseStatus::Draft),
    ("Ready", TestCaseStatus::Ready),
    ("In Review", TestCaseStatus::ReadyForReview),
    ("Needs Work", TestCaseStatus::NeedsWork),
    ("Approved", TestCaseStatus::Approved),
    ("Closed", TestCaseStatus::Deprecated),
];

/// Vendor outcome tokens and their canonical mapping.
pub const OUTCOME_TABLE: &[(&str, ExecutionStatus)] = &[
    ("Passed", ExecutionStatus::Passed),
    ("Failed", ExecutionStatus::Failed),
    ("Blocked", ExecutionStatus::Blocked),
    ("NotApplicable", ExecutionStatus::NotApplicable),
    ("NotExecuted", ExecutionStatus::Open),
    ("None", ExecutionStatus::Open),
    ("InProgress", ExecutionStatus::Open),
];

const STANDARD_FIELDS: &[&str] = &[
    FIELD_TITLE,
    FIELD_DESCRIPTION,
    FIELD_STATE,
    FIELD_PRIORITY,
    FIELD_STEPS,
    FIELD_TAGS,
    FIELD_AREA,
    "System.Id",
    "System.WorkItemType",
    "System.TeamProject",
    "System.CreatedDate",
    "System.CreatedBy",
    "System.ChangedDate",
    "System.ChangedBy",
    "System.IterationPath",
    "System.Rev",
    "System.AssignedTo",
];

// ---------------------------------------------------------------------------
// Enum tables
// ---------------------------------------------------------------------------

/// Vendor state → canonical status; unknown tokens default to DRAFT.
#[must_use]
pub fn to_canonical_status(vendor: &str) -> TestCaseStatus {
    STATUS_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical status → vendor state token.
#[must_use]
pub fn from_canonical_status(status: TestCaseStatus) -> &'static str {
    STATUS_TABLE
        .iter()
        .find(|(_, canonical)| *canonical == status)
        .map(|(token, _)| *token)
        .unwrap_or("Design")
}

/// Vendor priority (1–4, number or string) → canonical priority.
#[must_use]
pub fn to_canonical_priority(vendor: &Value) -> Priority {
    let number = match vendor {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match number {
        Some(1) => Priority::Critical,
        Some(2) => Priority::High,
        Some(3) => Priority::Medium,
        Some(4) => Priority::Low,
        _ => Priority::Medium,
    }
}

/// Canonical priority → vendor number.
#[must_use]
pub fn from_canonical_priority(priority: Priority) -> i64 {
    match priority {
        Priority::Critical => 1,
        Priority::High => 2,
        Priority::Medium => 3,
        Priority::Low => 4,
    }
}

/// Vendor outcome → canonical execution status; unknown tokens default to
/// OPEN.
#[must_use]
pub fn to_canonical_outcome(vendor: &str) -> ExecutionStatus {
    OUTCOME_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical execution status → vendor outcome token.
#[must_use]
pub fn from_canonical_outcome(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Passed => "Passed",
        ExecutionStatus::Failed => "Failed",
        ExecutionStatus::Blocked => "Blocked",
        ExecutionStatus::NotApplicable => "NotApplicable",
        ExecutionStatus::Open => "NotExecuted",
    }
}

// ---------------------------------------------------------------------------
// Shape helpers
// ---------------------------------------------------------------------------

fn fields_of(raw: &Value) -> &Value {
    raw.get("fields").unwrap_or(raw)
}

fn field_str(fields: &Value, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn field_date(fields: &Value, key: &str) -> Option<DateTime<Utc>> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn field_user(fields: &Value, key: &str) -> Option<UserRef> {
    match fields.get(key)? {
        Value::String(s) if !s.is_empty() => Some(UserRef::named(s.clone())),
        Value::Object(map) => {
            let display_name = map
                .get("displayName")
                .and_then(Value::as_str)
                .map(ToString::to_string);
            let id = map
                .get("uniqueName")
                .or_else(|| map.get("id"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            if display_name.is_none() && id.is_none() {
                None
            } else {
                Some(UserRef { id, display_name })
            }
        }
        _ => None,
    }
}

/// Items of an Azure collection (`{"value": [..], "count": ..}`).
#[must_use]
pub fn collection_values(raw: &Value) -> Vec<Value> {
    match raw.get("value") {
        Some(Value::Array(items)) => items.clone(),
        _ => match raw {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        },
    }
}

/// Count of an Azure collection, falling back to the item count.
#[must_use]
pub fn collection_count(raw: &Value) -> u64 {
    raw.get("count")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| collection_values(raw).len() as u64)
}

// ---------------------------------------------------------------------------
// Test cases
// ---------------------------------------------------------------------------

/// Map an Azure DevOps work item to a canonical test case.
#[must_use]
pub fn to_test_case(raw: &Value, field_mappings: &BTreeMap<String, String>) -> TestCase {
    let id = raw
        .get("id")
        .map(|v| match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        })
        .unwrap_or_default();
    let fields = fields_of(raw);
    let mut tc = TestCase::new(id, field_str(fields, FIELD_TITLE));
    tc.description = field_str(fields, FIELD_DESCRIPTION);
    tc.status = to_canonical_status(&field_str(fields, FIELD_STATE));
    tc.priority = fields
        .get(FIELD_PRIORITY)
        .map(to_canonical_priority)
        .unwrap_or_default();
    tc.steps = steps::from_steps_html(&field_str(fields, FIELD_STEPS));
    let tags = field_str(fields, FIELD_TAGS);
    if !tags.is_empty() {
        tc.labels = tags
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    let area = field_str(fields, FIELD_AREA);
    if !area.is_empty() {
        // Area paths are backslash-delimited; canonical folders use "/".
        tc.folder_id = Some(format!("/{}", area.replace('\\', "/")));
    }
    tc.created_at = field_date(fields, "System.CreatedDate");
    tc.updated_at = field_date(fields, "System.ChangedDate");
    tc.created_by = field_user(fields, "System.CreatedBy");
    tc.updated_by = field_user(fields, "System.ChangedBy");

    if let Value::Object(map) = fields {
        for (key, value) in map {
            if STANDARD_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if let Some(custom_name) = key.strip_prefix("Custom.") {
                let canonical_key = field_mappings
                    .iter()
                    .find(|(_, vendor)| vendor.as_str() == key || vendor.as_str() == custom_name)
                    .map(|(canonical, _)| canonical.clone())
                    .unwrap_or_else(|| custom_name.to_string());
                tc.custom_fields.insert(canonical_key, infer(value));
            } else {
                tc.retain_vendor_field(key.clone(), value.clone());
            }
        }
    }
    tc
}

/// Map a canonical test case to a JSON-Patch create document.
#[must_use]
pub fn from_test_case(tc: &TestCase) -> Value {
    let mut ops = vec![
        patch_add(FIELD_TITLE, json!(tc.title)),
        patch_add(FIELD_STATE, json!(from_canonical_status(tc.status))),
        patch_add(FIELD_PRIORITY, json!(from_canonical_priority(tc.priority))),
    ];
    if !tc.description.is_empty() {
        ops.push(patch_add(FIELD_DESCRIPTION, json!(tc.description)));
    }
    if !tc.steps.is_empty() {
        ops.push(patch_add(FIELD_STEPS, json!(steps::to_steps_html(&tc.steps))));
    }
    if !tc.labels.is_empty() {
        ops.push(patch_add(FIELD_TAGS, json!(tc.labels.join("; "))));
    }
    if let Some(folder) = &tc.folder_id {
        let area = folder.trim_start_matches('/').replace('/', "\\");
        if !area.is_empty() {
            ops.push(patch_add(FIELD_AREA, json!(area)));
        }
    }
    for (key, value) in &tc.custom_fields {
        ops.push(patch_add(&format!("Custom.{key}"), value.to_json()));
    }
    if let Some(Value::Object(bag)) = tc.attributes.get(skb_core::CUSTOM_FIELDS_ATTR) {
        for (key, value) in bag {
            ops.push(patch_add(key, value.clone()));
        }
    }
    Value::Array(ops)
}

fn patch_add(field: &str, value: Value) -> Value {
    json!({"op": "add", "path": format!("/fields/{field}"), "value": value})
}

// ---------------------------------------------------------------------------
// Executions (test results)
// ---------------------------------------------------------------------------

/// Map an Azure test result to a canonical execution.
#[must_use]
pub fn to_execution(raw: &Value, run_id: Option<&str>) -> TestExecution {
    let id = raw
        .get("id")
        .map(|v| match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        })
        .unwrap_or_default();
    let test_case_id = raw
        .get("testCase")
        .and_then(|c| c.get("id"))
        .map(|v| match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        })
        .unwrap_or_default();
    let mut execution = TestExecution::new(id, test_case_id);
    execution.cycle_id = run_id.map(ToString::to_string);
    execution.status = raw
        .get("outcome")
        .and_then(Value::as_str)
        .map(to_canonical_outcome)
        .unwrap_or_default();
    execution.executed_at = raw
        .get("completedDate")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    execution.executed_by = field_user(raw, "runBy");
    execution.duration_seconds = raw
        .get("durationInMs")
        .and_then(Value::as_u64)
        .map(|ms| ms / 1_000);
    execution.comment = raw
        .get("comment")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    execution
}

/// Map a canonical execution to the Azure test-result write shape.
#[must_use]
pub fn from_execution(execution: &TestExecution) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(
        "outcome".into(),
        json!(from_canonical_outcome(execution.status)),
    );
    if let Ok(case_id) = execution.test_case_id.parse::<i64>() {
        body.insert("testCase".into(), json!({"id": case_id}));
    } else {
        body.insert("testCase".into(), json!({"id": execution.test_case_id}));
    }
    if let Some(at) = execution.executed_at {
        body.insert(
            "completedDate".into(),
            json!(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }
    if let Some(duration) = execution.duration_seconds {
        body.insert("durationInMs".into(), json!(duration * 1_000));
    }
    if !execution.comment.is_empty() {
        body.insert("comment".into(), json!(execution.comment));
    }
    Value::Object(body)
}

// ---------------------------------------------------------------------------
// Folders, fields, attachments, projects
// ---------------------------------------------------------------------------

/// Flatten an Azure classification-node tree into canonical folders.
#[must_use]
pub fn to_folders(raw: &Value) -> Vec<Folder> {
    let mut out = Vec::new();
    walk_area(raw, None, &mut out);
    out
}

fn walk_area(node: &Value, parent_path: Option<&str>, out: &mut Vec<Folder>) {
    let Some(name) = node.get("name").and_then(Value::as_str) else {
        return;
    };
    let id = node
        .get("id")
        .map(|v| match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        })
        .unwrap_or_default();
    let path = match parent_path {
        Some(parent) => format!("{parent}/{name}"),
        None => format!("/{name}"),
    };
    let folder = Folder {
        id,
        name: name.to_string(),
        path: path.clone(),
        parent_id: None,
    };
    out.push(folder);
    if let Some(Value::Array(children)) = node.get("children") {
        let parent_id = out.last().map(|f| f.id.clone());
        for child in children {
            let before = out.len();
            walk_area(child, Some(&path), out);
            // Wire the immediate children back to this node.
            if let (Some(parent_id), Some(new_child)) = (&parent_id, out.get_mut(before)) {
                new_child.parent_id = Some(parent_id.clone());
            }
        }
    }
}

fn field_type_of(vendor: &str) -> FieldType {
    match vendor.to_ascii_lowercase().as_str() {
        "string" => FieldType::String,
        "html" | "plaintext" => FieldType::Text,
        "double" => FieldType::Number,
        "integer" => FieldType::Integer,
        "datetime" => FieldType::DateTime,
        "boolean" => FieldType::Boolean,
        "pickliststring" | "picklistinteger" => FieldType::Enum,
        "identity" => FieldType::User,
        _ => FieldType::Custom,
    }
}

/// Map the Azure field catalogue to canonical definitions.
#[must_use]
pub fn to_field_definitions(raw: &Value) -> Vec<FieldDefinition> {
    collection_values(raw)
        .iter()
        .map(|item| FieldDefinition {
            id: item
                .get("referenceName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: item
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            field_type: field_type_of(item.get("type").and_then(Value::as_str).unwrap_or("")),
            required: item
                .get("alwaysRequired")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            allowed_values: Vec::new(),
            entity: skb_core::EntityType::TestCase,
        })
        .collect()
}

/// Map an Azure attachment reference to the canonical model.
#[must_use]
pub fn to_attachment(raw: &Value) -> Attachment {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let size = raw
        .get("attributes")
        .and_then(|a| a.get("resourceSize"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let name = raw
        .get("attributes")
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Attachment::new(id, name, size)
}

/// Map an Azure project to the canonical model.
#[must_use]
pub fn to_project(raw: &Value) -> Project {
    Project {
        id: raw
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        name: raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        key: String::new(),
    }
}
