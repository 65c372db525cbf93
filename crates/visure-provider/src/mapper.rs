// SPDX-License-Identifier: MIT OR Apache-2.0
//! Visure payload mapping.
//!
//! Visure's REST surface is the cleanest of the supported vendors: enums
//! travel as title-case strings, steps are embedded with explicit indices,
//! and custom attributes live in a `customAttributes` object. The tables
//! are near-identity; the mapper's job is mostly totality and passthrough.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use skb_core::{
    Attachment, ExecutionStatus, FieldDefinition, FieldType, Folder, Priority, Project, TestCase,
    TestCaseStatus, TestCycle, TestExecution, TestStep, UserRef, infer,
};
use std::collections::BTreeMap;

/// Visure status tokens and their canonical mapping (identity table).
pub const STATUS_TABLE: &[(&str, TestCaseStatus)] = &[
    ("Draft", TestCaseStatus::Draft),
    ("Ready", TestCaseStatus::Ready),
    ("In Review", TestCaseStatus::ReadyForReview),
    ("Needs Work", TestCaseStatus::NeedsWork),
    ("Approved", TestCaseStatus::Approved),
    ("Deprecated", TestCaseStatus::Deprecated),
];

/// Visure priority tokens (identity table).
pub const PRIORITY_TABLE: &[(&str, Priority)] = &[
    ("Critical", Priority::Critical),
    ("High", Priority::High),
    ("Medium", Priority::Medium),
    ("Low", Priority::Low),
];

/// Visure run statuses (identity table).
pub const RUN_STATUS_TABLE: &[(&str, ExecutionStatus)] = &[
    ("Passed", ExecutionStatus::Passed),
    ("Failed", ExecutionStatus::Failed),
    ("Blocked", ExecutionStatus::Blocked),
    ("Not Applicable", ExecutionStatus::NotApplicable),
    ("Open", ExecutionStatus::Open),
];

const STANDARD_FIELDS: &[&str] = &[
    "id",
    "code",
    "title",
    "description",
    "objective",
    "preconditions",
    "status",
    "priority",
    "steps",
    "labels",
    "folderId",
    "createdAt",
    "updatedAt",
    "createdBy",
    "updatedBy",
    "customAttributes",
];

/// Status token → canonical; unknown defaults to DRAFT.
#[must_use]
pub fn to_canonical_status(vendor: &str) -> TestCaseStatus {
    STATUS_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical status → vendor token.
#[must_use]
pub fn from_canonical_status(status: TestCaseStatus) -> &'static str {
    STATUS_TABLE
        .iter()
        .find(|(_, canonical)| *canonical == status)
        .map(|(token, _)| *token)
        .unwrap_or("Draft")
}

/// Priority token → canonical; unknown defaults to MEDIUM.
#[must_use]
pub fn to_canonical_priority(vendor: &str) -> Priority {
    PRIORITY_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical priority → vendor token.
#[must_use]
pub fn from_canonical_priority(priority: Priority) -> &'static str {
    PRIORITY_TABLE
        .iter()
        .find(|(_, canonical)| *canonical == priority)
        .map(|(token, _)| *token)
        .unwrap_or("Medium")
}

/// Run status token → canonical; unknown defaults to OPEN.
#[must_use]
pub fn to_canonical_run_status(vendor: &str) -> ExecutionStatus {
    RUN_STATUS_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical execution status → vendor token.
#[must_use]
pub fn from_canonical_run_status(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Passed => "Passed",
        ExecutionStatus::Failed => "Failed",
        ExecutionStatus::Blocked => "Blocked",
        ExecutionStatus::NotApplicable => "Not Applicable",
        ExecutionStatus::Open => "Open",
    }
}

// ---------------------------------------------------------------------------
// Shape helpers
// ---------------------------------------------------------------------------

fn str_of(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn id_of(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn date_of(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    raw.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Items of a Visure collection (`{"items": [..], "total": ..}`).
#[must_use]
pub fn page_items(raw: &Value) -> Vec<Value> {
    match raw.get("items") {
        Some(Value::Array(items)) => items.clone(),
        _ => match raw {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        },
    }
}

/// Total of a Visure collection, falling back to the item count.
#[must_use]
pub fn page_total(raw: &Value) -> u64 {
    raw.get("total")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| page_items(raw).len() as u64)
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Map a Visure test case to the canonical model.
#[must_use]
pub fn to_test_case(raw: &Value, field_mappings: &BTreeMap<String, String>) -> TestCase {
    let mut tc = TestCase::new(id_of(raw, "id").unwrap_or_default(), str_of(raw, "title"));
    tc.key = raw
        .get("code")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    tc.description = str_of(raw, "description");
    tc.objective = str_of(raw, "objective");
    tc.precondition = str_of(raw, "preconditions");
    tc.status = to_canonical_status(&str_of(raw, "status"));
    tc.priority = to_canonical_priority(&str_of(raw, "priority"));
    tc.folder_id = id_of(raw, "folderId");
    tc.created_at = date_of(raw, "createdAt");
    tc.updated_at = date_of(raw, "updatedAt");
    if let Some(Value::Object(user)) = raw.get("createdBy") {
        tc.created_by = Some(UserRef {
            id: user.get("id").map(|v| v.to_string().trim_matches('"').to_string()),
            display_name: user
                .get("name")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        });
    }
    if let Some(Value::Array(labels)) = raw.get("labels") {
        tc.labels = labels
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect();
    }
    tc.steps = to_steps(raw.get("steps").unwrap_or(&Value::Null));
    if let Some(Value::Object(attributes)) = raw.get("customAttributes") {
        for (name, value) in attributes {
            let canonical_key = field_mappings
                .iter()
                .find(|(_, vendor)| vendor.as_str() == name)
                .map(|(canonical, _)| canonical.clone())
                .unwrap_or_else(|| name.clone());
            tc.custom_fields.insert(canonical_key, infer(value));
        }
    }
    if let Value::Object(map) = raw {
        for (key, value) in map {
            if !STANDARD_FIELDS.contains(&key.as_str()) {
                tc.retain_vendor_field(key.clone(), value.clone());
            }
        }
    }
    tc
}

/// Map a canonical test case to a Visure create payload.
#[must_use]
pub fn from_test_case(tc: &TestCase) -> Value {
    let mut body = Map::new();
    body.insert("title".into(), json!(tc.title));
    if let Some(key) = &tc.key {
        body.insert("code".into(), json!(key));
    }
    if !tc.description.is_empty() {
        body.insert("description".into(), json!(tc.description));
    }
    if !tc.objective.is_empty() {
        body.insert("objective".into(), json!(tc.objective));
    }
    if !tc.precondition.is_empty() {
        body.insert("preconditions".into(), json!(tc.precondition));
    }
    body.insert("status".into(), json!(from_canonical_status(tc.status)));
    body.insert(
        "priority".into(),
        json!(from_canonical_priority(tc.priority)),
    );
    if let Some(folder) = &tc.folder_id {
        body.insert("folderId".into(), json!(folder));
    }
    if !tc.labels.is_empty() {
        body.insert("labels".into(), json!(tc.labels));
    }
    if !tc.steps.is_empty() {
        body.insert("steps".into(), from_steps(&tc.steps));
    }
    if !tc.custom_fields.is_empty() {
        let mut attributes = Map::new();
        for (key, value) in &tc.custom_fields {
            attributes.insert(key.clone(), value.to_json());
        }
        body.insert("customAttributes".into(), Value::Object(attributes));
    }
    if let Some(Value::Object(bag)) = tc.attributes.get(skb_core::CUSTOM_FIELDS_ATTR) {
        for (key, value) in bag {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    Value::Object(body)
}

/// Map an embedded step array to ordered canonical steps.
#[must_use]
pub fn to_steps(raw: &Value) -> Vec<TestStep> {
    let mut items: Vec<Value> = match raw {
        Value::Array(items) => items.clone(),
        _ => return Vec::new(),
    };
    items.sort_by_key(|item| item.get("index").and_then(Value::as_u64).unwrap_or(u64::MAX));
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let mut step = TestStep::new(
                idx as u32 + 1,
                str_of(item, "action"),
                str_of(item, "expected"),
            );
            let data = str_of(item, "data");
            if !data.is_empty() {
                step.test_data = Some(data);
            }
            step
        })
        .collect()
}

/// Map canonical steps to the embedded write shape.
#[must_use]
pub fn from_steps(steps: &[TestStep]) -> Value {
    Value::Array(
        steps
            .iter()
            .map(|s| {
                let mut step = Map::new();
                step.insert("index".into(), json!(s.sequence));
                step.insert("action".into(), json!(s.action));
                step.insert("expected".into(), json!(s.expected_result));
                if let Some(data) = &s.test_data {
                    step.insert("data".into(), json!(data));
                }
                Value::Object(step)
            })
            .collect(),
    )
}

/// Map a Visure test cycle.
#[must_use]
pub fn to_cycle(raw: &Value) -> TestCycle {
    let mut cycle = TestCycle::new(id_of(raw, "id").unwrap_or_default(), str_of(raw, "name"));
    cycle.description = str_of(raw, "description");
    cycle.status = str_of(raw, "status");
    cycle.environment = raw
        .get("environment")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    cycle.planned_start = date_of(raw, "plannedStart");
    cycle.planned_end = date_of(raw, "plannedEnd");
    if let Some(Value::Array(ids)) = raw.get("testCaseIds") {
        cycle.test_case_ids = ids
            .iter()
            .map(|v| v.to_string().trim_matches('"').to_string())
            .collect();
    }
    cycle
}

/// Map a Visure run to a canonical execution.
#[must_use]
pub fn to_execution(raw: &Value) -> TestExecution {
    let mut execution = TestExecution::new(
        id_of(raw, "id").unwrap_or_default(),
        id_of(raw, "testCaseId").unwrap_or_default(),
    );
    execution.cycle_id = id_of(raw, "cycleId");
    execution.status = to_canonical_run_status(&str_of(raw, "status"));
    execution.executed_at = date_of(raw, "executedAt");
    execution.duration_seconds = raw.get("durationSeconds").and_then(Value::as_u64);
    execution.comment = str_of(raw, "comment");
    if let Some(name) = raw.get("executedBy").and_then(Value::as_str) {
        execution.executed_by = Some(UserRef::named(name));
    }
    execution
}

/// Map a canonical execution to a Visure run payload.
#[must_use]
pub fn from_execution(execution: &TestExecution) -> Value {
    let mut body = Map::new();
    body.insert("testCaseId".into(), json!(execution.test_case_id));
    if let Some(cycle) = &execution.cycle_id {
        body.insert("cycleId".into(), json!(cycle));
    }
    body.insert(
        "status".into(),
        json!(from_canonical_run_status(execution.status)),
    );
    if let Some(at) = execution.executed_at {
        body.insert(
            "executedAt".into(),
            json!(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }
    if let Some(duration) = execution.duration_seconds {
        body.insert("durationSeconds".into(), json!(duration));
    }
    if !execution.comment.is_empty() {
        body.insert("comment".into(), json!(execution.comment));
    }
    Value::Object(body)
}

/// Map a Visure folder.
#[must_use]
pub fn to_folder(raw: &Value, parent_path: Option<&str>) -> Folder {
    let name = str_of(raw, "name");
    let path = match parent_path {
        Some(parent) => format!("{parent}/{name}"),
        None => format!("/{name}"),
    };
    Folder {
        id: id_of(raw, "id").unwrap_or_default(),
        name,
        path,
        parent_id: id_of(raw, "parentId"),
    }
}

/// Map a Visure project.
#[must_use]
pub fn to_project(raw: &Value) -> Project {
    Project {
        id: id_of(raw, "id").unwrap_or_default(),
        name: str_of(raw, "name"),
        key: str_of(raw, "code"),
    }
}

/// Map a Visure attachment reference.
#[must_use]
pub fn to_attachment(raw: &Value) -> Attachment {
    let mut attachment = Attachment::new(
        id_of(raw, "id").unwrap_or_default(),
        str_of(raw, "fileName"),
        raw.get("sizeBytes").and_then(Value::as_u64).unwrap_or(0),
    );
    if let Some(ct) = raw.get("contentType").and_then(Value::as_str) {
        attachment = attachment.with_content_type(ct);
    }
    attachment.created_at = date_of(raw, "createdAt");
    attachment
}

/// Map Visure attribute metadata to canonical definitions.
#[must_use]
pub fn to_field_definitions(raw: &Value) -> Vec<FieldDefinition> {
    page_items(raw)
        .iter()
        .map(|item| {
            let field_type = match str_of(item, "type").to_ascii_uppercase().as_str() {
                "STRING" => FieldType::String,
                "TEXT" => FieldType::Text,
                "NUMBER" => FieldType::Number,
                "INTEGER" => FieldType::Integer,
                "DATE" => FieldType::Date,
                "DATETIME" => FieldType::DateTime,
                "BOOLEAN" => FieldType::Boolean,
                "ENUM" => FieldType::Enum,
                "ARRAY" => FieldType::Array,
                "USER" => FieldType::User,
                "URL" => FieldType::Url,
                _ => FieldType::Custom,
            };
            FieldDefinition {
                id: id_of(item, "id").unwrap_or_default(),
                name: str_of(item, "name"),
                field_type,
                required: item
                    .get("required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                allowed_values: item
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|options| {
                        options
                            .iter()
                            .filter_map(Value::as_str)
                            .map(ToString::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                entity: skb_core::EntityType::TestCase,
            }
        })
        .collect()
}
