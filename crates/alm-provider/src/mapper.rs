// SPDX-License-Identifier: MIT OR Apache-2.0
//! HP ALM payload mapping.
//!
//! ALM's REST shape is an entity envelope: `{"entities": [{"Type": "test",
//! "Fields": [{"Name": "status", "values": [{"value": "Ready"}]}]}],
//! "TotalResults": n}`. Every attribute is a named field whose values are
//! strings; priorities look like `"3-High"` and test lifecycle states like
//! `"Design"` / `"Repair"`.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};
use skb_core::{
    Attachment, ExecutionStatus, FieldDefinition, FieldType, Folder, Priority, Project, TestCase,
    TestCaseStatus, TestCycle, TestExecution, TestStep, UserRef, infer,
};
use std::collections::BTreeMap;

/// ALM lifecycle tokens and their canonical mapping.
pub const STATUS_TABLE: &[(&str, TestCaseStatus)] = &[
    ("Design", TestCaseStatus::Draft),
    ("Ready", TestCaseStatus::Ready),
    ("Review", TestCaseStatus::ReadyForReview),
    ("Repair", TestCaseStatus::NeedsWork),
    ("Approved", TestCaseStatus::Approved),
    ("Obsolete", TestCaseStatus::Deprecated),
];

/// ALM priority tokens and their canonical mapping (forward direction;
/// `4-Very High` also collapses to HIGH).
pub const PRIORITY_TABLE: &[(&str, Priority)] = &[
    ("5-Urgent", Priority::Critical),
    ("4-Very High", Priority::High),
    ("3-High", Priority::High),
    ("2-Medium", Priority::Medium),
    ("1-Low", Priority::Low),
];

/// ALM run statuses and their canonical mapping.
pub const RUN_STATUS_TABLE: &[(&str, ExecutionStatus)] = &[
    ("Passed", ExecutionStatus::Passed),
    ("Failed", ExecutionStatus::Failed),
    ("Blocked", ExecutionStatus::Blocked),
    ("N/A", ExecutionStatus::NotApplicable),
    ("No Run", ExecutionStatus::Open),
    ("Not Completed", ExecutionStatus::Open),
];

/// Test-entity fields with canonical homes; the rest become custom fields
/// (`user-*`) or passthrough.
const STANDARD_FIELDS: &[&str] = &[
    "id",
    "name",
    "description",
    "status",
    "priority",
    "parent-id",
    "owner",
    "creation-time",
    "last-modified",
    "subtype-id",
    "steps",
];

// ---------------------------------------------------------------------------
// Enum tables
// ---------------------------------------------------------------------------

/// Lifecycle token → canonical status; unknown defaults to DRAFT.
#[must_use]
pub fn to_canonical_status(vendor: &str) -> TestCaseStatus {
    STATUS_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical status → lifecycle token.
#[must_use]
pub fn from_canonical_status(status: TestCaseStatus) -> &'static str {
    STATUS_TABLE
        .iter()
        .find(|(_, canonical)| *canonical == status)
        .map(|(token, _)| *token)
        .unwrap_or("Design")
}

/// Priority token → canonical priority; unknown defaults to MEDIUM.
#[must_use]
pub fn to_canonical_priority(vendor: &str) -> Priority {
    PRIORITY_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical priority → ALM token.
#[must_use]
pub fn from_canonical_priority(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "5-Urgent",
        Priority::High => "3-High",
        Priority::Medium => "2-Medium",
        Priority::Low => "1-Low",
    }
}

/// Run status → canonical execution status; unknown defaults to OPEN.
#[must_use]
pub fn to_canonical_run_status(vendor: &str) -> ExecutionStatus {
    RUN_STATUS_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical execution status → ALM run status.
#[must_use]
pub fn from_canonical_run_status(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Passed => "Passed",
        ExecutionStatus::Failed => "Failed",
        ExecutionStatus::Blocked => "Blocked",
        ExecutionStatus::NotApplicable => "N/A",
        ExecutionStatus::Open => "No Run",
    }
}

// ---------------------------------------------------------------------------
// Entity-envelope helpers
// ---------------------------------------------------------------------------

/// Entities of an ALM envelope.
#[must_use]
pub fn entities(raw: &Value) -> Vec<Value> {
    match raw.get("entities") {
        Some(Value::Array(items)) => items.clone(),
        _ => match raw {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        },
    }
}

/// Total of an ALM envelope, falling back to the entity count.
#[must_use]
pub fn total_results(raw: &Value) -> u64 {
    raw.get("TotalResults")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| entities(raw).len() as u64)
}

/// First value of a named field on an entity.
#[must_use]
pub fn field_value<'a>(entity: &'a Value, name: &str) -> Option<&'a str> {
    entity
        .get("Fields")?
        .as_array()?
        .iter()
        .find(|f| {
            f.get("Name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })?
        .get("values")?
        .as_array()?
        .first()?
        .get("value")?
        .as_str()
}

fn field_string(entity: &Value, name: &str) -> String {
    field_value(entity, name).unwrap_or_default().to_string()
}

fn field_date(entity: &Value, name: &str) -> Option<DateTime<Utc>> {
    let raw = field_value(entity, name)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // ALM dates commonly come as "2025-04-15" or "2025-04-15 14:30:45".
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Build an ALM entity from `(name, value)` pairs.
#[must_use]
pub fn entity(entity_type: &str, fields: &[(&str, String)]) -> Value {
    json!({
        "Type": entity_type,
        "Fields": fields
            .iter()
            .map(|(name, value)| json!({"Name": name, "values": [{"value": value}]}))
            .collect::<Vec<_>>(),
    })
}

// ---------------------------------------------------------------------------
// Test cases
// ---------------------------------------------------------------------------

/// Map an ALM test entity to the canonical model.
#[must_use]
pub fn to_test_case(raw: &Value, field_mappings: &BTreeMap<String, String>) -> TestCase {
    let mut tc = TestCase::new(field_string(raw, "id"), field_string(raw, "name"));
    tc.description = field_string(raw, "description");
    tc.status = to_canonical_status(&field_string(raw, "status"));
    tc.priority = to_canonical_priority(&field_string(raw, "priority"));
    let parent = field_string(raw, "parent-id");
    if !parent.is_empty() {
        tc.folder_id = Some(parent);
    }
    tc.created_at = field_date(raw, "creation-time");
    tc.updated_at = field_date(raw, "last-modified");
    let owner = field_string(raw, "owner");
    if !owner.is_empty() {
        tc.created_by = Some(UserRef::by_id(owner));
    }

    // user-* fields are ALM custom fields; anything else unknown is
    // preserved verbatim.
    if let Some(Value::Array(fields)) = raw.get("Fields") {
        for field in fields {
            let Some(name) = field.get("Name").and_then(Value::as_str) else {
                continue;
            };
            if STANDARD_FIELDS.contains(&name) {
                continue;
            }
            let value = field_value(raw, name).unwrap_or_default();
            if let Some(custom_name) = name.strip_prefix("user-") {
                let canonical_key = field_mappings
                    .iter()
                    .find(|(_, vendor)| vendor.as_str() == name || vendor.as_str() == custom_name)
                    .map(|(canonical, _)| canonical.clone())
                    .unwrap_or_else(|| custom_name.to_string());
                tc.custom_fields
                    .insert(canonical_key, infer(&Value::String(value.to_string())));
            } else {
                tc.retain_vendor_field(name.to_string(), json!(value));
            }
        }
    }
    tc
}

/// Map a canonical test case to an ALM test entity.
#[must_use]
pub fn from_test_case(tc: &TestCase, subtype: &str) -> Value {
    let mut extra: Vec<(String, String)> = Vec::new();
    for (key, value) in &tc.custom_fields {
        let rendered = match value.to_json() {
            Value::String(s) => s,
            other => other.to_string(),
        };
        extra.push((format!("user-{key}"), rendered));
    }
    if let Some(Value::Object(bag)) = tc.attributes.get(skb_core::CUSTOM_FIELDS_ATTR) {
        for (key, value) in bag {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            extra.push((key.clone(), rendered));
        }
    }

    let mut fields: Vec<(&str, String)> = vec![
        ("name", tc.title.clone()),
        ("status", from_canonical_status(tc.status).to_string()),
        ("priority", from_canonical_priority(tc.priority).to_string()),
        ("subtype-id", subtype.to_string()),
    ];
    if !tc.description.is_empty() {
        fields.push(("description", tc.description.clone()));
    }
    if let Some(folder) = &tc.folder_id {
        fields.push(("parent-id", folder.clone()));
    }
    for (name, value) in &extra {
        fields.push((name.as_str(), value.clone()));
    }
    entity("test", &fields)
}

// ---------------------------------------------------------------------------
// Steps, cycles, runs
// ---------------------------------------------------------------------------

/// Map design-step entities to ordered canonical steps.
#[must_use]
pub fn to_steps(raw: &Value) -> Vec<TestStep> {
    let mut items = entities(raw);
    items.sort_by_key(|item| {
        field_value(item, "step-order")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(u64::MAX)
    });
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            TestStep::new(
                idx as u32 + 1,
                field_string(item, "description"),
                field_string(item, "expected"),
            )
        })
        .collect()
}

/// Map one canonical step to a design-step entity.
#[must_use]
pub fn from_step(test_id: &str, step: &TestStep) -> Value {
    entity(
        "design-step",
        &[
            ("parent-id", test_id.to_string()),
            ("name", format!("Step {}", step.sequence)),
            ("step-order", step.sequence.to_string()),
            ("description", step.action.clone()),
            ("expected", step.expected_result.clone()),
        ],
    )
}

/// Map a test-set entity to a canonical cycle.
#[must_use]
pub fn to_cycle(raw: &Value) -> TestCycle {
    let mut cycle = TestCycle::new(field_string(raw, "id"), field_string(raw, "name"));
    cycle.description = field_string(raw, "description");
    cycle.status = field_string(raw, "status");
    cycle
}

/// Map a run entity to a canonical execution.
#[must_use]
pub fn to_execution(raw: &Value) -> TestExecution {
    let mut execution =
        TestExecution::new(field_string(raw, "id"), field_string(raw, "test-id"));
    let cycle = field_string(raw, "cycle-id");
    if !cycle.is_empty() {
        execution.cycle_id = Some(cycle);
    }
    execution.status = to_canonical_run_status(&field_string(raw, "status"));
    execution.executed_at = field_date(raw, "execution-date");
    execution.duration_seconds = field_value(raw, "duration").and_then(|v| v.parse().ok());
    let owner = field_string(raw, "owner");
    if !owner.is_empty() {
        execution.executed_by = Some(UserRef::by_id(owner));
    }
    execution.comment = field_string(raw, "comments");
    execution
}

/// Map a canonical execution to a run entity.
#[must_use]
pub fn from_execution(execution: &TestExecution) -> Value {
    let mut fields: Vec<(&str, String)> = vec![
        ("test-id", execution.test_case_id.clone()),
        (
            "status",
            from_canonical_run_status(execution.status).to_string(),
        ),
        ("subtype-id", "hp.qc.run.MANUAL".to_string()),
    ];
    if let Some(cycle) = &execution.cycle_id {
        fields.push(("cycle-id", cycle.clone()));
    }
    if let Some(at) = execution.executed_at {
        fields.push(("execution-date", at.format("%Y-%m-%d").to_string()));
        fields.push(("execution-time", at.format("%H:%M:%S").to_string()));
    }
    if let Some(duration) = execution.duration_seconds {
        fields.push(("duration", duration.to_string()));
    }
    if !execution.comment.is_empty() {
        fields.push(("comments", execution.comment.clone()));
    }
    entity("run", &fields)
}

// ---------------------------------------------------------------------------
// Folders, attachments, fields, projects
// ---------------------------------------------------------------------------

/// Map a test-folder entity to a canonical folder.
#[must_use]
pub fn to_folder(raw: &Value, parent_path: Option<&str>) -> Folder {
    let name = field_string(raw, "name");
    let path = match parent_path {
        Some(parent) => format!("{parent}/{name}"),
        None => format!("/{name}"),
    };
    let parent = field_string(raw, "parent-id");
    Folder {
        id: field_string(raw, "id"),
        name,
        path,
        parent_id: if parent.is_empty() || parent == "0" {
            None
        } else {
            Some(parent)
        },
    }
}

/// Map an attachment entity to the canonical model.
#[must_use]
pub fn to_attachment(raw: &Value) -> Attachment {
    let size = field_value(raw, "file-size")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut attachment =
        Attachment::new(field_string(raw, "id"), field_string(raw, "name"), size);
    attachment.created_at = field_date(raw, "last-modified");
    attachment
}

/// Map customization field metadata to canonical definitions.
#[must_use]
pub fn to_field_definitions(raw: &Value) -> Vec<FieldDefinition> {
    let items = match raw.get("Fields").and_then(|f| f.get("Field")) {
        Some(Value::Array(items)) => items.clone(),
        _ => entities(raw),
    };
    items
        .iter()
        .map(|item| {
            let type_token = item
                .get("Type")
                .and_then(Value::as_str)
                .or_else(|| field_value(item, "type"))
                .unwrap_or_default();
            let field_type = match type_token.to_ascii_lowercase().as_str() {
                "string" | "char" => FieldType::String,
                "memo" => FieldType::Text,
                "number" => FieldType::Number,
                "date" => FieldType::Date,
                "datetime" => FieldType::DateTime,
                "lookuplist" => FieldType::Enum,
                "userslist" => FieldType::User,
                _ => FieldType::Custom,
            };
            FieldDefinition {
                id: item
                    .get("Name")
                    .and_then(Value::as_str)
                    .or_else(|| field_value(item, "name"))
                    .unwrap_or_default()
                    .to_string(),
                name: item
                    .get("Label")
                    .and_then(Value::as_str)
                    .or_else(|| field_value(item, "label"))
                    .unwrap_or_default()
                    .to_string(),
                field_type,
                required: item
                    .get("Required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                allowed_values: Vec::new(),
                entity: skb_core::EntityType::TestCase,
            }
        })
        .collect()
}

/// Map a project listing entry.
#[must_use]
pub fn to_project(raw: &Value) -> Project {
    match raw {
        Value::String(name) => Project {
            id: name.clone(),
            name: name.clone(),
            key: String::new(),
        },
        _ => Project {
            id: field_string(raw, "id"),
            name: field_string(raw, "name"),
            key: String::new(),
        },
    }
}
