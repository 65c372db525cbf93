// SPDX-License-Identifier: MIT OR Apache-2.0
//! qTest payload mapping.
//!
//! qTest carries status, priority, and custom fields in a single
//! `properties` array of `{field_name, field_value, field_value_name}`
//! entries, numbers its priorities 1–4, and embeds steps either inline
//! (`test_steps`) or behind a separate call. Collections page as
//! `{"items": [..], "total": ..}`.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use skb_core::{
    Attachment, ExecutionStatus, FieldDefinition, FieldType, Folder, Priority, Project, StepResult,
    TestCase, TestCaseStatus, TestCycle, TestExecution, TestStep, UserRef, infer,
};
use std::collections::BTreeMap;

/// Vendor status tokens and their canonical mapping.
pub const STATUS_TABLE: &[(&str, TestCaseStatus)] = &[
    ("New", TestCaseStatus::Draft),
    ("Ready", TestCaseStatus::Ready),
    ("Ready for Review", TestCaseStatus::ReadyForReview),
    ("Needs Work", TestCaseStatus::NeedsWork),
    ("Approved", TestCaseStatus::Approved),
    ("Obsolete", TestCaseStatus::Deprecated),
];

/// Numeric vendor priorities and their canonical mapping. Text names map
/// through [`to_canonical_priority`] as well.
pub const PRIORITY_TABLE: &[(&str, Priority)] = &[
    ("1", Priority::Critical),
    ("2", Priority::High),
    ("3", Priority::Medium),
    ("4", Priority::Low),
];

/// Vendor execution-status tokens and their canonical mapping.
pub const EXECUTION_STATUS_TABLE: &[(&str, ExecutionStatus)] = &[
    ("PASSED", ExecutionStatus::Passed),
    ("FAILED", ExecutionStatus::Failed),
    ("BLOCKED", ExecutionStatus::Blocked),
    ("SKIP", ExecutionStatus::NotApplicable),
    ("UNEXECUTED", ExecutionStatus::Open),
    ("INCOMPLETE", ExecutionStatus::Open),
];

const STANDARD_FIELDS: &[&str] = &[
    "id",
    "pid",
    "name",
    "description",
    "precondition",
    "properties",
    "test_steps",
    "parent_id",
    "created_date",
    "last_modified_date",
    "creator",
    "links",
    "web_url",
];

// ---------------------------------------------------------------------------
// Enum tables
// ---------------------------------------------------------------------------

/// Vendor status token → canonical status; unknown tokens default to DRAFT.
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
        .unwrap_or("New")
}

/// Vendor priority (numeric `"1"`–`"4"` or text) → canonical priority;
/// anything else defaults to MEDIUM.
#[must_use]
pub fn to_canonical_priority(vendor: &str) -> Priority {
    let trimmed = vendor.trim();
    if let Some((_, canonical)) = PRIORITY_TABLE.iter().find(|(token, _)| *token == trimmed) {
        return *canonical;
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "critical" => Priority::Critical,
        "high" => Priority::High,
        "medium" => Priority::Medium,
        "low" => Priority::Low,
        _ => Priority::Medium,
    }
}

/// Canonical priority → the numeric vendor token.
#[must_use]
pub fn from_canonical_priority(priority: Priority) -> &'static str {
    PRIORITY_TABLE
        .iter()
        .find(|(_, canonical)| *canonical == priority)
        .map(|(token, _)| *token)
        .unwrap_or("3")
}

/// Vendor execution status → canonical; unknown tokens default to OPEN.
#[must_use]
pub fn to_canonical_execution_status(vendor: &str) -> ExecutionStatus {
    EXECUTION_STATUS_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical execution status → vendor token.
#[must_use]
pub fn from_canonical_execution_status(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Passed => "PASSED",
        ExecutionStatus::Failed => "FAILED",
        ExecutionStatus::Blocked => "BLOCKED",
        ExecutionStatus::NotApplicable => "SKIP",
        ExecutionStatus::Open => "UNEXECUTED",
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

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => id_string(map.get("id")),
        _ => None,
    }
}

fn date_of(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    raw.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// A property's effective value: the display name when present, else the
/// raw value.
fn property_value(prop: &Value) -> Option<&Value> {
    match prop.get("field_value_name") {
        Some(Value::String(s)) if !s.is_empty() => prop.get("field_value_name"),
        _ => prop.get("field_value"),
    }
}

/// Find a property by field name, case-insensitively.
fn property_named<'a>(raw: &'a Value, name: &str) -> Option<&'a Value> {
    raw.get("properties")?
        .as_array()?
        .iter()
        .find(|p| {
            p.get("field_name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(property_value)
}

/// Items of a qTest collection (`{"items": [..]}` or a bare array).
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

/// Total of a qTest collection, falling back to the item count.
#[must_use]
pub fn page_total(raw: &Value) -> u64 {
    raw.get("total")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| page_items(raw).len() as u64)
}

// ---------------------------------------------------------------------------
// Test cases
// ---------------------------------------------------------------------------

/// Map a qTest test case to the canonical model.
#[must_use]
pub fn to_test_case(raw: &Value, field_mappings: &BTreeMap<String, String>) -> TestCase {
    let id = id_string(raw.get("id")).unwrap_or_default();
    let mut tc = TestCase::new(id, str_of(raw, "name"));
    tc.key = raw
        .get("pid")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    tc.description = str_of(raw, "description");
    tc.precondition = str_of(raw, "precondition");
    tc.folder_id = id_string(raw.get("parent_id"));
    tc.created_at = date_of(raw, "created_date");
    tc.updated_at = date_of(raw, "last_modified_date");
    if let Some(Value::Object(creator)) = raw.get("creator") {
        let display_name = creator
            .get("display_name")
            .or_else(|| creator.get("displayName"))
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let user_id = id_string(creator.get("id"));
        if display_name.is_some() || user_id.is_some() {
            tc.created_by = Some(UserRef {
                id: user_id,
                display_name,
            });
        }
    }

    tc.status = property_named(raw, "Status")
        .and_then(Value::as_str)
        .map(to_canonical_status)
        .unwrap_or_default();
    tc.priority = property_named(raw, "Priority")
        .map(|v| match v {
            Value::String(s) => to_canonical_priority(s),
            Value::Number(n) => to_canonical_priority(&n.to_string()),
            _ => Priority::Medium,
        })
        .unwrap_or_default();

    // Remaining properties are custom fields.
    if let Some(Value::Array(properties)) = raw.get("properties") {
        for prop in properties {
            let Some(name) = prop.get("field_name").and_then(Value::as_str) else {
                continue;
            };
            if name.eq_ignore_ascii_case("Status") || name.eq_ignore_ascii_case("Priority") {
                continue;
            }
            let Some(value) = property_value(prop) else {
                continue;
            };
            let canonical_key = field_mappings
                .iter()
                .find(|(_, vendor)| vendor.as_str() == name)
                .map(|(canonical, _)| canonical.clone())
                .unwrap_or_else(|| name.to_string());
            tc.custom_fields.insert(canonical_key, infer(value));
        }
    }

    if let Some(Value::Array(raw_steps)) = raw.get("test_steps") {
        tc.steps = steps_from_items(raw_steps);
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

/// Map a canonical test case to the qTest create payload.
#[must_use]
pub fn from_test_case(tc: &TestCase) -> Value {
    let mut body = Map::new();
    body.insert("name".into(), json!(tc.title));
    if !tc.description.is_empty() {
        body.insert("description".into(), json!(tc.description));
    }
    if !tc.precondition.is_empty() {
        body.insert("precondition".into(), json!(tc.precondition));
    }
    if let Some(folder) = &tc.folder_id {
        match folder.parse::<i64>() {
            Ok(n) => body.insert("parent_id".into(), json!(n)),
            Err(_) => body.insert("parent_id".into(), json!(folder)),
        };
    }
    let mut properties = vec![
        json!({"field_name": "Status", "field_value": from_canonical_status(tc.status)}),
        json!({"field_name": "Priority", "field_value": from_canonical_priority(tc.priority)}),
    ];
    for (key, value) in &tc.custom_fields {
        properties.push(json!({"field_name": key, "field_value": value.to_json()}));
    }
    body.insert("properties".into(), Value::Array(properties));
    if !tc.steps.is_empty() {
        body.insert("test_steps".into(), from_steps(&tc.steps));
    }
    if let Some(Value::Object(bag)) = tc.attributes.get(skb_core::CUSTOM_FIELDS_ATTR) {
        for (key, value) in bag {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    Value::Object(body)
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn steps_from_items(items: &[Value]) -> Vec<TestStep> {
    let mut ordered: Vec<&Value> = items.iter().collect();
    // qTest orders by the `order` attribute when present; ties keep the
    // payload order.
    ordered.sort_by_key(|item| item.get("order").and_then(Value::as_u64).unwrap_or(u64::MAX));
    ordered
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let mut step = TestStep::new(
                idx as u32 + 1,
                str_of(item, "description"),
                str_of(item, "expected"),
            );
            let data = str_of(item, "test_data");
            if !data.is_empty() {
                step.test_data = Some(data);
            }
            step
        })
        .collect()
}

/// Map a qTest step collection to ordered canonical steps.
#[must_use]
pub fn to_steps(raw: &Value) -> Vec<TestStep> {
    steps_from_items(&page_items(raw))
}

/// Map canonical steps to the qTest write payload.
#[must_use]
pub fn from_steps(steps: &[TestStep]) -> Value {
    Value::Array(
        steps
            .iter()
            .map(|s| {
                json!({
                    "order": s.sequence,
                    "description": s.action,
                    "expected": s.expected_result,
                })
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Cycles & executions
// ---------------------------------------------------------------------------

/// Map a qTest test cycle to the canonical model.
#[must_use]
pub fn to_cycle(raw: &Value) -> TestCycle {
    let id = id_string(raw.get("id")).unwrap_or_default();
    let mut cycle = TestCycle::new(id, str_of(raw, "name"));
    cycle.description = str_of(raw, "description");
    cycle.planned_start = date_of(raw, "start_date");
    cycle.planned_end = date_of(raw, "end_date");
    cycle
}

/// Map a canonical cycle to the qTest create payload.
#[must_use]
pub fn from_cycle(cycle: &TestCycle) -> Value {
    let mut body = Map::new();
    body.insert("name".into(), json!(cycle.name));
    if !cycle.description.is_empty() {
        body.insert("description".into(), json!(cycle.description));
    }
    Value::Object(body)
}

/// Map a qTest test log to a canonical execution.
#[must_use]
pub fn to_execution(raw: &Value) -> TestExecution {
    let id = id_string(raw.get("id")).unwrap_or_default();
    let test_case_id = id_string(raw.get("test_case")).unwrap_or_default();
    let mut execution = TestExecution::new(id, test_case_id);
    execution.cycle_id = id_string(raw.get("test_cycle"));
    execution.status = raw
        .get("status")
        .and_then(|s| match s {
            Value::String(token) => Some(to_canonical_execution_status(token)),
            Value::Object(map) => map
                .get("name")
                .and_then(Value::as_str)
                .map(to_canonical_execution_status),
            _ => None,
        })
        .unwrap_or_default();
    execution.executed_at = date_of(raw, "exe_end_date");
    execution.comment = str_of(raw, "note");
    if let (Some(start), Some(end)) = (date_of(raw, "exe_start_date"), date_of(raw, "exe_end_date"))
    {
        let seconds = (end - start).num_seconds();
        if seconds >= 0 {
            execution.duration_seconds = Some(seconds as u64);
        }
    }
    if let Some(Value::Array(step_logs)) = raw.get("test_step_logs") {
        execution.step_results = step_logs
            .iter()
            .enumerate()
            .map(|(idx, log)| StepResult {
                step_id: id_string(log.get("test_step_id")),
                sequence: log
                    .get("order")
                    .and_then(Value::as_u64)
                    .map(|o| o as u32)
                    .unwrap_or(idx as u32 + 1),
                status: log
                    .get("status")
                    .and_then(|s| match s {
                        Value::String(token) => Some(to_canonical_execution_status(token)),
                        Value::Object(map) => map
                            .get("name")
                            .and_then(Value::as_str)
                            .map(to_canonical_execution_status),
                        _ => None,
                    })
                    .unwrap_or_default(),
                actual_result: str_of(log, "actual_result"),
                comment: String::new(),
            })
            .collect();
    }
    execution
}

/// Map a canonical execution to a qTest auto-test-log entry.
#[must_use]
pub fn from_execution(execution: &TestExecution) -> Value {
    let mut body = Map::new();
    body.insert(
        "status".into(),
        json!(from_canonical_execution_status(execution.status)),
    );
    body.insert("name".into(), json!(format!("Run of {}", execution.test_case_id)));
    if let Ok(case_id) = execution.test_case_id.parse::<i64>() {
        body.insert("test_case".into(), json!({"id": case_id}));
    } else {
        body.insert("test_case".into(), json!({"id": execution.test_case_id}));
    }
    if let Some(at) = execution.executed_at {
        let stamp = at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        body.insert("exe_end_date".into(), json!(stamp));
        if let Some(duration) = execution.duration_seconds {
            let start = at - chrono::Duration::seconds(duration as i64);
            body.insert(
                "exe_start_date".into(),
                json!(start.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            );
        }
    }
    if !execution.comment.is_empty() {
        body.insert("note".into(), json!(execution.comment));
    }
    if !execution.step_results.is_empty() {
        body.insert(
            "test_step_logs".into(),
            Value::Array(
                execution
                    .step_results
                    .iter()
                    .map(|r| {
                        json!({
                            "order": r.sequence,
                            "status": from_canonical_execution_status(r.status),
                            "actual_result": r.actual_result,
                        })
                    })
                    .collect(),
            ),
        );
    }
    Value::Object(body)
}

// ---------------------------------------------------------------------------
// Attachments, fields, folders, projects
// ---------------------------------------------------------------------------

/// Map a qTest attachment listing to canonical attachments.
#[must_use]
pub fn to_attachments(raw: &Value) -> Vec<Attachment> {
    page_items(raw)
        .iter()
        .map(|item| {
            let id = id_string(item.get("id")).unwrap_or_default();
            let size = item.get("size").and_then(Value::as_u64).unwrap_or(0);
            let mut attachment = Attachment::new(id, str_of(item, "name"), size);
            if let Some(ct) = item.get("content_type").and_then(Value::as_str) {
                attachment = attachment.with_content_type(ct);
            }
            attachment.created_at = date_of(item, "created_date");
            attachment
        })
        .collect()
}

fn field_type_of(vendor: &str) -> FieldType {
    match vendor.to_ascii_uppercase().as_str() {
        "TEXT" | "STRING" => FieldType::String,
        "RICH_TEXT" | "LONG_TEXT" => FieldType::Text,
        "NUMBER" => FieldType::Number,
        "INTEGER" => FieldType::Integer,
        "DATE" => FieldType::Date,
        "DATE_TIME" | "DATETIME" => FieldType::DateTime,
        "CHECKBOX" => FieldType::Boolean,
        "COMBOBOX" | "RADIO" => FieldType::Enum,
        "MULTIPLE_SELECTION" | "CHECKBOX_LIST" => FieldType::Array,
        "USER_LIST" => FieldType::User,
        "URL" => FieldType::Url,
        _ => FieldType::Custom,
    }
}

/// Map a qTest field-settings listing to canonical definitions.
#[must_use]
pub fn to_field_definitions(raw: &Value) -> Vec<FieldDefinition> {
    page_items(raw)
        .iter()
        .map(|item| FieldDefinition {
            id: id_string(item.get("id")).unwrap_or_default(),
            name: str_of(item, "label"),
            field_type: field_type_of(&str_of(item, "data_type")),
            required: item
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            allowed_values: item
                .get("allowed_values")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| {
                            v.get("label")
                                .or_else(|| v.get("value"))
                                .and_then(Value::as_str)
                                .map(ToString::to_string)
                        })
                        .collect()
                })
                .unwrap_or_default(),
            entity: skb_core::EntityType::TestCase,
        })
        .collect()
}

/// Map a qTest module to a canonical folder.
#[must_use]
pub fn to_folder(raw: &Value, parent_path: Option<&str>) -> Folder {
    let name = str_of(raw, "name");
    let path = match parent_path {
        Some(parent) => format!("{parent}/{name}"),
        None => format!("/{name}"),
    };
    Folder {
        id: id_string(raw.get("id")).unwrap_or_default(),
        name,
        path,
        parent_id: id_string(raw.get("parent_id")),
    }
}

/// Map a qTest project to the canonical model.
#[must_use]
pub fn to_project(raw: &Value) -> Project {
    Project {
        id: id_string(raw.get("id")).unwrap_or_default(),
        name: str_of(raw, "name"),
        key: String::new(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skb_core::FieldValue;

    fn no_mappings() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    // -- priority table -----------------------------------------------------

    #[test]
    fn numeric_priorities_map_one_to_four() {
        assert_eq!(to_canonical_priority("1"), Priority::Critical);
        assert_eq!(to_canonical_priority("2"), Priority::High);
        assert_eq!(to_canonical_priority("3"), Priority::Medium);
        assert_eq!(to_canonical_priority("4"), Priority::Low);
    }

    #[test]
    fn text_priorities_map_identically() {
        assert_eq!(to_canonical_priority("critical"), Priority::Critical);
        assert_eq!(to_canonical_priority("high"), Priority::High);
        assert_eq!(to_canonical_priority("medium"), Priority::Medium);
        assert_eq!(to_canonical_priority("low"), Priority::Low);
        assert_eq!(to_canonical_priority("CRITICAL"), Priority::Critical);
    }

    #[test]
    fn other_priorities_default_to_medium() {
        for token in ["0", "5", "urgent", "", "  "] {
            assert_eq!(to_canonical_priority(token), Priority::Medium, "{token:?}");
        }
    }

    #[test]
    fn priority_round_trips() {
        for priority in Priority::ALL {
            assert_eq!(
                to_canonical_priority(from_canonical_priority(*priority)),
                *priority
            );
        }
    }

    #[test]
    fn status_round_trips() {
        for status in TestCaseStatus::ALL {
            assert_eq!(to_canonical_status(from_canonical_status(*status)), *status);
        }
    }

    #[test]
    fn execution_status_round_trips() {
        for status in ExecutionStatus::ALL {
            assert_eq!(
                to_canonical_execution_status(from_canonical_execution_status(*status)),
                *status
            );
        }
    }

    // -- test case mapping --------------------------------------------------

    fn sample_case() -> Value {
        json!({
            "id": 901,
            "pid": "TC-17",
            "name": "Checkout total",
            "description": "verify totals",
            "precondition": "cart has items",
            "parent_id": 44,
            "created_date": "2025-02-01T08:00:00Z",
            "creator": {"id": 5, "display_name": "Ola"},
            "properties": [
                {"field_id": 1, "field_name": "Status", "field_value": "Approved"},
                {"field_id": 2, "field_name": "Priority", "field_value": "2"},
                {"field_id": 3, "field_name": "Automation", "field_value": "true"},
                {"field_id": 4, "field_name": "Component", "field_value": "3",
                 "field_value_name": "Checkout"}
            ],
            "test_steps": [
                {"id": 1, "order": 2, "description": "pay", "expected": "receipt"},
                {"id": 2, "order": 1, "description": "add item", "expected": "in cart"}
            ]
        })
    }

    #[test]
    fn properties_feed_status_priority_and_custom_fields() {
        let tc = to_test_case(&sample_case(), &no_mappings());
        assert_eq!(tc.id, "901");
        assert_eq!(tc.key.as_deref(), Some("TC-17"));
        assert_eq!(tc.status, TestCaseStatus::Approved);
        assert_eq!(tc.priority, Priority::High);
        assert_eq!(tc.folder_id.as_deref(), Some("44"));
        assert_eq!(tc.custom_fields["Automation"], FieldValue::Boolean(true));
        // Display name wins over the raw enum id.
        assert_eq!(
            tc.custom_fields["Component"],
            FieldValue::Text("Checkout".into())
        );
        assert!(!tc.custom_fields.contains_key("Status"));
    }

    #[test]
    fn inline_steps_are_ordered_by_the_order_attribute() {
        let tc = to_test_case(&sample_case(), &no_mappings());
        assert_eq!(tc.steps.len(), 2);
        assert_eq!(tc.steps[0].action, "add item");
        assert_eq!(tc.steps[1].action, "pay");
        assert_eq!(
            tc.steps.iter().map(|s| s.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn empty_and_odd_payloads_yield_defaults() {
        for raw in [json!({}), json!(null), json!("x"), json!({"properties": "bad"})] {
            let tc = to_test_case(&raw, &no_mappings());
            assert_eq!(tc.status, TestCaseStatus::Draft);
            assert_eq!(tc.priority, Priority::Medium);
        }
    }

    #[test]
    fn unrecognised_fields_are_retained() {
        let raw = json!({"id": 1, "name": "t", "agent_hint": {"x": 1}});
        let tc = to_test_case(&raw, &no_mappings());
        assert_eq!(tc.vendor_field("agent_hint"), Some(&json!({"x": 1})));
        let out = from_test_case(&tc);
        assert_eq!(out["agent_hint"], json!({"x": 1}));
    }

    #[test]
    fn write_payload_carries_status_and_priority_properties() {
        let mut tc = TestCase::new("1", "Case");
        tc.status = TestCaseStatus::NeedsWork;
        tc.priority = Priority::Critical;
        tc.custom_fields
            .insert("Component".into(), FieldValue::Text("API".into()));
        let out = from_test_case(&tc);
        let properties = out["properties"].as_array().expect("properties");
        let find = |name: &str| {
            properties
                .iter()
                .find(|p| p["field_name"] == json!(name))
                .map(|p| p["field_value"].clone())
        };
        assert_eq!(find("Status"), Some(json!("Needs Work")));
        assert_eq!(find("Priority"), Some(json!("1")));
        assert_eq!(find("Component"), Some(json!("API")));
    }

    #[test]
    fn steps_round_trip_through_write_shape() {
        let steps = vec![
            TestStep::new(1, "a", "ra"),
            TestStep::new(2, "b", "rb"),
        ];
        let wire = from_steps(&steps);
        let back = to_steps(&wire);
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].action, "a");
        assert_eq!(back[1].sequence, 2);
    }

    // -- executions ---------------------------------------------------------

    #[test]
    fn test_log_maps_to_execution() {
        let raw = json!({
            "id": 31,
            "test_case": {"id": 901},
            "test_cycle": {"id": 12},
            "status": {"name": "FAILED"},
            "exe_start_date": "2025-03-01T10:00:00Z",
            "exe_end_date": "2025-03-01T10:02:05Z",
            "note": "checkout broke",
            "test_step_logs": [
                {"order": 1, "status": {"name": "PASSED"}, "actual_result": "ok"},
                {"order": 2, "status": {"name": "FAILED"}, "actual_result": "500"}
            ]
        });
        let execution = to_execution(&raw);
        assert_eq!(execution.test_case_id, "901");
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.duration_seconds, Some(125));
        assert_eq!(execution.step_results.len(), 2);
        assert_eq!(execution.step_results[1].status, ExecutionStatus::Failed);
    }

    #[test]
    fn execution_write_shape_round_trips_status() {
        let mut execution = TestExecution::new("1", "901");
        execution.status = ExecutionStatus::NotApplicable;
        let wire = from_execution(&execution);
        assert_eq!(wire["status"], json!("SKIP"));
        let back = to_execution(&json!({
            "id": 1, "test_case": {"id": 901}, "status": wire["status"]
        }));
        assert_eq!(back.status, ExecutionStatus::NotApplicable);
    }

    // -- fields / folders ---------------------------------------------------

    #[test]
    fn field_settings_map_types() {
        let raw = json!([
            {"id": 1, "label": "Points", "data_type": "NUMBER", "required": true},
            {"id": 2, "label": "Area", "data_type": "COMBOBOX",
             "allowed_values": [{"label": "API", "value": "1"}, {"label": "UI", "value": "2"}]}
        ]);
        let defs = to_field_definitions(&raw);
        assert_eq!(defs[0].field_type, FieldType::Number);
        assert_eq!(defs[1].field_type, FieldType::Enum);
        assert_eq!(defs[1].allowed_values, vec!["API", "UI"]);
    }

    #[test]
    fn folder_paths_concatenate() {
        let root = to_folder(&json!({"id": 1, "name": "Suite"}), None);
        let child = to_folder(&json!({"id": 2, "name": "Smoke", "parent_id": 1}), Some(&root.path));
        assert_eq!(child.path, "/Suite/Smoke");
    }

    #[test]
    fn page_helpers_accept_both_shapes() {
        assert_eq!(page_items(&json!({"items": [1], "total": 9})).len(), 1);
        assert_eq!(page_items(&json!([1, 2])).len(), 2);
        assert_eq!(page_total(&json!({"items": [1], "total": 9})), 9);
        assert_eq!(page_total(&json!([1, 2])), 2);
    }
}
