// SPDX-License-Identifier: MIT OR Apache-2.0
//! Zephyr Scale payload mapping.
//!
//! Zephyr wraps enum values in `{"id": .., "name": ".."}` objects on reads
//! but accepts bare names on writes, ships custom fields as an untyped
//! `customFields` bag, and pages collections as `{"values": [..],
//! "total": ..}`. Mapping is total: missing fields fall back to the
//! canonical defaults and unrecognised fields are preserved in the
//! passthrough bag.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use skb_core::{
    Attachment, ExecutionStatus, FieldDefinition, FieldType, Folder, Priority, Project, TestCase,
    TestCaseStatus, TestCycle, TestExecution, TestStep, UserRef, infer,
};
use std::collections::BTreeMap;

/// Vendor status tokens and their canonical mapping. Exposed so tests can
/// assert the table directly.
pub const STATUS_TABLE: &[(&str, TestCaseStatus)] = &[
    ("Draft", TestCaseStatus::Draft),
    ("Ready", TestCaseStatus::Ready),
    ("In Review", TestCaseStatus::ReadyForReview),
    ("Needs Work", TestCaseStatus::NeedsWork),
    ("Approved", TestCaseStatus::Approved),
    ("Deprecated", TestCaseStatus::Deprecated),
];

/// Vendor priority tokens and their canonical mapping.
pub const PRIORITY_TABLE: &[(&str, Priority)] = &[
    ("Critical", Priority::Critical),
    ("High", Priority::High),
    ("Normal", Priority::Medium),
    ("Low", Priority::Low),
];

/// Vendor execution-status tokens and their canonical mapping.
pub const EXECUTION_STATUS_TABLE: &[(&str, ExecutionStatus)] = &[
    ("Pass", ExecutionStatus::Passed),
    ("Fail", ExecutionStatus::Failed),
    ("Blocked", ExecutionStatus::Blocked),
    ("Not Applicable", ExecutionStatus::NotApplicable),
    ("Not Executed", ExecutionStatus::Open),
    ("In Progress", ExecutionStatus::Open),
];

/// Top-level test-case fields the mapper recognises; anything else lands in
/// the passthrough bag.
const STANDARD_FIELDS: &[&str] = &[
    "id",
    "key",
    "name",
    "objective",
    "precondition",
    "status",
    "priority",
    "folder",
    "labels",
    "customFields",
    "owner",
    "createdOn",
    "createdBy",
    "modifiedOn",
    "modifiedBy",
    "description",
    "testScript",
    "project",
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
        .unwrap_or("Draft")
}

/// Vendor priority token → canonical priority; unknown tokens default to
/// MEDIUM.
#[must_use]
pub fn to_canonical_priority(vendor: &str) -> Priority {
    if vendor.eq_ignore_ascii_case("Medium") {
        // Accept the canonical spelling too; Zephyr itself says "Normal".
        return Priority::Medium;
    }
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
        .unwrap_or("Normal")
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
        ExecutionStatus::Passed => "Pass",
        ExecutionStatus::Failed => "Fail",
        ExecutionStatus::Blocked => "Blocked",
        ExecutionStatus::NotApplicable => "Not Applicable",
        ExecutionStatus::Open => "Not Executed",
    }
}

// ---------------------------------------------------------------------------
// Shape helpers
// ---------------------------------------------------------------------------

/// Zephyr wraps enums as `{"name": ".."}` on reads; writes take bare
/// strings. Accept both.
fn name_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        _ => None,
    }
}

fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => match map.get("id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn str_of(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn date_of(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    raw.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn user_of(raw: &Value, key: &str) -> Option<UserRef> {
    match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(UserRef::by_id(s.clone())),
        Value::Object(map) => {
            let id = map
                .get("accountId")
                .or_else(|| map.get("id"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            let display_name = map
                .get("displayName")
                .and_then(Value::as_str)
                .map(ToString::to_string);
            if id.is_none() && display_name.is_none() {
                None
            } else {
                Some(UserRef { id, display_name })
            }
        }
        _ => None,
    }
}

/// Items of a Zephyr collection page (`{"values": [...]}`), tolerating a
/// bare array.
#[must_use]
pub fn page_values(raw: &Value) -> Vec<Value> {
    match raw.get("values") {
        Some(Value::Array(items)) => items.clone(),
        _ => match raw {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        },
    }
}

/// Total count of a Zephyr collection page, falling back to the item count.
#[must_use]
pub fn page_total(raw: &Value) -> u64 {
    raw.get("total")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| page_values(raw).len() as u64)
}

// ---------------------------------------------------------------------------
// Test cases
// ---------------------------------------------------------------------------

/// Map a Zephyr test case to the canonical model.
///
/// `field_mappings` renames vendor custom fields into canonical keys
/// (canonical key → vendor field name).
#[must_use]
pub fn to_test_case(raw: &Value, field_mappings: &BTreeMap<String, String>) -> TestCase {
    let id = id_of(raw.get("id")).unwrap_or_default();
    let mut tc = TestCase::new(id, str_of(raw, "name"));
    tc.key = raw
        .get("key")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    tc.description = str_of(raw, "description");
    tc.objective = str_of(raw, "objective");
    tc.precondition = str_of(raw, "precondition");
    tc.status = name_of(raw.get("status"))
        .map(|s| to_canonical_status(&s))
        .unwrap_or_default();
    tc.priority = name_of(raw.get("priority"))
        .map(|p| to_canonical_priority(&p))
        .unwrap_or_default();
    tc.folder_id = id_of(raw.get("folder"));
    tc.created_at = date_of(raw, "createdOn");
    tc.updated_at = date_of(raw, "modifiedOn");
    tc.created_by = user_of(raw, "createdBy").or_else(|| user_of(raw, "owner"));
    tc.updated_by = user_of(raw, "modifiedBy");
    if let Some(Value::Array(labels)) = raw.get("labels") {
        tc.labels = labels
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect();
    }

    // Custom fields: apply configured renames, then shape inference.
    if let Some(Value::Object(custom)) = raw.get("customFields") {
        for (vendor_name, value) in custom {
            let canonical_key = field_mappings
                .iter()
                .find(|(_, vendor)| vendor.as_str() == vendor_name)
                .map(|(canonical, _)| canonical.clone())
                .unwrap_or_else(|| vendor_name.clone());
            tc.custom_fields.insert(canonical_key, infer(value));
        }
    }

    // Unrecognised top-level fields survive the round trip verbatim.
    if let Value::Object(map) = raw {
        for (key, value) in map {
            if !STANDARD_FIELDS.contains(&key.as_str()) {
                tc.retain_vendor_field(key.clone(), value.clone());
            }
        }
    }
    tc
}

/// Map a canonical test case back to a Zephyr create/update payload.
#[must_use]
pub fn from_test_case(tc: &TestCase, project_key: &str) -> Value {
    let mut body = Map::new();
    body.insert("projectKey".into(), json!(project_key));
    body.insert("name".into(), json!(tc.title));
    if let Some(key) = &tc.key {
        body.insert("key".into(), json!(key));
    }
    if !tc.description.is_empty() {
        body.insert("description".into(), json!(tc.description));
    }
    if !tc.objective.is_empty() {
        body.insert("objective".into(), json!(tc.objective));
    }
    if !tc.precondition.is_empty() {
        body.insert("precondition".into(), json!(tc.precondition));
    }
    body.insert("statusName".into(), json!(from_canonical_status(tc.status)));
    body.insert(
        "priorityName".into(),
        json!(from_canonical_priority(tc.priority)),
    );
    if let Some(folder) = &tc.folder_id {
        body.insert("folderId".into(), folder_id_value(folder));
    }
    if !tc.labels.is_empty() {
        body.insert("labels".into(), json!(tc.labels));
    }
    if !tc.custom_fields.is_empty() {
        let mut custom = Map::new();
        for (key, value) in &tc.custom_fields {
            custom.insert(key.clone(), value.to_json());
        }
        body.insert("customFields".into(), Value::Object(custom));
    }
    // Restore preserved vendor fields.
    if let Some(Value::Object(bag)) = tc.attributes.get(skb_core::CUSTOM_FIELDS_ATTR) {
        for (key, value) in bag {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    Value::Object(body)
}

fn folder_id_value(folder: &str) -> Value {
    match folder.parse::<i64>() {
        Ok(n) => json!(n),
        Err(_) => json!(folder),
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Map a Zephyr test-step collection to ordered canonical steps.
///
/// Sequences are assigned from vendor order, 1-based, regardless of what
/// the payload claims.
#[must_use]
pub fn to_steps(raw: &Value) -> Vec<TestStep> {
    page_values(raw)
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let inline = item.get("inline").unwrap_or(item);
            let mut step = TestStep::new(
                idx as u32 + 1,
                str_of(inline, "description"),
                str_of(inline, "expectedResult"),
            );
            let data = str_of(inline, "testData");
            if !data.is_empty() {
                step.test_data = Some(data);
            }
            step
        })
        .collect()
}

/// Map canonical steps to the Zephyr write payload.
#[must_use]
pub fn from_steps(steps: &[TestStep]) -> Value {
    json!({
        "mode": "OVERWRITE",
        "items": steps
            .iter()
            .map(|s| {
                json!({
                    "inline": {
                        "description": s.action,
                        "testData": s.test_data.clone().unwrap_or_default(),
                        "expectedResult": s.expected_result,
                    }
                })
            })
            .collect::<Vec<_>>(),
    })
}

// ---------------------------------------------------------------------------
// Cycles & executions
// ---------------------------------------------------------------------------

/// Map a Zephyr test cycle to the canonical model.
#[must_use]
pub fn to_cycle(raw: &Value) -> TestCycle {
    let id = id_of(raw.get("id")).unwrap_or_default();
    let mut cycle = TestCycle::new(id, str_of(raw, "name"));
    cycle.description = str_of(raw, "description");
    cycle.status = name_of(raw.get("status")).unwrap_or_default();
    cycle.environment = name_of(raw.get("environment"));
    cycle.planned_start = date_of(raw, "plannedStartDate");
    cycle.planned_end = date_of(raw, "plannedEndDate");
    if let Some(Value::Array(items)) = raw.get("items") {
        cycle.test_case_ids = items
            .iter()
            .filter_map(|i| id_of(i.get("testCaseId").or_else(|| i.get("testCase"))))
            .collect();
    }
    cycle
}

/// Map a canonical cycle to the Zephyr create payload.
#[must_use]
pub fn from_cycle(cycle: &TestCycle, project_key: &str) -> Value {
    let mut body = Map::new();
    body.insert("projectKey".into(), json!(project_key));
    body.insert("name".into(), json!(cycle.name));
    if !cycle.description.is_empty() {
        body.insert("description".into(), json!(cycle.description));
    }
    if let Some(start) = cycle.planned_start {
        body.insert(
            "plannedStartDate".into(),
            json!(start.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }
    if let Some(end) = cycle.planned_end {
        body.insert(
            "plannedEndDate".into(),
            json!(end.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }
    Value::Object(body)
}

/// Map a Zephyr test execution to the canonical model.
#[must_use]
pub fn to_execution(raw: &Value) -> TestExecution {
    let id = id_of(raw.get("id")).unwrap_or_default();
    let test_case_id = id_of(raw.get("testCase")).unwrap_or_default();
    let mut execution = TestExecution::new(id, test_case_id);
    execution.cycle_id = id_of(raw.get("testCycle"));
    execution.status = name_of(raw.get("testExecutionStatus"))
        .map(|s| to_canonical_execution_status(&s))
        .unwrap_or_default();
    execution.executed_at = date_of(raw, "actualEndDate");
    execution.executed_by = user_of(raw, "executedBy");
    execution.environment = name_of(raw.get("environment"));
    execution.duration_seconds = raw
        .get("executionTime")
        .and_then(Value::as_u64)
        .map(|ms| ms / 1_000);
    execution.comment = str_of(raw, "comment");
    if let Some(Value::Array(results)) = raw.get("testScriptResults") {
        execution.step_results = results
            .iter()
            .enumerate()
            .map(|(idx, r)| skb_core::StepResult {
                step_id: id_of(r.get("id")),
                sequence: idx as u32 + 1,
                status: name_of(r.get("status"))
                    .map(|s| to_canonical_execution_status(&s))
                    .unwrap_or_default(),
                actual_result: str_of(r, "actualResult"),
                comment: str_of(r, "comment"),
            })
            .collect();
    }
    if let Some(Value::Object(custom)) = raw.get("customFields") {
        for (name, value) in custom {
            execution.custom_fields.insert(name.clone(), infer(value));
        }
    }
    execution
}

/// Map a canonical execution to the Zephyr create payload.
#[must_use]
pub fn from_execution(execution: &TestExecution, project_key: &str) -> Value {
    let mut body = Map::new();
    body.insert("projectKey".into(), json!(project_key));
    body.insert("testCaseKey".into(), json!(execution.test_case_id));
    if let Some(cycle) = &execution.cycle_id {
        body.insert("testCycleKey".into(), json!(cycle));
    }
    body.insert(
        "statusName".into(),
        json!(from_canonical_execution_status(execution.status)),
    );
    if let Some(at) = execution.executed_at {
        body.insert(
            "actualEndDate".into(),
            json!(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }
    if let Some(env) = &execution.environment {
        body.insert("environmentName".into(), json!(env));
    }
    if let Some(duration) = execution.duration_seconds {
        body.insert("executionTime".into(), json!(duration * 1_000));
    }
    if !execution.comment.is_empty() {
        body.insert("comment".into(), json!(execution.comment));
    }
    if !execution.step_results.is_empty() {
        body.insert(
            "testScriptResults".into(),
            Value::Array(
                execution
                    .step_results
                    .iter()
                    .map(|r| {
                        json!({
                            "statusName": from_canonical_execution_status(r.status),
                            "actualResult": r.actual_result,
                        })
                    })
                    .collect(),
            ),
        );
    }
    Value::Object(body)
}

// ---------------------------------------------------------------------------
// Attachments, field definitions, folders, projects
// ---------------------------------------------------------------------------

/// Map a Zephyr attachment listing to canonical attachments.
#[must_use]
pub fn to_attachments(raw: &Value) -> Vec<Attachment> {
    page_values(raw)
        .iter()
        .map(|item| {
            let id = id_of(item.get("id")).unwrap_or_default();
            let size = item.get("fileSize").and_then(Value::as_u64).unwrap_or(0);
            let mut attachment = Attachment::new(id, str_of(item, "filename"), size);
            if let Some(mime) = item.get("mimeType").and_then(Value::as_str) {
                attachment = attachment.with_content_type(mime);
            }
            attachment.created_at = date_of(item, "createdOn");
            attachment.created_by = user_of(item, "createdBy");
            attachment
        })
        .collect()
}

fn field_type_of(vendor: &str) -> FieldType {
    match vendor.to_ascii_uppercase().as_str() {
        "SINGLE_LINE_TEXT" | "STRING" => FieldType::String,
        "MULTI_LINE_TEXT" | "TEXT" => FieldType::Text,
        "NUMBER" | "DECIMAL" => FieldType::Number,
        "INTEGER" => FieldType::Integer,
        "DATE" => FieldType::Date,
        "DATE_TIME" | "DATETIME" => FieldType::DateTime,
        "CHECKBOX" | "BOOLEAN" => FieldType::Boolean,
        "SINGLE_CHOICE_SELECT_LIST" | "ENUM" => FieldType::Enum,
        "MULTI_CHOICE_SELECT_LIST" | "ARRAY" => FieldType::Array,
        "USER" => FieldType::User,
        "MULTI_USER" => FieldType::MultiUser,
        "URL" => FieldType::Url,
        _ => FieldType::Custom,
    }
}

/// Map a Zephyr custom-field listing to canonical definitions.
#[must_use]
pub fn to_field_definitions(raw: &Value) -> Vec<FieldDefinition> {
    page_values(raw)
        .iter()
        .map(|item| FieldDefinition {
            id: id_of(item.get("id")).unwrap_or_default(),
            name: str_of(item, "name"),
            field_type: field_type_of(&str_of(item, "type")),
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
                        .filter_map(|o| name_of(Some(o)))
                        .collect()
                })
                .unwrap_or_default(),
            entity: skb_core::EntityType::TestCase,
        })
        .collect()
}

/// Map a Zephyr folder to the canonical model. `paths` maps folder id →
/// already-computed path for parents.
#[must_use]
pub fn to_folder(raw: &Value, parent_path: Option<&str>) -> Folder {
    let id = id_of(raw.get("id")).unwrap_or_default();
    let name = str_of(raw, "name");
    let parent_id = id_of(raw.get("parentId"));
    let path = match parent_path {
        Some(parent) => format!("{parent}/{name}"),
        None => format!("/{name}"),
    };
    Folder {
        id,
        name,
        path,
        parent_id,
    }
}

/// Map a Zephyr project to the canonical model.
#[must_use]
pub fn to_project(raw: &Value) -> Project {
    Project {
        id: id_of(raw.get("id")).unwrap_or_default(),
        name: str_of(raw, "name"),
        key: str_of(raw, "key"),
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

    // -- enum tables ------------------------------------------------------

    #[test]
    fn status_round_trips_for_every_canonical_value() {
        for status in TestCaseStatus::ALL {
            assert_eq!(
                to_canonical_status(from_canonical_status(*status)),
                *status,
                "{status:?}"
            );
        }
    }

    #[test]
    fn priority_round_trips_for_every_canonical_value() {
        for priority in Priority::ALL {
            assert_eq!(
                to_canonical_priority(from_canonical_priority(*priority)),
                *priority,
                "{priority:?}"
            );
        }
    }

    #[test]
    fn execution_status_round_trips_for_every_canonical_value() {
        for status in ExecutionStatus::ALL {
            assert_eq!(
                to_canonical_execution_status(from_canonical_execution_status(*status)),
                *status,
                "{status:?}"
            );
        }
    }

    #[test]
    fn unknown_tokens_fall_back_to_defaults() {
        assert_eq!(to_canonical_status("Bizarre"), TestCaseStatus::Draft);
        assert_eq!(to_canonical_priority("Bizarre"), Priority::Medium);
        assert_eq!(to_canonical_execution_status("Bizarre"), ExecutionStatus::Open);
    }

    #[test]
    fn status_tokens_match_case_insensitively() {
        assert_eq!(to_canonical_status("approved"), TestCaseStatus::Approved);
        assert_eq!(to_canonical_priority("NORMAL"), Priority::Medium);
    }

    // -- test case mapping ------------------------------------------------

    #[test]
    fn full_test_case_maps_every_recognised_field() {
        let raw = json!({
            "id": 101,
            "key": "PROJ-T7",
            "name": "Login works",
            "objective": "verify login",
            "precondition": "account exists",
            "description": "<p>desc</p>",
            "status": {"id": 1, "name": "Approved"},
            "priority": {"id": 2, "name": "High"},
            "folder": {"id": 33},
            "labels": ["smoke", "auth"],
            "createdOn": "2025-01-02T03:04:05Z",
            "createdBy": {"accountId": "u-1", "displayName": "Dana"},
            "customFields": {"Estimate": 42, "Automated": "true"}
        });
        let tc = to_test_case(&raw, &no_mappings());
        assert_eq!(tc.id, "101");
        assert_eq!(tc.key.as_deref(), Some("PROJ-T7"));
        assert_eq!(tc.title, "Login works");
        assert_eq!(tc.status, TestCaseStatus::Approved);
        assert_eq!(tc.priority, Priority::High);
        assert_eq!(tc.folder_id.as_deref(), Some("33"));
        assert_eq!(tc.labels, vec!["smoke", "auth"]);
        assert!(tc.created_at.is_some());
        assert_eq!(
            tc.created_by.as_ref().map(|u| u.label()),
            Some("Dana")
        );
        assert_eq!(tc.custom_fields["Estimate"], FieldValue::Integer(42));
        assert_eq!(tc.custom_fields["Automated"], FieldValue::Boolean(true));
    }

    #[test]
    fn empty_payload_yields_defaults() {
        let tc = to_test_case(&json!({}), &no_mappings());
        assert_eq!(tc.status, TestCaseStatus::Draft);
        assert_eq!(tc.priority, Priority::Medium);
        assert!(tc.steps.is_empty());
        assert!(tc.title.is_empty());
    }

    #[test]
    fn totality_over_odd_shapes() {
        for raw in [
            json!(null),
            json!([1, 2]),
            json!("just a string"),
            json!({"status": 17, "priority": [], "labels": "oops", "folder": true}),
        ] {
            let tc = to_test_case(&raw, &no_mappings());
            assert_eq!(tc.status, TestCaseStatus::Draft);
            assert_eq!(tc.priority, Priority::Medium);
        }
    }

    #[test]
    fn bare_string_enums_are_accepted() {
        let raw = json!({"id": 1, "name": "t", "status": "Deprecated", "priority": "Low"});
        let tc = to_test_case(&raw, &no_mappings());
        assert_eq!(tc.status, TestCaseStatus::Deprecated);
        assert_eq!(tc.priority, Priority::Low);
    }

    #[test]
    fn unrecognised_fields_are_retained_verbatim() {
        let raw = json!({
            "id": 1,
            "name": "t",
            "vendorSpecificFlag": {"deep": [1, 2]},
            "anotherOne": "x"
        });
        let tc = to_test_case(&raw, &no_mappings());
        assert_eq!(
            tc.vendor_field("vendorSpecificFlag"),
            Some(&json!({"deep": [1, 2]}))
        );
        assert_eq!(tc.vendor_field("anotherOne"), Some(&json!("x")));
        // And they come back on the write path.
        let out = from_test_case(&tc, "PROJ");
        assert_eq!(out["vendorSpecificFlag"], json!({"deep": [1, 2]}));
        assert_eq!(out["anotherOne"], json!("x"));
    }

    #[test]
    fn configured_field_mapping_renames_custom_fields() {
        let mut mappings = BTreeMap::new();
        mappings.insert("estimate".to_string(), "Story Points".to_string());
        let raw = json!({"id": 1, "name": "t", "customFields": {"Story Points": 5}});
        let tc = to_test_case(&raw, &mappings);
        assert_eq!(tc.custom_fields["estimate"], FieldValue::Integer(5));
        assert!(!tc.custom_fields.contains_key("Story Points"));
    }

    #[test]
    fn custom_field_coercion_by_shape() {
        let raw = json!({
            "id": 1,
            "name": "t",
            "customFields": {
                "intField": 42,
                "boolTrue": "true",
                "dateField": "2025-04-15T14:30:45Z"
            }
        });
        let tc = to_test_case(&raw, &no_mappings());
        assert_eq!(tc.custom_fields["intField"], FieldValue::Integer(42));
        assert_eq!(tc.custom_fields["boolTrue"], FieldValue::Boolean(true));
        match &tc.custom_fields["dateField"] {
            FieldValue::Date(d) => assert_eq!(
                d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                "2025-04-15T14:30:45.000Z"
            ),
            other => panic!("expected Date, got {other:?}"),
        }
    }

    #[test]
    fn write_payload_uses_vendor_tokens() {
        let mut tc = TestCase::new("9", "Case");
        tc.status = TestCaseStatus::ReadyForReview;
        tc.priority = Priority::Medium;
        tc.folder_id = Some("12".into());
        let out = from_test_case(&tc, "PROJ");
        assert_eq!(out["projectKey"], json!("PROJ"));
        assert_eq!(out["statusName"], json!("In Review"));
        assert_eq!(out["priorityName"], json!("Normal"));
        assert_eq!(out["folderId"], json!(12));
    }

    // -- steps -------------------------------------------------------------

    #[test]
    fn steps_are_sequenced_from_vendor_order() {
        let raw = json!({"values": [
            {"inline": {"description": "a", "expectedResult": "ra", "testData": "d"}},
            {"inline": {"description": "b", "expectedResult": "rb", "testData": ""}},
            {"inline": {"description": "c", "expectedResult": "rc"}}
        ]});
        let steps = to_steps(&raw);
        let seqs: Vec<u32> = steps.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(steps[0].test_data.as_deref(), Some("d"));
        assert!(steps[1].test_data.is_none());
    }

    #[test]
    fn malformed_steps_payload_is_empty_not_an_error() {
        assert!(to_steps(&json!(null)).is_empty());
        assert!(to_steps(&json!({"values": "oops"})).is_empty());
    }

    #[test]
    fn steps_write_payload_overwrites_in_order() {
        let steps = vec![
            TestStep::new(1, "open", "opened"),
            TestStep::new(2, "act", "acted"),
        ];
        let out = from_steps(&steps);
        assert_eq!(out["mode"], json!("OVERWRITE"));
        assert_eq!(out["items"].as_array().map(Vec::len), Some(2));
        assert_eq!(out["items"][0]["inline"]["description"], json!("open"));
    }

    // -- executions ---------------------------------------------------------

    #[test]
    fn execution_maps_status_duration_and_step_results() {
        let raw = json!({
            "id": 55,
            "testCase": {"id": 101},
            "testCycle": {"id": 7},
            "testExecutionStatus": {"name": "Fail"},
            "actualEndDate": "2025-03-01T10:00:00Z",
            "executedBy": {"accountId": "u-2"},
            "environment": {"name": "staging"},
            "executionTime": 95000,
            "comment": "flaky",
            "testScriptResults": [
                {"id": 1, "status": {"name": "Pass"}, "actualResult": "ok"},
                {"id": 2, "status": {"name": "Fail"}, "actualResult": "boom"}
            ]
        });
        let execution = to_execution(&raw);
        assert_eq!(execution.test_case_id, "101");
        assert_eq!(execution.cycle_id.as_deref(), Some("7"));
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.duration_seconds, Some(95));
        assert_eq!(execution.environment.as_deref(), Some("staging"));
        assert_eq!(execution.step_results.len(), 2);
        assert_eq!(execution.step_results[1].status, ExecutionStatus::Failed);
        assert_eq!(execution.step_results[1].sequence, 2);
    }

    #[test]
    fn execution_round_trip_preserves_status() {
        let mut execution = TestExecution::new("1", "PROJ-T1");
        execution.status = ExecutionStatus::Blocked;
        let out = from_execution(&execution, "PROJ");
        assert_eq!(out["statusName"], json!("Blocked"));
        let back = to_execution(&json!({
            "id": 1,
            "testCase": {"id": "PROJ-T1"},
            "testExecutionStatus": {"name": out["statusName"].as_str().unwrap()}
        }));
        assert_eq!(back.status, ExecutionStatus::Blocked);
    }

    // -- attachments / fields / folders -------------------------------------

    #[test]
    fn attachments_default_missing_content_type() {
        let raw = json!({"values": [
            {"id": 1, "filename": "log.txt", "fileSize": 120, "mimeType": "text/plain"},
            {"id": 2, "filename": "blob.bin", "fileSize": 64}
        ]});
        let attachments = to_attachments(&raw);
        assert_eq!(attachments[0].content_type, "text/plain");
        assert_eq!(attachments[1].content_type, "application/octet-stream");
        assert_eq!(attachments[1].size_bytes, 64);
    }

    #[test]
    fn field_definitions_map_types_and_options() {
        let raw = json!({"values": [
            {"id": 1, "name": "Estimate", "type": "NUMBER", "required": true},
            {"id": 2, "name": "Component", "type": "SINGLE_CHOICE_SELECT_LIST",
             "options": [{"name": "API"}, {"name": "UI"}]},
            {"id": 3, "name": "Weird", "type": "SOMETHING_NEW"}
        ]});
        let defs = to_field_definitions(&raw);
        assert_eq!(defs[0].field_type, FieldType::Number);
        assert!(defs[0].required);
        assert_eq!(defs[1].field_type, FieldType::Enum);
        assert_eq!(defs[1].allowed_values, vec!["API", "UI"]);
        assert_eq!(defs[2].field_type, FieldType::Custom);
    }

    #[test]
    fn folder_paths_build_from_parents() {
        let root = to_folder(&json!({"id": 1, "name": "Regression"}), None);
        assert_eq!(root.path, "/Regression");
        let child = to_folder(
            &json!({"id": 2, "name": "Login", "parentId": 1}),
            Some(&root.path),
        );
        assert_eq!(child.path, "/Regression/Login");
        assert_eq!(child.parent_id.as_deref(), Some("1"));
    }

    #[test]
    fn cycle_maps_schedule_window() {
        let raw = json!({
            "id": 4, "name": "Sprint 12", "status": {"name": "In Progress"},
            "plannedStartDate": "2025-06-01T00:00:00Z",
            "plannedEndDate": "2025-06-14T00:00:00Z"
        });
        let cycle = to_cycle(&raw);
        assert_eq!(cycle.name, "Sprint 12");
        assert_eq!(cycle.status, "In Progress");
        assert!(cycle.planned_start.is_some());
        assert!(cycle.planned_end.is_some());
    }

    #[test]
    fn page_helpers_tolerate_both_shapes() {
        assert_eq!(page_values(&json!({"values": [1, 2]})).len(), 2);
        assert_eq!(page_values(&json!([1, 2, 3])).len(), 3);
        assert_eq!(page_values(&json!({"nope": 1})).len(), 0);
        assert_eq!(page_total(&json!({"values": [1], "total": 40})), 40);
        assert_eq!(page_total(&json!({"values": [1, 2]})), 2);
    }

    #[test]
    fn mapping_is_deterministic() {
        let raw = json!({
            "id": 1, "name": "t", "status": "Approved",
            "customFields": {"a": 1, "b": "true"}
        });
        let a = to_test_case(&raw, &no_mappings());
        let b = to_test_case(&raw, &no_mappings());
        assert_eq!(a, b);
    }
}
