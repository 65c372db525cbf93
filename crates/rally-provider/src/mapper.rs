// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rally WSAPI payload mapping.
//!
//! Rally wraps queries in `{"QueryResult": {"Results": [..],
//! "TotalResultCount": ..}}`, addresses objects by `ObjectID` (with a
//! human `FormattedID`), references related objects as
//! `{"_ref", "_refObjectName"}`, and records runs as `TestCaseResult`
//! verdicts. Test cases carry no built-in workflow state; the bridge
//! keeps lifecycle in the `c_LifecycleState` custom field.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use skb_core::{
    Attachment, ExecutionStatus, FieldDefinition, FieldType, Folder, Priority, Project, TestCase,
    TestCaseStatus, TestCycle, TestExecution, TestStep, UserRef, infer,
};
use std::collections::BTreeMap;

/// Custom field the bridge uses for lifecycle state.
pub const LIFECYCLE_FIELD: &str = "c_LifecycleState";

/// Lifecycle tokens and their canonical mapping.
pub const STATUS_TABLE: &[(&str, TestCaseStatus)] = &[
    ("Draft", TestCaseStatus::Draft),
    ("Ready", TestCaseStatus::Ready),
    ("In Review", TestCaseStatus::ReadyForReview),
    ("Needs Work", TestCaseStatus::NeedsWork),
    ("Approved", TestCaseStatus::Approved),
    ("Obsolete", TestCaseStatus::Deprecated),
];

/// Rally priority tokens and their canonical mapping.
pub const PRIORITY_TABLE: &[(&str, Priority)] = &[
    ("Critical", Priority::Critical),
    ("Important", Priority::High),
    ("Useful", Priority::Medium),
    ("Low", Priority::Low),
];

/// Rally verdicts and their canonical mapping.
pub const VERDICT_TABLE: &[(&str, ExecutionStatus)] = &[
    ("Pass", ExecutionStatus::Passed),
    ("Fail", ExecutionStatus::Failed),
    ("Error", ExecutionStatus::Failed),
    ("Blocked", ExecutionStatus::Blocked),
    ("N/A", ExecutionStatus::NotApplicable),
    ("Inconclusive", ExecutionStatus::Open),
];

const STANDARD_FIELDS: &[&str] = &[
    "ObjectID",
    "FormattedID",
    "Name",
    "Description",
    "Objective",
    "PreConditions",
    "Priority",
    "TestFolder",
    "Tags",
    "CreationDate",
    "LastUpdateDate",
    "Owner",
    "Project",
    "Steps",
    "Results",
    "_ref",
    "_refObjectName",
    "_refObjectUUID",
    "_type",
    "_rallyAPIMajor",
    "_rallyAPIMinor",
    LIFECYCLE_FIELD,
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
        .unwrap_or("Draft")
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

/// Canonical priority → Rally token.
#[must_use]
pub fn from_canonical_priority(priority: Priority) -> &'static str {
    PRIORITY_TABLE
        .iter()
        .find(|(_, canonical)| *canonical == priority)
        .map(|(token, _)| *token)
        .unwrap_or("Useful")
}

/// Verdict → canonical execution status; unknown defaults to OPEN.
#[must_use]
pub fn to_canonical_verdict(vendor: &str) -> ExecutionStatus {
    VERDICT_TABLE
        .iter()
        .find(|(token, _)| token.eq_ignore_ascii_case(vendor))
        .map(|(_, canonical)| *canonical)
        .unwrap_or_default()
}

/// Canonical execution status → verdict token.
#[must_use]
pub fn from_canonical_verdict(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Passed => "Pass",
        ExecutionStatus::Failed => "Fail",
        ExecutionStatus::Blocked => "Blocked",
        ExecutionStatus::NotApplicable => "N/A",
        ExecutionStatus::Open => "Inconclusive",
    }
}

// ---------------------------------------------------------------------------
// Shape helpers
// ---------------------------------------------------------------------------

/// Results of a `QueryResult` envelope.
#[must_use]
pub fn query_results(raw: &Value) -> Vec<Value> {
    raw.get("QueryResult")
        .and_then(|qr| qr.get("Results"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Total count of a `QueryResult`, falling back to the result count.
#[must_use]
pub fn query_total(raw: &Value) -> u64 {
    raw.get("QueryResult")
        .and_then(|qr| qr.get("TotalResultCount"))
        .and_then(Value::as_u64)
        .unwrap_or_else(|| query_results(raw).len() as u64)
}

fn str_of(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn object_id(raw: &Value) -> String {
    match raw.get("ObjectID") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn ref_name(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)?
        .get("_refObjectName")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn ref_object_id(raw: &Value, key: &str) -> Option<String> {
    let reference = raw.get(key)?.get("_ref")?.as_str()?;
    reference.rsplit('/').next().map(ToString::to_string)
}

fn date_of(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    raw.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Test cases
// ---------------------------------------------------------------------------

/// Map a Rally test case to the canonical model.
#[must_use]
pub fn to_test_case(raw: &Value, field_mappings: &BTreeMap<String, String>) -> TestCase {
    let mut tc = TestCase::new(object_id(raw), str_of(raw, "Name"));
    tc.key = raw
        .get("FormattedID")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    tc.description = str_of(raw, "Description");
    tc.objective = str_of(raw, "Objective");
    tc.precondition = str_of(raw, "PreConditions");
    tc.status = to_canonical_status(&str_of(raw, LIFECYCLE_FIELD));
    tc.priority = to_canonical_priority(&str_of(raw, "Priority"));
    tc.folder_id = ref_object_id(raw, "TestFolder");
    tc.created_at = date_of(raw, "CreationDate");
    tc.updated_at = date_of(raw, "LastUpdateDate");
    if let Some(name) = ref_name(raw, "Owner") {
        tc.created_by = Some(UserRef::named(name));
    }
    if let Some(Value::Object(tags)) = raw.get("Tags") {
        if let Some(Value::Array(tag_list)) = tags.get("_tagsNameArray") {
            tc.labels = tag_list
                .iter()
                .filter_map(|t| t.get("Name").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect();
        }
    }
    if let Value::Object(map) = raw {
        for (key, value) in map {
            if STANDARD_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if let Some(custom_name) = key.strip_prefix("c_") {
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

/// Map a canonical test case to the Rally create envelope.
#[must_use]
pub fn from_test_case(tc: &TestCase) -> Value {
    let mut body = Map::new();
    body.insert("Name".into(), json!(tc.title));
    if !tc.description.is_empty() {
        body.insert("Description".into(), json!(tc.description));
    }
    if !tc.objective.is_empty() {
        body.insert("Objective".into(), json!(tc.objective));
    }
    if !tc.precondition.is_empty() {
        body.insert("PreConditions".into(), json!(tc.precondition));
    }
    body.insert("Priority".into(), json!(from_canonical_priority(tc.priority)));
    body.insert(
        LIFECYCLE_FIELD.into(),
        json!(from_canonical_status(tc.status)),
    );
    if let Some(folder) = &tc.folder_id {
        body.insert("TestFolder".into(), json!({"_ref": format!("/testfolder/{folder}")}));
    }
    for (key, value) in &tc.custom_fields {
        body.insert(format!("c_{key}"), value.to_json());
    }
    if let Some(Value::Object(bag)) = tc.attributes.get(skb_core::CUSTOM_FIELDS_ATTR) {
        for (key, value) in bag {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    json!({"TestCase": Value::Object(body)})
}

// ---------------------------------------------------------------------------
// Steps, executions, cycles
// ---------------------------------------------------------------------------

/// Map a `TestCaseStep` query result to ordered canonical steps.
///
/// Rally keeps an explicit `StepIndex`; results are ordered by it and
/// renumbered contiguously.
#[must_use]
pub fn to_steps(raw: &Value) -> Vec<TestStep> {
    let mut items = query_results(raw);
    items.sort_by_key(|item| {
        item.get("StepIndex")
            .and_then(Value::as_u64)
            .unwrap_or(u64::MAX)
    });
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            TestStep::new(
                idx as u32 + 1,
                str_of(item, "Input"),
                str_of(item, "ExpectedResult"),
            )
        })
        .collect()
}

/// Map one canonical step to a `TestCaseStep` create envelope.
#[must_use]
pub fn from_step(test_case_ref: &str, step: &TestStep) -> Value {
    json!({
        "TestCaseStep": {
            "TestCase": {"_ref": test_case_ref},
            "StepIndex": step.sequence,
            "Input": step.action,
            "ExpectedResult": step.expected_result,
        }
    })
}

/// Map a `TestCaseResult` to a canonical execution.
#[must_use]
pub fn to_execution(raw: &Value) -> TestExecution {
    let mut execution = TestExecution::new(
        object_id(raw),
        ref_object_id(raw, "TestCase").unwrap_or_default(),
    );
    execution.cycle_id = ref_object_id(raw, "TestSet");
    execution.status = to_canonical_verdict(&str_of(raw, "Verdict"));
    execution.executed_at = date_of(raw, "Date");
    execution.duration_seconds = raw
        .get("Duration")
        .and_then(Value::as_f64)
        .map(|secs| secs.max(0.0) as u64);
    execution.comment = str_of(raw, "Notes");
    if let Some(name) = ref_name(raw, "Tester") {
        execution.executed_by = Some(UserRef::named(name));
    }
    execution
}

/// Map a canonical execution to a `TestCaseResult` create envelope.
#[must_use]
pub fn from_execution(execution: &TestExecution, build: &str) -> Value {
    let mut body = Map::new();
    body.insert(
        "TestCase".into(),
        json!({"_ref": format!("/testcase/{}", execution.test_case_id)}),
    );
    if let Some(cycle) = &execution.cycle_id {
        body.insert("TestSet".into(), json!({"_ref": format!("/testset/{cycle}")}));
    }
    body.insert("Verdict".into(), json!(from_canonical_verdict(execution.status)));
    body.insert("Build".into(), json!(build));
    if let Some(at) = execution.executed_at {
        body.insert(
            "Date".into(),
            json!(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }
    if let Some(duration) = execution.duration_seconds {
        body.insert("Duration".into(), json!(duration));
    }
    if !execution.comment.is_empty() {
        body.insert("Notes".into(), json!(execution.comment));
    }
    json!({"TestCaseResult": Value::Object(body)})
}

/// Map a `TestSet` to a canonical cycle.
#[must_use]
pub fn to_cycle(raw: &Value) -> TestCycle {
    let mut cycle = TestCycle::new(object_id(raw), str_of(raw, "Name"));
    cycle.description = str_of(raw, "Description");
    cycle.status = str_of(raw, "ScheduleState");
    cycle
}

/// Map a `TestFolder` to a canonical folder.
#[must_use]
pub fn to_folder(raw: &Value, parent_path: Option<&str>) -> Folder {
    let name = str_of(raw, "Name");
    let path = match parent_path {
        Some(parent) => format!("{parent}/{name}"),
        None => format!("/{name}"),
    };
    Folder {
        id: object_id(raw),
        name,
        path,
        parent_id: ref_object_id(raw, "Parent"),
    }
}

/// Map a Rally project (subscription workspace project).
#[must_use]
pub fn to_project(raw: &Value) -> Project {
    Project {
        id: object_id(raw),
        name: str_of(raw, "Name"),
        key: String::new(),
    }
}

/// Map a Rally attachment object.
#[must_use]
pub fn to_attachment(raw: &Value) -> Attachment {
    let mut attachment = Attachment::new(
        object_id(raw),
        str_of(raw, "Name"),
        raw.get("Size").and_then(Value::as_u64).unwrap_or(0),
    );
    if let Some(ct) = raw.get("ContentType").and_then(Value::as_str) {
        attachment = attachment.with_content_type(ct);
    }
    attachment.created_at = date_of(raw, "CreationDate");
    attachment
}

/// Map Rally type-definition attributes to canonical field definitions.
#[must_use]
pub fn to_field_definitions(raw: &Value) -> Vec<FieldDefinition> {
    query_results(raw)
        .iter()
        .map(|item| {
            let field_type = match str_of(item, "AttributeType").to_ascii_uppercase().as_str() {
                "STRING" => FieldType::String,
                "TEXT" => FieldType::Text,
                "DECIMAL" | "QUANTITY" => FieldType::Number,
                "INTEGER" => FieldType::Integer,
                "DATE" => FieldType::Date,
                "BOOLEAN" => FieldType::Boolean,
                "RATING" | "STATE" => FieldType::Enum,
                "COLLECTION" => FieldType::Array,
                "USER" => FieldType::User,
                "WEB_LINK" => FieldType::Url,
                _ => FieldType::Custom,
            };
            FieldDefinition {
                id: str_of(item, "ElementName"),
                name: str_of(item, "Name"),
                field_type,
                required: item
                    .get("Required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                allowed_values: item
                    .get("AllowedValues")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.get("StringValue").and_then(Value::as_str))
                            .map(ToString::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                entity: skb_core::EntityType::TestCase,
            }
        })
        .collect()
}

/// Extract the created ObjectID from a `CreateResult` envelope.
#[must_use]
pub fn created_object_id(raw: &Value) -> Option<String> {
    let object = raw.get("CreateResult")?.get("Object")?;
    match object.get("ObjectID") {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
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

    #[test]
    fn all_enum_tables_round_trip() {
        for status in TestCaseStatus::ALL {
            assert_eq!(to_canonical_status(from_canonical_status(*status)), *status);
        }
        for priority in Priority::ALL {
            assert_eq!(
                to_canonical_priority(from_canonical_priority(*priority)),
                *priority
            );
        }
        for status in ExecutionStatus::ALL {
            assert_eq!(to_canonical_verdict(from_canonical_verdict(*status)), *status);
        }
    }

    #[test]
    fn unknown_tokens_default() {
        assert_eq!(to_canonical_status("??"), TestCaseStatus::Draft);
        assert_eq!(to_canonical_priority("??"), Priority::Medium);
        assert_eq!(to_canonical_verdict("??"), ExecutionStatus::Open);
        // Error verdicts are failures.
        assert_eq!(to_canonical_verdict("Error"), ExecutionStatus::Failed);
    }

    #[test]
    fn test_case_maps_refs_and_custom_fields() {
        let raw = json!({
            "ObjectID": 777,
            "FormattedID": "TC12",
            "Name": "Rally case",
            "Description": "d",
            "Priority": "Important",
            "c_LifecycleState": "Approved",
            "TestFolder": {"_ref": "/testfolder/55", "_refObjectName": "Suite"},
            "Owner": {"_ref": "/user/9", "_refObjectName": "Kim"},
            "CreationDate": "2025-01-01T00:00:00Z",
            "c_RiskLevel": "high",
            "SomethingVendor": 3
        });
        let tc = to_test_case(&raw, &no_mappings());
        assert_eq!(tc.id, "777");
        assert_eq!(tc.key.as_deref(), Some("TC12"));
        assert_eq!(tc.priority, Priority::High);
        assert_eq!(tc.status, TestCaseStatus::Approved);
        assert_eq!(tc.folder_id.as_deref(), Some("55"));
        assert_eq!(tc.created_by.as_ref().map(|u| u.label()), Some("Kim"));
        assert_eq!(tc.custom_fields["RiskLevel"], FieldValue::Text("high".into()));
        assert_eq!(tc.vendor_field("SomethingVendor"), Some(&json!(3)));
    }

    #[test]
    fn totality_over_odd_shapes() {
        for raw in [json!(null), json!({}), json!([1]), json!("x")] {
            let tc = to_test_case(&raw, &no_mappings());
            assert_eq!(tc.status, TestCaseStatus::Draft);
            assert_eq!(tc.priority, Priority::Medium);
        }
    }

    #[test]
    fn steps_sort_by_step_index() {
        let raw = json!({"QueryResult": {"Results": [
            {"ObjectID": 2, "StepIndex": 3, "Input": "c", "ExpectedResult": "rc"},
            {"ObjectID": 1, "StepIndex": 1, "Input": "a", "ExpectedResult": "ra"},
            {"ObjectID": 3, "StepIndex": 2, "Input": "b", "ExpectedResult": "rb"}
        ], "TotalResultCount": 3}});
        let steps = to_steps(&raw);
        assert_eq!(
            steps.iter().map(|s| s.action.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            steps.iter().map(|s| s.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn execution_maps_verdict_and_tester() {
        let raw = json!({
            "ObjectID": 10,
            "TestCase": {"_ref": "/testcase/777"},
            "TestSet": {"_ref": "/testset/31"},
            "Verdict": "Fail",
            "Date": "2025-02-02T08:00:00Z",
            "Duration": 12.7,
            "Notes": "flaked",
            "Tester": {"_refObjectName": "Ola"}
        });
        let execution = to_execution(&raw);
        assert_eq!(execution.test_case_id, "777");
        assert_eq!(execution.cycle_id.as_deref(), Some("31"));
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.duration_seconds, Some(12));
        assert_eq!(execution.executed_by.as_ref().map(|u| u.label()), Some("Ola"));
    }

    #[test]
    fn create_envelopes_have_vendor_shape() {
        let mut tc = TestCase::new("1", "Case");
        tc.priority = Priority::Critical;
        let body = from_test_case(&tc);
        assert_eq!(body["TestCase"]["Priority"], json!("Critical"));
        assert_eq!(body["TestCase"]["c_LifecycleState"], json!("Draft"));

        let created = json!({"CreateResult": {"Object": {"ObjectID": 999}, "Errors": []}});
        assert_eq!(created_object_id(&created).as_deref(), Some("999"));
        assert!(created_object_id(&json!({})).is_none());
    }

    #[test]
    fn query_envelope_helpers() {
        let raw = json!({"QueryResult": {"Results": [1, 2], "TotalResultCount": 40}});
        assert_eq!(query_results(&raw).len(), 2);
        assert_eq!(query_total(&raw), 40);
        assert_eq!(query_total(&json!({})), 0);
    }
}
