// SPDX-License-Identifier: MIT OR Apache-2.0
//! Row mapping for exported worksheets.
//!
//! Rows arrive as header→cell maps. Enum cells carry canonical token
//! names (exports are produced by humans, so matching is case- and
//! punctuation-insensitive); labels are pipe-separated; any column the
//! mapper does not recognise becomes a custom field via shape inference.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use skb_core::{
    ExecutionStatus, Folder, Priority, Project, TestCase, TestCaseStatus, TestCycle,
    TestExecution, TestStep, UserRef, infer,
};
use std::collections::BTreeMap;

/// One parsed CSV row: header → cell.
pub type Row = BTreeMap<String, String>;

const CASE_COLUMNS: &[&str] = &[
    "id",
    "key",
    "title",
    "description",
    "objective",
    "precondition",
    "status",
    "priority",
    "labels",
    "folder_id",
    "created_at",
    "updated_at",
    "created_by",
];

fn norm(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Status cell → canonical status; unknown or empty defaults to DRAFT.
#[must_use]
pub fn to_canonical_status(cell: &str) -> TestCaseStatus {
    TestCaseStatus::ALL
        .iter()
        .find(|s| norm(s.as_str()) == norm(cell))
        .copied()
        .unwrap_or_default()
}

/// Priority cell → canonical priority; unknown defaults to MEDIUM.
#[must_use]
pub fn to_canonical_priority(cell: &str) -> Priority {
    Priority::ALL
        .iter()
        .find(|p| norm(p.as_str()) == norm(cell))
        .copied()
        .unwrap_or_default()
}

/// Execution-status cell → canonical; unknown defaults to OPEN.
#[must_use]
pub fn to_canonical_execution_status(cell: &str) -> ExecutionStatus {
    ExecutionStatus::ALL
        .iter()
        .find(|s| norm(s.as_str()) == norm(cell))
        .copied()
        .unwrap_or_default()
}

fn cell<'a>(row: &'a Row, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or_default()
}

fn date_cell(row: &Row, name: &str) -> Option<DateTime<Utc>> {
    let raw = cell(row, name);
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Map a `test_cases.csv` row to a canonical test case.
#[must_use]
pub fn to_test_case(row: &Row) -> TestCase {
    let mut tc = TestCase::new(cell(row, "id"), cell(row, "title"));
    let key = cell(row, "key");
    if !key.is_empty() {
        tc.key = Some(key.to_string());
    }
    tc.description = cell(row, "description").to_string();
    tc.objective = cell(row, "objective").to_string();
    tc.precondition = cell(row, "precondition").to_string();
    tc.status = to_canonical_status(cell(row, "status"));
    tc.priority = to_canonical_priority(cell(row, "priority"));
    let labels = cell(row, "labels");
    if !labels.is_empty() {
        tc.labels = labels
            .split('|')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    let folder = cell(row, "folder_id");
    if !folder.is_empty() {
        tc.folder_id = Some(folder.to_string());
    }
    tc.created_at = date_cell(row, "created_at");
    tc.updated_at = date_cell(row, "updated_at");
    let author = cell(row, "created_by");
    if !author.is_empty() {
        tc.created_by = Some(UserRef::named(author));
    }
    // Unknown columns become custom fields through shape inference.
    for (column, value) in row {
        if CASE_COLUMNS.contains(&column.as_str()) || value.is_empty() {
            continue;
        }
        tc.custom_fields
            .insert(column.clone(), infer(&Value::String(value.clone())));
    }
    tc
}

/// Map `test_steps.csv` rows (already filtered to one case) to ordered
/// canonical steps.
#[must_use]
pub fn to_steps(rows: &[Row]) -> Vec<TestStep> {
    let mut rows: Vec<&Row> = rows.iter().collect();
    rows.sort_by_key(|row| cell(row, "sequence").parse::<u64>().unwrap_or(u64::MAX));
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut step = TestStep::new(
                idx as u32 + 1,
                cell(row, "action"),
                cell(row, "expected_result"),
            );
            let data = cell(row, "test_data");
            if !data.is_empty() {
                step.test_data = Some(data.to_string());
            }
            step
        })
        .collect()
}

/// Map a `test_cycles.csv` row.
#[must_use]
pub fn to_cycle(row: &Row) -> TestCycle {
    let mut cycle = TestCycle::new(cell(row, "id"), cell(row, "name"));
    cycle.description = cell(row, "description").to_string();
    cycle.status = cell(row, "status").to_string();
    let environment = cell(row, "environment");
    if !environment.is_empty() {
        cycle.environment = Some(environment.to_string());
    }
    cycle.planned_start = date_cell(row, "planned_start");
    cycle.planned_end = date_cell(row, "planned_end");
    cycle
}

/// Map a `test_executions.csv` row.
#[must_use]
pub fn to_execution(row: &Row) -> TestExecution {
    let mut execution = TestExecution::new(cell(row, "id"), cell(row, "test_case_id"));
    let cycle = cell(row, "cycle_id");
    if !cycle.is_empty() {
        execution.cycle_id = Some(cycle.to_string());
    }
    execution.status = to_canonical_execution_status(cell(row, "status"));
    execution.executed_at = date_cell(row, "executed_at");
    let executor = cell(row, "executed_by");
    if !executor.is_empty() {
        execution.executed_by = Some(UserRef::named(executor));
    }
    execution.duration_seconds = cell(row, "duration_seconds").parse().ok();
    execution.comment = cell(row, "comment").to_string();
    execution
}

/// Map a `folders.csv` row; paths resolve against the parent's path.
#[must_use]
pub fn to_folder(row: &Row, parent_path: Option<&str>) -> Folder {
    let name = cell(row, "name").to_string();
    let path = match parent_path {
        Some(parent) => format!("{parent}/{name}"),
        None => format!("/{name}"),
    };
    let parent = cell(row, "parent_id");
    Folder {
        id: cell(row, "id").to_string(),
        name,
        path,
        parent_id: if parent.is_empty() {
            None
        } else {
            Some(parent.to_string())
        },
    }
}

/// Map a `projects.csv` row.
#[must_use]
pub fn to_project(row: &Row) -> Project {
    Project {
        id: cell(row, "id").to_string(),
        name: cell(row, "name").to_string(),
        key: cell(row, "key").to_string(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use skb_core::FieldValue;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn enum_cells_match_loosely() {
        assert_eq!(to_canonical_status("Ready for Review"), TestCaseStatus::ReadyForReview);
        assert_eq!(to_canonical_status("READY_FOR_REVIEW"), TestCaseStatus::ReadyForReview);
        assert_eq!(to_canonical_status("draft"), TestCaseStatus::Draft);
        assert_eq!(to_canonical_status("???"), TestCaseStatus::Draft);
        assert_eq!(to_canonical_priority("critical"), Priority::Critical);
        assert_eq!(to_canonical_priority(""), Priority::Medium);
        assert_eq!(
            to_canonical_execution_status("not applicable"),
            ExecutionStatus::NotApplicable
        );
    }

    #[test]
    fn case_row_maps_labels_and_custom_columns() {
        let r = row(&[
            ("id", "tc-1"),
            ("key", "X-1"),
            ("title", "Spreadsheet case"),
            ("status", "approved"),
            ("priority", "high"),
            ("labels", "smoke | auth"),
            ("folder_id", "f-2"),
            ("created_at", "2025-04-15"),
            ("Estimate", "8"),
            ("Automated", "true"),
        ]);
        let tc = to_test_case(&r);
        assert_eq!(tc.key.as_deref(), Some("X-1"));
        assert_eq!(tc.status, TestCaseStatus::Approved);
        assert_eq!(tc.priority, Priority::High);
        assert_eq!(tc.labels, vec!["smoke", "auth"]);
        assert!(tc.created_at.is_some());
        assert_eq!(tc.custom_fields["Estimate"], FieldValue::Integer(8));
        assert_eq!(tc.custom_fields["Automated"], FieldValue::Boolean(true));
    }

    #[test]
    fn empty_row_yields_defaults() {
        let tc = to_test_case(&Row::new());
        assert_eq!(tc.status, TestCaseStatus::Draft);
        assert_eq!(tc.priority, Priority::Medium);
        assert!(tc.labels.is_empty());
    }

    #[test]
    fn steps_sort_by_sequence_column() {
        let rows = vec![
            row(&[("sequence", "2"), ("action", "b"), ("expected_result", "rb")]),
            row(&[("sequence", "1"), ("action", "a"), ("expected_result", "ra")]),
        ];
        let steps = to_steps(&rows);
        assert_eq!(steps[0].action, "a");
        assert_eq!(
            steps.iter().map(|s| s.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn execution_row_maps() {
        let r = row(&[
            ("id", "run-1"),
            ("test_case_id", "tc-1"),
            ("cycle_id", "cy-1"),
            ("status", "failed"),
            ("executed_at", "2025-05-01T10:00:00Z"),
            ("executed_by", "Kim"),
            ("duration_seconds", "42"),
        ]);
        let execution = to_execution(&r);
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.duration_seconds, Some(42));
        assert_eq!(execution.executed_by.as_ref().map(|u| u.label()), Some("Kim"));
    }
}
