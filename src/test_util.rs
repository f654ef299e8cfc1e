//! Shared fixtures for unit tests: in-memory pools and small builders.

use crate::record::types::{Record, Revision, RevisionAction};
use crate::workflow::types::{
    RecordType, State, Transition, Workflow, WorkflowLifecycle,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Fixed base instant used by record fixtures.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

/// Single-connection in-memory SQLite pool.
///
/// One connection only: each `:memory:` connection is its own database, so a
/// larger pool would scatter tables across invisible databases.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool")
}

/// Three-state workflow: New -> In Progress -> Resolved (terminal).
///
/// The first transition is restricted to the "agent" role; the second is
/// unrestricted.
pub fn simple_workflow(id: &str, record_type: RecordType) -> Workflow {
    Workflow {
        id: id.to_string(),
        name: format!("Workflow {id}"),
        record_type,
        active: true,
        lifecycle: WorkflowLifecycle::Active,
        is_default: false,
        classifications: Vec::new(),
        location: None,
        department: None,
        channel: None,
        sla_hours: None,
        states: vec![
            State {
                id: "st-new".to_string(),
                name: "New".to_string(),
                is_initial: true,
                is_terminal: false,
            },
            State {
                id: "st-progress".to_string(),
                name: "In Progress".to_string(),
                is_initial: false,
                is_terminal: false,
            },
            State {
                id: "st-done".to_string(),
                name: "Resolved".to_string(),
                is_initial: false,
                is_terminal: true,
            },
        ],
        transitions: vec![
            Transition {
                id: "tr-start".to_string(),
                name: "Start work".to_string(),
                from_state: "st-new".to_string(),
                to_state: "st-progress".to_string(),
                allowed_roles: vec!["agent".to_string()],
                requirements: Vec::new(),
                actions: Vec::new(),
            },
            Transition {
                id: "tr-resolve".to_string(),
                name: "Resolve".to_string(),
                from_state: "st-progress".to_string(),
                to_state: "st-done".to_string(),
                allowed_roles: Vec::new(),
                requirements: Vec::new(),
                actions: Vec::new(),
            },
        ],
    }
}

pub fn test_transition(id: &str, from: &str, to: &str) -> Transition {
    Transition {
        id: id.to_string(),
        name: id.to_string(),
        from_state: from.to_string(),
        to_state: to.to_string(),
        allowed_roles: Vec::new(),
        requirements: Vec::new(),
        actions: Vec::new(),
    }
}

/// A fresh record sitting in `simple_workflow`'s initial state.
pub fn test_record(id: &str) -> Record {
    let now = base_time();
    Record {
        id: id.to_string(),
        record_type: RecordType::Incident,
        workflow_id: "wf-a".to_string(),
        current_state_id: "st-new".to_string(),
        classification_id: None,
        department_id: None,
        location_id: None,
        channel: None,
        assignee: None,
        reporter: "reporter-1".to_string(),
        fields: serde_json::Map::new(),
        sla_due_at: None,
        sla_breached: false,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

pub fn test_revision(id: &str, record_id: &str, action: RevisionAction) -> Revision {
    Revision {
        id: id.to_string(),
        record_id: record_id.to_string(),
        action,
        performed_by: "tester".to_string(),
        timestamp: base_time(),
        payload: json!({}),
    }
}
