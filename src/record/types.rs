/// Record and audit-trail types
///
/// A record is one trackable case (incident/request/complaint/query). Its
/// `version` is a monotonic counter incremented on every mutation and used
/// for optimistic concurrency. History and revision entries are immutable
/// once written.

use crate::workflow::types::RecordType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A trackable case moving through a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Unique record identifier (uuid)
    pub id: String,
    pub record_type: RecordType,
    /// Workflow governing this record, referenced by id only
    pub workflow_id: String,
    /// Present state of the machine
    pub current_state_id: String,
    /// Organizational references (matching criteria at creation time)
    pub classification_id: Option<String>,
    pub department_id: Option<String>,
    pub location_id: Option<String>,
    pub channel: Option<String>,
    /// Current assignee (user or role identifier)
    pub assignee: Option<String>,
    /// Who reported the case
    pub reporter: String,
    /// Free-form record fields (subject, description, custom fields)
    pub fields: Map<String, Value>,
    /// Service-level deadline; None means no SLA applies
    pub sla_due_at: Option<DateTime<Utc>>,
    pub sla_breached: bool,
    /// Monotonic mutation counter, compared-and-swapped on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a record
///
/// `workflow_id` overrides criteria matching when the caller already knows
/// (or had to disambiguate) which workflow applies.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub record_type: RecordType,
    pub workflow_id: Option<String>,
    pub classification_id: Option<String>,
    pub department_id: Option<String>,
    pub location_id: Option<String>,
    pub channel: Option<String>,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// The authenticated caller of an engine operation
///
/// The core never resolves roles itself; the caller supplies them per call.
/// `super_admin` bypasses transition role guards.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub roles: HashSet<String>,
    pub super_admin: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: id.into(),
            roles: roles.into_iter().collect(),
            super_admin: false,
        }
    }

    pub fn super_admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: HashSet::new(),
            super_admin: true,
        }
    }
}

/// Data submitted alongside a transition request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionPayload {
    #[serde(default)]
    pub comment: Option<String>,
    /// Field values written to the record as part of the transition
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Attachment references uploaded with the request
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// One violated transition requirement, structured for client rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementViolation {
    /// Stable requirement label (e.g., "comment_required")
    pub requirement: String,
    pub message: String,
}

/// Immutable entry recording one executed transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionHistory {
    pub id: String,
    pub record_id: String,
    pub from_state: String,
    pub to_state: String,
    pub performed_by: String,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
}

/// What kind of mutation a revision entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionAction {
    Created,
    Updated,
    Transitioned,
    Commented,
    Attached,
    Assigned,
    SlaBreached,
    /// A post-transition action failed; the transition itself stood
    ActionFailed,
}

impl RevisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionAction::Created => "created",
            RevisionAction::Updated => "updated",
            RevisionAction::Transitioned => "transitioned",
            RevisionAction::Commented => "commented",
            RevisionAction::Attached => "attached",
            RevisionAction::Assigned => "assigned",
            RevisionAction::SlaBreached => "sla_breached",
            RevisionAction::ActionFailed => "action_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(RevisionAction::Created),
            "updated" => Some(RevisionAction::Updated),
            "transitioned" => Some(RevisionAction::Transitioned),
            "commented" => Some(RevisionAction::Commented),
            "attached" => Some(RevisionAction::Attached),
            "assigned" => Some(RevisionAction::Assigned),
            "sla_breached" => Some(RevisionAction::SlaBreached),
            "action_failed" => Some(RevisionAction::ActionFailed),
            _ => None,
        }
    }
}

/// One immutable audit-log entry describing a single mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub record_id: String,
    pub action: RevisionAction,
    pub performed_by: String,
    pub timestamp: DateTime<Utc>,
    /// Snapshot of the mutating payload, shape depends on `action`
    pub payload: Value,
}

/// Filter and pagination for revision queries
///
/// Results are always ordered by timestamp descending.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevisionFilter {
    pub action: Option<RevisionAction>,
    pub performed_by: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
