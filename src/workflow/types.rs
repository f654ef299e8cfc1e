/// Core workflow definition types
///
/// A workflow is an organization-defined state machine for one record type:
/// states, directed transitions between them, and per-transition guards
/// (roles, requirements) and effects (actions). Definitions are serialized
/// to JSON for persistence and compiled into an indexed form for execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of case a workflow applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Incident,
    Request,
    Complaint,
    Query,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Incident => "incident",
            RecordType::Request => "request",
            RecordType::Complaint => "complaint",
            RecordType::Query => "query",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incident" => Some(RecordType::Incident),
            "request" => Some(RecordType::Request),
            "complaint" => Some(RecordType::Complaint),
            "query" => Some(RecordType::Query),
            _ => None,
        }
    }
}

/// Deletion lifecycle of a workflow definition.
///
/// Soft-deleted workflows are excluded from matching and listing but still
/// resolvable by id so historical records keep working. Purging removes the
/// row entirely and is guarded by a dependent-record check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowLifecycle {
    Active,
    SoftDeleted,
}

impl WorkflowLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowLifecycle::Active => "active",
            WorkflowLifecycle::SoftDeleted => "soft_deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WorkflowLifecycle::Active),
            "soft_deleted" => Some(WorkflowLifecycle::SoftDeleted),
            _ => None,
        }
    }
}

/// A complete workflow definition
///
/// Stored as JSON in SQLite with indexed lookup columns beside it. Records
/// reference workflows by id only; editing a definition never rewrites
/// history already recorded against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-incident-default")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// Record type this workflow applies to
    pub record_type: RecordType,
    /// Inactive workflows are kept but never matched for new records
    pub active: bool,
    /// Soft-delete lifecycle state
    pub lifecycle: WorkflowLifecycle,
    /// Exactly one workflow per record type may be the no-classification
    /// fallback match
    #[serde(default)]
    pub is_default: bool,
    /// Classifications this workflow is assigned to (matching dimension)
    #[serde(default)]
    pub classifications: Vec<String>,
    /// Optional matching constraints on the remaining dimensions
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    /// Hours until the SLA deadline for records created under this workflow
    #[serde(default)]
    pub sla_hours: Option<i64>,
    /// States of the machine; exactly one must be flagged initial
    pub states: Vec<State>,
    /// Directed edges between states
    pub transitions: Vec<Transition>,
}

impl Workflow {
    /// The state flagged `is_initial`, if the definition has one.
    pub fn initial_state(&self) -> Option<&State> {
        self.states.iter().find(|s| s.is_initial)
    }

    pub fn state(&self, state_id: &str) -> Option<&State> {
        self.states.iter().find(|s| s.id == state_id)
    }

    pub fn transition(&self, transition_id: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == transition_id)
    }

    /// All transitions leaving the given state, in declaration order.
    pub fn transitions_from(&self, state_id: &str) -> Vec<&Transition> {
        self.transitions
            .iter()
            .filter(|t| t.from_state == state_id)
            .collect()
    }
}

/// A single state within a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// Unique state identifier within the workflow (e.g., "st-new")
    pub id: String,
    /// Display name (e.g., "New", "In Progress")
    pub name: String,
    /// Entry point of the machine; exactly one per workflow
    #[serde(default)]
    pub is_initial: bool,
    /// Terminal states accept no outgoing transitions
    #[serde(default)]
    pub is_terminal: bool,
}

/// A directed edge between two states of the same workflow
///
/// Carries the guards checked before execution (allowed roles, requirements)
/// and the effects applied after the state change commits (actions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Unique transition identifier within the workflow (e.g., "tr-start")
    pub id: String,
    /// Display name (e.g., "Start work", "Resolve")
    pub name: String,
    /// Source state id; must match the record's current state at execution
    pub from_state: String,
    /// Target state id
    pub to_state: String,
    /// Roles allowed to execute; empty means any authenticated role
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    /// Preconditions evaluated against the submitted payload, in order
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    /// Post-commit effects, executed in declaration order
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Typed transition guard evaluated against the record and payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    /// Payload must carry a non-empty comment
    CommentRequired,
    /// The named field must be present and non-empty on payload or record
    FieldRequired { field: String },
    /// Payload must carry at least one attachment
    AttachmentRequired,
    /// Payload must carry at least `min` attachments
    MinAttachments { min: usize },
}

/// Typed post-transition effect
///
/// Actions run after the state change is durable. Each is independently
/// fallible; a failure is recorded as a warning and never reverts the
/// committed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Assign the record to a user or role identifier
    Assign { assignee: String },
    /// Set a record field to a fixed value
    SetField { field: String, value: Value },
    /// Reset the SLA clock to `hours` from now and clear the breach flag
    RecomputeSla { hours: i64 },
    /// Convert the record to another type (e.g., incident to request)
    ChangeRecordType { to: RecordType },
    /// Hand a notification request to the external notifier (fire-and-forget)
    Notify { kind: String, recipients: Vec<String> },
}

impl Action {
    /// Short label used in logs and warning revisions.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Assign { .. } => "assign",
            Action::SetField { .. } => "set_field",
            Action::RecomputeSla { .. } => "recompute_sla",
            Action::ChangeRecordType { .. } => "change_record_type",
            Action::Notify { .. } => "notify",
        }
    }
}
