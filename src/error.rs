/// Engine error taxonomy
///
/// Structured errors returned verbatim to callers so the presentation layer
/// can render precise messages. Only `StaleVersion` is meant to be retried,
/// and the retry is the caller's job after reloading the record.

use crate::record::types::RequirementViolation;
use crate::workflow::types::RecordType;
use thiserror::Error;

/// Every failure the engine can hand back to a caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("state not found: {0}")]
    StateNotFound(String),

    #[error("transition not found: {0}")]
    TransitionNotFound(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Definition or execution topology is broken: workflow without an
    /// initial state, transition endpoints outside the workflow, or a
    /// transition whose from-state does not match the record's current state.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("transition '{transition_id}' requires one of roles {required:?}")]
    Forbidden {
        transition_id: String,
        required: Vec<String>,
    },

    /// All violated requirements, reported together so the client can render
    /// every problem at once.
    #[error("{} transition requirement(s) not met", .0.len())]
    RequirementsNotMet(Vec<RequirementViolation>),

    #[error("state '{0}' is terminal and accepts no outgoing transitions")]
    TerminalState(String),

    /// Optimistic concurrency conflict. The caller must reload and retry.
    #[error("stale version for record {record_id}: expected {expected}, found {found}")]
    StaleVersion {
        record_id: String,
        expected: i64,
        found: i64,
    },

    #[error("workflow '{workflow_id}' is still referenced by {count} record(s)")]
    HasDependentRecords { workflow_id: String, count: i64 },

    /// More than one workflow survived criteria matching with the same
    /// specificity score. The caller must disambiguate (extra criteria or an
    /// explicit workflow id).
    #[error("ambiguous workflow match: {candidates:?}")]
    AmbiguousWorkflow { candidates: Vec<String> },

    /// No candidate matched and no default workflow exists for the type.
    #[error("no applicable workflow for record type {0:?}")]
    NoApplicableWorkflow(RecordType),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("definition encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
