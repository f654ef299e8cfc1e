/// Record Layer
///
/// The dynamic side of the engine: records (incidents, requests, complaints,
/// queries), their optimistic-concurrency persistence, and the append-only
/// transition history and revision log.

// Record, actor, payload, history, and revision types
pub mod types;

// SQLite persistence with compare-and-swap versioning
pub mod store;

// Re-export commonly used types
pub use store::RecordStore;
pub use types::{
    Actor, NewRecord, Record, RequirementViolation, Revision, RevisionAction, RevisionFilter,
    TransitionHistory, TransitionPayload,
};
