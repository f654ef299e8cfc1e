/// Caseway: hyperminimalist case-management workflow engine
///
/// Tracks incidents, requests, complaints, and queries through
/// organization-defined lifecycles with role-guarded transitions, SLA
/// deadline monitoring, and an append-only audit trail.

// Core configuration and setup
pub mod config;

// Injectable time source
pub mod clock;

// Engine error taxonomy
pub mod error;

// Generic criteria matcher (workflow/department/assignee selection)
pub mod matching;

// Workflow definition layer - types, persistence, hot-reload registry
pub mod workflow;

// Record layer - records, optimistic-concurrency store, audit trail
pub mod record;

// Runtime execution - transition engine, validator, actions, SLA monitor
pub mod runtime;

// External notifier interface
pub mod notify;

// HTTP API layer - REST endpoints over the engine
pub mod api;

// Server setup and initialization
pub mod server;

#[cfg(test)]
pub mod test_util;

// Re-export commonly used types for external consumers
pub use error::{EngineError, EngineResult};
pub use record::{Actor, NewRecord, Record, Revision, TransitionPayload};
pub use runtime::{SlaMonitor, TransitionEngine, TransitionOutcome};
pub use server::start_server;
pub use workflow::{Requirement, State, Transition, Workflow};
