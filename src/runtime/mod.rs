/// Runtime Execution Layer
///
/// The dynamic half of the engine:
/// - The transition engine (guard checks, atomic state commit, audit writes)
/// - Requirement validation
/// - Best-effort post-transition actions
/// - The background SLA monitor

// The state machine orchestrator
pub mod engine;

// Transition requirement validation
pub mod validator;

// Post-transition action execution
pub mod actions;

// Background SLA breach scanner
pub mod sla;

// Re-export main types
pub use actions::{ActionExecutor, ActionWarning};
pub use engine::{TransitionEngine, TransitionOutcome};
pub use sla::SlaMonitor;
