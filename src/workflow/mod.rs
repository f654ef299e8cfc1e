/// Workflow Definition Layer
///
/// Owns the static side of the engine: workflow/state/transition definitions,
/// their SQLite persistence, and the hot-reload registry that serves compiled
/// definitions to the transition engine. Records reference definitions by id
/// only, so editing a workflow never rewrites recorded history.

// Definition types (Workflow, State, Transition, Requirement, Action)
pub mod types;

// SQLite persistence with JSON definition columns
pub mod storage;

// Lock-free hot-reload registry using ArcSwap, plus the compile step
pub mod registry;

// Re-export commonly used types
pub use registry::{compile_workflow, CompiledWorkflow, WorkflowRegistry};
pub use storage::{WorkflowStorage, WorkflowSummary};
pub use types::{Action, RecordType, Requirement, State, Transition, Workflow, WorkflowLifecycle};
