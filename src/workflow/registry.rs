/// Hot-reload workflow registry using ArcSwap
///
/// The definition store is read-mostly: every transition execution resolves
/// its workflow graph exactly once per call, so the registry swaps the whole
/// compiled map atomically and readers are never blocked. An execution that
/// raced a definition edit simply resolves against whichever map it loaded.

use crate::error::{EngineError, EngineResult};
use crate::workflow::storage::WorkflowStorage;
use crate::workflow::types::{State, Transition, Workflow};
use arc_swap::ArcSwap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::HashMap;
use std::sync::Arc;

/// Lock-free registry of compiled workflow definitions
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Atomic pointer to the compiled workflow map, keyed by workflow id
    workflows: ArcSwap<HashMap<String, Arc<CompiledWorkflow>>>,
    storage: WorkflowStorage,
}

/// A workflow definition validated and indexed for execution
#[derive(Debug)]
pub struct CompiledWorkflow {
    pub workflow: Workflow,
    /// Initial state id; compile guarantees exactly one exists
    pub initial_state_id: String,
    /// States with no incoming transition besides the initial one; a
    /// configuration warning, not a structural error
    pub unreachable_states: Vec<String>,
}

impl CompiledWorkflow {
    pub fn state(&self, state_id: &str) -> Option<&State> {
        self.workflow.state(state_id)
    }

    pub fn transition(&self, transition_id: &str) -> Option<&Transition> {
        self.workflow.transition(transition_id)
    }

    pub fn transitions_from(&self, state_id: &str) -> Vec<&Transition> {
        self.workflow.transitions_from(state_id)
    }
}

/// Validate a definition and index it for execution
///
/// Fails with `InvalidTopology` when the workflow has no states, not exactly
/// one initial state, or a transition endpoint outside the workflow.
/// Unreachable states are collected (BFS from the initial state) and logged
/// by the registry; the initial state has no incoming edge by definition, so
/// unreachability is only a warning.
pub fn compile_workflow(workflow: &Workflow) -> EngineResult<CompiledWorkflow> {
    if workflow.states.is_empty() {
        return Err(EngineError::InvalidTopology(format!(
            "workflow '{}' has no states",
            workflow.id
        )));
    }

    let initial: Vec<&State> = workflow.states.iter().filter(|s| s.is_initial).collect();
    if initial.len() != 1 {
        return Err(EngineError::InvalidTopology(format!(
            "workflow '{}' must have exactly one initial state, found {}",
            workflow.id,
            initial.len()
        )));
    }
    let initial_state_id = initial[0].id.clone();

    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();
    for state in &workflow.states {
        let idx = graph.add_node(state.id.as_str());
        if index_of.insert(state.id.as_str(), idx).is_some() {
            return Err(EngineError::InvalidTopology(format!(
                "workflow '{}' declares state '{}' twice",
                workflow.id, state.id
            )));
        }
    }

    for transition in &workflow.transitions {
        let from = index_of.get(transition.from_state.as_str()).ok_or_else(|| {
            EngineError::InvalidTopology(format!(
                "transition '{}' references unknown from-state '{}'",
                transition.id, transition.from_state
            ))
        })?;
        let to = index_of.get(transition.to_state.as_str()).ok_or_else(|| {
            EngineError::InvalidTopology(format!(
                "transition '{}' references unknown to-state '{}'",
                transition.id, transition.to_state
            ))
        })?;
        graph.add_edge(*from, *to, ());
    }

    // BFS from the initial state to find unreachable states.
    let start = index_of[initial_state_id.as_str()];
    let mut reached = vec![false; graph.node_count()];
    let mut bfs = Bfs::new(&graph, start);
    while let Some(idx) = bfs.next(&graph) {
        reached[idx.index()] = true;
    }
    let unreachable_states: Vec<String> = workflow
        .states
        .iter()
        .filter(|s| !reached[index_of[s.id.as_str()].index()])
        .map(|s| s.id.clone())
        .collect();

    Ok(CompiledWorkflow {
        workflow: workflow.clone(),
        initial_state_id,
        unreachable_states,
    })
}

impl WorkflowRegistry {
    pub fn new(storage: WorkflowStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Populate the registry from storage at startup
    pub async fn init_from_storage(&self) -> EngineResult<()> {
        let stored = self.storage.load_all_workflows().await?;

        let mut compiled = HashMap::new();
        for (id, workflow) in stored {
            compiled.insert(id, Arc::new(self.compile_and_warn(&workflow)?));
        }

        self.workflows.store(Arc::new(compiled));

        tracing::info!(
            "Initialized workflow registry with {} workflows",
            self.workflows.load().len()
        );

        Ok(())
    }

    /// Hot-reload a single workflow after a definition edit
    ///
    /// Clones the current map, replaces one entry, and swaps the pointer.
    /// Lock-free for readers; in-flight executions keep the map they loaded.
    pub async fn reload_workflow(&self, workflow_id: &str) -> EngineResult<()> {
        let workflow = self
            .storage
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let compiled = Arc::new(self.compile_and_warn(&workflow)?);

        let current = self.workflows.load();
        let mut next = (**current).clone();
        next.insert(workflow_id.to_string(), compiled);
        self.workflows.store(Arc::new(next));

        tracing::info!("Hot-reloaded workflow: {}", workflow_id);
        Ok(())
    }

    /// Drop a workflow from the in-memory map (after a purge)
    pub fn remove_workflow(&self, workflow_id: &str) {
        let current = self.workflows.load();
        let mut next = (**current).clone();
        if next.remove(workflow_id).is_some() {
            self.workflows.store(Arc::new(next));
            tracing::info!("Removed workflow from registry: {}", workflow_id);
        }
    }

    /// Resolve a compiled workflow by id (lock-free read)
    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.load().get(workflow_id).cloned()
    }

    /// Snapshot of all compiled workflows (used for matching)
    pub fn all_workflows(&self) -> Vec<Arc<CompiledWorkflow>> {
        self.workflows.load().values().cloned().collect()
    }

    fn compile_and_warn(&self, workflow: &Workflow) -> EngineResult<CompiledWorkflow> {
        let compiled = compile_workflow(workflow)?;
        if !compiled.unreachable_states.is_empty() {
            tracing::warn!(
                "Workflow '{}' has unreachable states: {:?}",
                workflow.id,
                compiled.unreachable_states
            );
        }
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::simple_workflow;
    use crate::workflow::types::RecordType;

    #[test]
    fn compile_requires_exactly_one_initial_state() {
        let mut workflow = simple_workflow("wf-a", RecordType::Incident);
        workflow.states[1].is_initial = true;

        let err = compile_workflow(&workflow).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTopology(_)));

        workflow.states[0].is_initial = false;
        workflow.states[1].is_initial = false;
        let err = compile_workflow(&workflow).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTopology(_)));
    }

    #[test]
    fn compile_rejects_dangling_transition_endpoints() {
        let mut workflow = simple_workflow("wf-a", RecordType::Incident);
        workflow.transitions[0].to_state = "st-nowhere".to_string();

        let err = compile_workflow(&workflow).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTopology(_)));
    }

    #[test]
    fn unreachable_states_warn_but_compile() {
        let mut workflow = simple_workflow("wf-a", RecordType::Incident);
        workflow.states.push(State {
            id: "st-island".to_string(),
            name: "Island".to_string(),
            is_initial: false,
            is_terminal: false,
        });

        let compiled = compile_workflow(&workflow).unwrap();
        assert_eq!(compiled.unreachable_states, vec!["st-island".to_string()]);
    }

    #[test]
    fn compile_indexes_the_initial_state() {
        let workflow = simple_workflow("wf-a", RecordType::Incident);
        let compiled = compile_workflow(&workflow).unwrap();
        assert_eq!(compiled.initial_state_id, "st-new");
        assert!(compiled.unreachable_states.is_empty());
    }
}
