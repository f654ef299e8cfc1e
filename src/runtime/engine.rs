/// Transition engine
///
/// Orchestrates the state machine: resolves the record's workflow graph,
/// checks the guards (version, topology, roles, requirements), commits the
/// state change together with its history and revision entries, then runs
/// the configured actions best-effort. The record's current state is mutable
/// only through this engine; the field-update path deliberately cannot touch
/// `current_state_id`, so no guard can be bypassed.

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::matching::{match_candidates, workflow_candidate, Dimension};
use crate::record::store::RecordStore;
use crate::record::types::{
    Actor, NewRecord, Record, Revision, RevisionAction, TransitionHistory, TransitionPayload,
};
use crate::runtime::actions::{ActionExecutor, ActionWarning};
use crate::runtime::validator;
use crate::workflow::registry::{CompiledWorkflow, WorkflowRegistry};
use crate::workflow::types::{Transition, WorkflowLifecycle};
use chrono::Duration;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a successful transition execution
///
/// `warnings` lists post-commit actions that failed; the transition itself
/// stood regardless.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub record: Record,
    pub warnings: Vec<ActionWarning>,
}

/// The state machine orchestrator
#[derive(Clone)]
pub struct TransitionEngine {
    registry: Arc<WorkflowRegistry>,
    store: RecordStore,
    actions: ActionExecutor,
    clock: Arc<dyn Clock>,
}

impl TransitionEngine {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        store: RecordStore,
        actions: ActionExecutor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            actions,
            clock,
        }
    }

    /// Create a record: resolve its workflow, place it in the initial state,
    /// compute the SLA deadline, and write the creation revision.
    ///
    /// Workflow resolution goes through the criteria matcher unless the
    /// caller names a workflow explicitly (which is also how an ambiguous
    /// match is resolved on retry).
    pub async fn create_record(&self, new: NewRecord, actor: &Actor) -> EngineResult<Record> {
        let workflow = match &new.workflow_id {
            Some(id) => self
                .registry
                .get_workflow(id)
                .ok_or_else(|| EngineError::WorkflowNotFound(id.clone()))?,
            None => self.resolve_workflow(&new)?,
        };

        let now = self.clock.now();
        let record = Record {
            id: format!("rec-{}", Uuid::new_v4()),
            record_type: new.record_type,
            workflow_id: workflow.workflow.id.clone(),
            current_state_id: workflow.initial_state_id.clone(),
            classification_id: new.classification_id,
            department_id: new.department_id,
            location_id: new.location_id,
            channel: new.channel,
            assignee: new.assignee,
            reporter: new.reporter.unwrap_or_else(|| actor.id.clone()),
            fields: new.fields,
            sla_due_at: workflow.workflow.sla_hours.map(|h| now + Duration::hours(h)),
            sla_breached: false,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let revision = self.revision(
            &record.id,
            RevisionAction::Created,
            actor,
            json!({
                "workflow_id": record.workflow_id,
                "initial_state": record.current_state_id,
                "record_type": record.record_type,
            }),
        );

        self.store.insert_record(&record, &revision).await?;

        tracing::info!(
            "Created record {} in workflow {} at state {}",
            record.id,
            record.workflow_id,
            record.current_state_id
        );

        Ok(record)
    }

    /// Execute a transition on a record.
    ///
    /// Check order matters and is observable through the error taxonomy:
    /// version, transition resolution, terminal state, from-state topology,
    /// role authorization, requirements. Nothing is written until every
    /// check passes; the state swap, history entry, and revision entry then
    /// commit atomically, and only afterwards do the configured actions run
    /// best-effort.
    pub async fn execute_transition(
        &self,
        record_id: &str,
        transition_id: &str,
        actor: &Actor,
        expected_version: i64,
        payload: TransitionPayload,
    ) -> EngineResult<TransitionOutcome> {
        let mut record = self.load_record(record_id).await?;

        if record.version != expected_version {
            return Err(EngineError::StaleVersion {
                record_id: record.id.clone(),
                expected: expected_version,
                found: record.version,
            });
        }

        // Resolve the graph once per call; a definition edited mid-flight
        // shows up as TransitionNotFound, never as corrupted state.
        let workflow = self
            .registry
            .get_workflow(&record.workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(record.workflow_id.clone()))?;

        let transition = workflow
            .transition(transition_id)
            .ok_or_else(|| EngineError::TransitionNotFound(transition_id.to_string()))?
            .clone();

        let current = workflow
            .state(&record.current_state_id)
            .ok_or_else(|| EngineError::StateNotFound(record.current_state_id.clone()))?;

        if current.is_terminal {
            return Err(EngineError::TerminalState(current.id.clone()));
        }

        if transition.from_state != record.current_state_id {
            return Err(EngineError::InvalidTopology(format!(
                "transition '{}' starts from state '{}' but record {} is in state '{}'",
                transition.id, transition.from_state, record.id, record.current_state_id
            )));
        }

        authorize(&transition, actor)?;

        let violations = validator::validate(&transition, &record, &payload);
        if !violations.is_empty() {
            return Err(EngineError::RequirementsNotMet(violations));
        }

        // Commit: state swap + history + revision, atomically.
        let now = self.clock.now();
        let from_state = record.current_state_id.clone();
        record.current_state_id = transition.to_state.clone();
        record.version += 1;
        record.updated_at = now;

        let history = TransitionHistory {
            id: format!("th-{}", Uuid::new_v4()),
            record_id: record.id.clone(),
            from_state: from_state.clone(),
            to_state: transition.to_state.clone(),
            performed_by: actor.id.clone(),
            timestamp: now,
            comment: payload.comment.clone(),
        };

        let revision = self.revision(
            &record.id,
            RevisionAction::Transitioned,
            actor,
            json!({
                "transition_id": transition.id,
                "from_state": from_state,
                "to_state": transition.to_state,
                "comment": payload.comment,
            }),
        );

        self.store
            .commit_transition(&record, expected_version, &history, &revision)
            .await?;

        tracing::info!(
            "Record {} transitioned {} -> {} by {}",
            record.id,
            from_state,
            transition.to_state,
            actor.id
        );

        // Post-commit effects never revert the transition.
        let warnings = self.actions.run(&mut record, &transition.actions, actor).await;

        Ok(TransitionOutcome { record, warnings })
    }

    /// Transitions the actor could execute from the record's current state.
    ///
    /// Used by clients to render the allowed next steps without attempting
    /// execution. Terminal states have no outgoing transitions by policy.
    pub async fn available_transitions(
        &self,
        record_id: &str,
        actor: &Actor,
    ) -> EngineResult<Vec<Transition>> {
        let record = self.load_record(record_id).await?;

        let workflow = self
            .registry
            .get_workflow(&record.workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(record.workflow_id.clone()))?;

        if workflow
            .state(&record.current_state_id)
            .map(|s| s.is_terminal)
            .unwrap_or(false)
        {
            return Ok(Vec::new());
        }

        Ok(workflow
            .transitions_from(&record.current_state_id)
            .into_iter()
            .filter(|t| role_allows(t, actor))
            .cloned()
            .collect())
    }

    /// Add a comment to a record's audit trail.
    pub async fn add_comment(
        &self,
        record_id: &str,
        expected_version: i64,
        actor: &Actor,
        comment: String,
    ) -> EngineResult<Record> {
        self.mutate(
            record_id,
            expected_version,
            actor,
            RevisionAction::Commented,
            json!({ "comment": comment }),
            |_record| {},
        )
        .await
    }

    /// Record an attachment against a record.
    pub async fn attach(
        &self,
        record_id: &str,
        expected_version: i64,
        actor: &Actor,
        attachment: String,
    ) -> EngineResult<Record> {
        self.mutate(
            record_id,
            expected_version,
            actor,
            RevisionAction::Attached,
            json!({ "attachment": attachment }),
            |_record| {},
        )
        .await
    }

    /// Re-assign a record (None clears the assignee).
    pub async fn assign(
        &self,
        record_id: &str,
        expected_version: i64,
        actor: &Actor,
        assignee: Option<String>,
    ) -> EngineResult<Record> {
        let snapshot = json!({ "assignee": assignee });
        self.mutate(
            record_id,
            expected_version,
            actor,
            RevisionAction::Assigned,
            snapshot,
            move |record| record.assignee = assignee.clone(),
        )
        .await
    }

    /// Merge field values into a record.
    ///
    /// This is the generic update path; it cannot change the record's state,
    /// workflow, or SLA bookkeeping. State changes go through
    /// `execute_transition` only.
    pub async fn update_fields(
        &self,
        record_id: &str,
        expected_version: i64,
        actor: &Actor,
        fields: Map<String, Value>,
    ) -> EngineResult<Record> {
        let snapshot = json!({ "fields": fields });
        self.mutate(
            record_id,
            expected_version,
            actor,
            RevisionAction::Updated,
            snapshot,
            move |record| {
                for (key, value) in &fields {
                    record.fields.insert(key.clone(), value.clone());
                }
            },
        )
        .await
    }

    async fn mutate<F>(
        &self,
        record_id: &str,
        expected_version: i64,
        actor: &Actor,
        action: RevisionAction,
        snapshot: Value,
        apply: F,
    ) -> EngineResult<Record>
    where
        F: FnOnce(&mut Record),
    {
        let mut record = self.load_record(record_id).await?;

        if record.version != expected_version {
            return Err(EngineError::StaleVersion {
                record_id: record.id.clone(),
                expected: expected_version,
                found: record.version,
            });
        }

        apply(&mut record);
        record.version += 1;
        record.updated_at = self.clock.now();

        let revision = self.revision(&record.id, action, actor, snapshot);
        self.store
            .mutate_with_revision(&record, expected_version, &revision)
            .await?;

        Ok(record)
    }

    async fn load_record(&self, record_id: &str) -> EngineResult<Record> {
        self.store
            .get_record(record_id)
            .await?
            .ok_or_else(|| EngineError::RecordNotFound(record_id.to_string()))
    }

    /// Rank the active workflows for the new record's criteria.
    ///
    /// Default workflows sit outside the ranked pass and catch the empty
    /// outcome; a tie among non-defaults is ambiguous and surfaces as an
    /// error naming the tied candidates.
    fn resolve_workflow(&self, new: &NewRecord) -> EngineResult<Arc<CompiledWorkflow>> {
        let all = self.registry.all_workflows();
        let eligible: Vec<&Arc<CompiledWorkflow>> = all
            .iter()
            .filter(|w| {
                w.workflow.active
                    && w.workflow.lifecycle == WorkflowLifecycle::Active
                    && w.workflow.record_type == new.record_type
            })
            .collect();

        let candidates: Vec<_> = eligible
            .iter()
            .filter(|w| !w.workflow.is_default)
            .map(|w| workflow_candidate(&w.workflow))
            .collect();

        let mut criteria = HashMap::new();
        if let Some(classification) = &new.classification_id {
            criteria.insert(Dimension::Classification, classification.clone());
        }
        if let Some(location) = &new.location_id {
            criteria.insert(Dimension::Location, location.clone());
        }
        if let Some(department) = &new.department_id {
            criteria.insert(Dimension::Department, department.clone());
        }
        if let Some(channel) = &new.channel {
            criteria.insert(Dimension::Channel, channel.clone());
        }

        let outcome = match_candidates(&candidates, &criteria);

        if outcome.single {
            let id = outcome.matched_id.as_deref().unwrap_or_default();
            return eligible
                .iter()
                .find(|w| w.workflow.id == id)
                .map(|w| Arc::clone(w))
                .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()));
        }

        if !outcome.is_empty() {
            return Err(EngineError::AmbiguousWorkflow {
                candidates: outcome.matches,
            });
        }

        // No ranked survivor: fall back to the default workflow.
        eligible
            .iter()
            .find(|w| w.workflow.is_default)
            .map(|w| Arc::clone(w))
            .ok_or(EngineError::NoApplicableWorkflow(new.record_type))
    }

    fn revision(&self, record_id: &str, action: RevisionAction, actor: &Actor, payload: Value) -> Revision {
        Revision {
            id: format!("rev-{}", Uuid::new_v4()),
            record_id: record_id.to_string(),
            action,
            performed_by: actor.id.clone(),
            timestamp: self.clock.now(),
            payload,
        }
    }
}

fn role_allows(transition: &Transition, actor: &Actor) -> bool {
    actor.super_admin
        || transition.allowed_roles.is_empty()
        || transition.allowed_roles.iter().any(|r| actor.roles.contains(r))
}

fn authorize(transition: &Transition, actor: &Actor) -> EngineResult<()> {
    if role_allows(transition, actor) {
        Ok(())
    } else {
        Err(EngineError::Forbidden {
            transition_id: transition.id.clone(),
            required: transition.allowed_roles.clone(),
        })
    }
}
