/// Post-transition action executor
///
/// Actions run after the state change has committed and are deliberately
/// best-effort: a notification that cannot be delivered or a field write that
/// loses a version race must never revert a durable transition. Failures are
/// collected as warnings and recorded in the revision log.

use crate::clock::Clock;
use crate::error::EngineResult;
use crate::notify::Notifier;
use crate::record::store::RecordStore;
use crate::record::types::{Actor, Record, Revision, RevisionAction};
use crate::workflow::types::Action;
use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// One action that failed after the transition committed
#[derive(Debug, Clone, Serialize)]
pub struct ActionWarning {
    pub action: String,
    pub message: String,
}

/// Applies a transition's configured actions in declared order
#[derive(Clone)]
pub struct ActionExecutor {
    store: RecordStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl ActionExecutor {
    pub fn new(store: RecordStore, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Run the actions against the freshly transitioned record.
    ///
    /// Each action is independently fallible; a failure is logged, written to
    /// the revision log as a warning, and the loop continues with the next
    /// action. The in-memory record is rolled back to its pre-action state on
    /// failure so later actions don't build on an unpersisted mutation.
    pub async fn run(
        &self,
        record: &mut Record,
        actions: &[Action],
        actor: &Actor,
    ) -> Vec<ActionWarning> {
        let mut warnings = Vec::new();

        for action in actions {
            let snapshot = record.clone();
            if let Err(e) = self.apply(record, action).await {
                tracing::warn!(
                    "Action '{}' failed for record {}: {}",
                    action.label(),
                    record.id,
                    e
                );
                *record = snapshot;

                let warning = ActionWarning {
                    action: action.label().to_string(),
                    message: e.to_string(),
                };
                self.record_warning(record, actor, &warning).await;
                warnings.push(warning);
            }
        }

        warnings
    }

    async fn apply(&self, record: &mut Record, action: &Action) -> EngineResult<()> {
        match action {
            Action::Assign { assignee } => {
                record.assignee = Some(assignee.clone());
                self.persist(record).await
            }
            Action::SetField { field, value } => {
                record.fields.insert(field.clone(), value.clone());
                self.persist(record).await
            }
            Action::RecomputeSla { hours } => {
                record.sla_due_at = Some(self.clock.now() + Duration::hours(*hours));
                record.sla_breached = false;
                self.persist(record).await
            }
            Action::ChangeRecordType { to } => {
                record.record_type = *to;
                self.persist(record).await
            }
            Action::Notify { kind, recipients } => {
                // Fire-and-forget: delivery happens off this call path and
                // its outcome never surfaces here.
                let notifier = Arc::clone(&self.notifier);
                let kind = kind.clone();
                let record_id = record.id.clone();
                let recipients = recipients.clone();
                tokio::spawn(async move {
                    notifier.notify(&kind, &record_id, &recipients).await;
                });
                Ok(())
            }
        }
    }

    /// Persist an action's record mutation with its own version bump.
    async fn persist(&self, record: &mut Record) -> EngineResult<()> {
        let expected = record.version;
        record.version += 1;
        record.updated_at = self.clock.now();
        self.store.update_record(record, expected).await
    }

    /// Best-effort warning entry; a failure here only logs.
    async fn record_warning(&self, record: &Record, actor: &Actor, warning: &ActionWarning) {
        let revision = Revision {
            id: format!("rev-{}", Uuid::new_v4()),
            record_id: record.id.clone(),
            action: RevisionAction::ActionFailed,
            performed_by: actor.id.clone(),
            timestamp: self.clock.now(),
            payload: json!({
                "action": warning.action,
                "message": warning.message,
            }),
        };

        if let Err(e) = self.store.append_revision(&revision).await {
            tracing::error!(
                "Failed to record action warning for record {}: {}",
                record.id,
                e
            );
        }
    }
}
