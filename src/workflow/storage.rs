/// SQLite persistence layer for workflow definitions
///
/// Definitions are stored as JSON for flexibility, with indexed lookup
/// columns (record type, lifecycle, default flag) kept beside the blob for
/// structured queries. Every write re-validates the definition topology.

use crate::error::{EngineError, EngineResult};
use crate::workflow::registry::compile_workflow;
use crate::workflow::types::{RecordType, Workflow, WorkflowLifecycle};
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// SQLite-based workflow definition store
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the workflow storage schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                record_type TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                lifecycle TEXT NOT NULL DEFAULT 'active',
                is_default INTEGER NOT NULL DEFAULT 0,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_workflows_record_type
            ON workflows(record_type, lifecycle)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new workflow or update an existing one
    ///
    /// Validates the definition topology first and enforces the one-default-
    /// per-record-type invariant. Uses UPSERT so create and update share one
    /// path, like every other write in this store.
    pub async fn save_workflow(&self, workflow: &Workflow) -> EngineResult<()> {
        compile_workflow(workflow)?;

        // Check and write in one transaction so two concurrent saves cannot
        // both pass the default check.
        let mut tx = self.pool.begin().await?;

        if workflow.is_default {
            let clash = sqlx::query(
                r#"
                SELECT id FROM workflows
                WHERE record_type = ? AND is_default = 1 AND lifecycle = 'active' AND id != ?
                "#,
            )
            .bind(workflow.record_type.as_str())
            .bind(&workflow.id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = clash {
                let existing: String = row.get("id");
                return Err(EngineError::InvalidTopology(format!(
                    "workflow '{}' is already the default for record type {}",
                    existing,
                    workflow.record_type.as_str()
                )));
            }
        }

        let definition_json = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, record_type, active, lifecycle, is_default, definition, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                record_type = excluded.record_type,
                active = excluded.active,
                lifecycle = excluded.lifecycle,
                is_default = excluded.is_default,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(workflow.record_type.as_str())
        .bind(workflow.active as i64)
        .bind(workflow.lifecycle.as_str())
        .bind(workflow.is_default as i64)
        .bind(&definition_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Retrieve a workflow by ID, regardless of lifecycle state
    pub async fn get_workflow(&self, id: &str) -> EngineResult<Option<Workflow>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                let workflow: Workflow = serde_json::from_str(&definition_json)?;
                Ok(Some(workflow))
            }
            None => Ok(None),
        }
    }

    /// List workflow metadata, excluding soft-deleted definitions by default
    pub async fn list_workflows(
        &self,
        record_type: Option<RecordType>,
        include_deleted: bool,
    ) -> EngineResult<Vec<WorkflowSummary>> {
        let mut sql = String::from(
            "SELECT id, name, record_type, active, lifecycle, is_default, created_at, updated_at \
             FROM workflows WHERE 1=1",
        );
        if !include_deleted {
            sql.push_str(" AND lifecycle = 'active'");
        }
        if record_type.is_some() {
            sql.push_str(" AND record_type = ?");
        }
        sql.push_str(" ORDER BY updated_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(rt) = record_type {
            query = query.bind(rt.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut workflows = Vec::new();
        for row in rows {
            let record_type: String = row.get("record_type");
            let lifecycle: String = row.get("lifecycle");
            workflows.push(WorkflowSummary {
                id: row.get("id"),
                name: row.get("name"),
                record_type: RecordType::parse(&record_type)
                    .ok_or_else(|| EngineError::InvalidTopology(format!(
                        "unknown record type '{record_type}' in storage"
                    )))?,
                active: row.get::<i64, _>("active") != 0,
                lifecycle: WorkflowLifecycle::parse(&lifecycle)
                    .unwrap_or(WorkflowLifecycle::Active),
                is_default: row.get::<i64, _>("is_default") != 0,
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(workflows)
    }

    /// Load every workflow for registry initialization
    ///
    /// Soft-deleted definitions are included on purpose: records created
    /// under them must keep transitioning; only matching and listing exclude
    /// them.
    pub async fn load_all_workflows(&self) -> EngineResult<HashMap<String, Workflow>> {
        let rows = sqlx::query("SELECT id, definition FROM workflows")
            .fetch_all(&self.pool)
            .await?;

        let mut workflows = HashMap::new();
        for row in rows {
            let id: String = row.get("id");
            let definition_json: String = row.get("definition");
            let workflow: Workflow = serde_json::from_str(&definition_json)?;
            workflows.insert(id, workflow);
        }

        Ok(workflows)
    }

    /// Soft-delete a workflow: flagged, excluded from matching and listing
    pub async fn soft_delete_workflow(&self, id: &str) -> EngineResult<Workflow> {
        let mut workflow = self
            .get_workflow(id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))?;

        workflow.lifecycle = WorkflowLifecycle::SoftDeleted;
        workflow.is_default = false;
        self.save_workflow(&workflow).await?;

        Ok(workflow)
    }

    /// Permanently delete a workflow definition
    ///
    /// Refused with `HasDependentRecords` while any record still references
    /// the workflow.
    pub async fn purge_workflow(&self, id: &str) -> EngineResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE workflow_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        if count > 0 {
            return Err(EngineError::HasDependentRecords {
                workflow_id: id.to_string(),
                count,
            });
        }

        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::WorkflowNotFound(id.to_string()));
        }

        Ok(())
    }

    /// Deep-copy a workflow under fresh identifiers
    ///
    /// States, transitions, requirements, actions, and role assignments are
    /// all copied; the from/to topology is preserved through an id remap. The
    /// copy is never a default workflow.
    pub async fn duplicate_workflow(
        &self,
        id: &str,
        new_name: Option<String>,
    ) -> EngineResult<Workflow> {
        let mut workflow = self
            .get_workflow(id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))?;

        reissue_ids(&mut workflow);
        workflow.name = new_name.unwrap_or_else(|| format!("{} (copy)", workflow.name));
        workflow.is_default = false;
        workflow.lifecycle = WorkflowLifecycle::Active;

        self.save_workflow(&workflow).await?;
        Ok(workflow)
    }

    /// Import an exported definition under fresh identifiers
    ///
    /// The exported form is the definition itself; importing reissues every
    /// id while keeping the graph isomorphic, so export-then-import round
    /// trips (state ids differ, topology does not).
    pub async fn import_workflow(&self, mut workflow: Workflow) -> EngineResult<Workflow> {
        reissue_ids(&mut workflow);
        workflow.is_default = false;
        workflow.lifecycle = WorkflowLifecycle::Active;

        self.save_workflow(&workflow).await?;
        Ok(workflow)
    }
}

/// Replace workflow, state, and transition ids with fresh ones, rewriting
/// the transition endpoints through the state id map.
fn reissue_ids(workflow: &mut Workflow) {
    workflow.id = format!("wf-{}", Uuid::new_v4());

    let mut state_ids: HashMap<String, String> = HashMap::new();
    for state in &mut workflow.states {
        let fresh = format!("st-{}", Uuid::new_v4());
        state_ids.insert(state.id.clone(), fresh.clone());
        state.id = fresh;
    }

    for transition in &mut workflow.transitions {
        transition.id = format!("tr-{}", Uuid::new_v4());
        if let Some(fresh) = state_ids.get(&transition.from_state) {
            transition.from_state = fresh.clone();
        }
        if let Some(fresh) = state_ids.get(&transition.to_state) {
            transition.to_state = fresh.clone();
        }
    }
}

/// Basic workflow metadata for listing operations
#[derive(Debug, serde::Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub record_type: RecordType,
    pub active: bool,
    pub lifecycle: WorkflowLifecycle,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{memory_pool, simple_workflow};
    use std::collections::HashSet;

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let pool = memory_pool().await;
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.unwrap();

        let workflow = simple_workflow("wf-a", RecordType::Incident);
        storage.save_workflow(&workflow).await.unwrap();

        let loaded = storage.get_workflow("wf-a").await.unwrap().unwrap();
        assert_eq!(loaded.name, workflow.name);
        assert_eq!(loaded.states.len(), workflow.states.len());
        assert_eq!(loaded.transitions.len(), workflow.transitions.len());
    }

    #[tokio::test]
    async fn second_default_for_record_type_is_rejected() {
        let pool = memory_pool().await;
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.unwrap();

        let mut first = simple_workflow("wf-a", RecordType::Request);
        first.is_default = true;
        storage.save_workflow(&first).await.unwrap();

        let mut second = simple_workflow("wf-b", RecordType::Request);
        second.is_default = true;
        let err = storage.save_workflow(&second).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTopology(_)));

        // A default for a different record type is fine.
        let mut other = simple_workflow("wf-c", RecordType::Query);
        other.is_default = true;
        storage.save_workflow(&other).await.unwrap();
    }

    #[tokio::test]
    async fn soft_deleted_workflows_leave_listings_but_stay_loadable() {
        let pool = memory_pool().await;
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.unwrap();

        storage
            .save_workflow(&simple_workflow("wf-a", RecordType::Incident))
            .await
            .unwrap();
        storage.soft_delete_workflow("wf-a").await.unwrap();

        let listed = storage.list_workflows(None, false).await.unwrap();
        assert!(listed.is_empty());

        let listed_all = storage.list_workflows(None, true).await.unwrap();
        assert_eq!(listed_all.len(), 1);

        // Still resolvable by id for records that reference it.
        let loaded = storage.get_workflow("wf-a").await.unwrap().unwrap();
        assert_eq!(loaded.lifecycle, WorkflowLifecycle::SoftDeleted);
    }

    #[tokio::test]
    async fn duplicate_preserves_topology_under_fresh_ids() {
        let pool = memory_pool().await;
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.unwrap();

        let original = simple_workflow("wf-a", RecordType::Incident);
        storage.save_workflow(&original).await.unwrap();

        let copy = storage
            .duplicate_workflow("wf-a", Some("Copied".to_string()))
            .await
            .unwrap();

        assert_ne!(copy.id, original.id);
        assert_eq!(copy.name, "Copied");
        assert_eq!(copy.states.len(), original.states.len());
        assert_eq!(copy.transitions.len(), original.transitions.len());

        // No id from the original survives in the copy.
        let original_ids: HashSet<&String> = original
            .states
            .iter()
            .map(|s| &s.id)
            .chain(original.transitions.iter().map(|t| &t.id))
            .collect();
        for state in &copy.states {
            assert!(!original_ids.contains(&state.id));
        }

        // Topology is isomorphic: the copy's initial state still reaches the
        // same number of outgoing transitions.
        let initial = copy.initial_state().unwrap();
        assert_eq!(
            copy.transitions_from(&initial.id).len(),
            original
                .transitions_from(&original.initial_state().unwrap().id)
                .len()
        );
    }

    #[tokio::test]
    async fn export_then_import_is_isomorphic() {
        let pool = memory_pool().await;
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.unwrap();

        let original = simple_workflow("wf-a", RecordType::Incident);
        storage.save_workflow(&original).await.unwrap();

        // Export is the definition itself; re-import reissues ids.
        let exported = storage.get_workflow("wf-a").await.unwrap().unwrap();
        let imported = storage.import_workflow(exported).await.unwrap();

        assert_ne!(imported.id, original.id);
        assert_eq!(imported.states.len(), original.states.len());
        assert_eq!(imported.transitions.len(), original.transitions.len());

        // Requirement and action sets are carried over per transition.
        for (a, b) in original.transitions.iter().zip(imported.transitions.iter()) {
            assert_eq!(a.requirements, b.requirements);
            assert_eq!(a.actions, b.actions);
            assert_eq!(a.allowed_roles, b.allowed_roles);
        }
    }

    #[tokio::test]
    async fn purge_without_dependents_deletes_the_row() {
        let pool = memory_pool().await;
        let storage = WorkflowStorage::new(pool.clone());
        storage.init_schema().await.unwrap();
        // Purge counts dependents in the records table.
        crate::record::store::RecordStore::new(pool)
            .init_schema()
            .await
            .unwrap();

        storage
            .save_workflow(&simple_workflow("wf-a", RecordType::Incident))
            .await
            .unwrap();
        storage.purge_workflow("wf-a").await.unwrap();

        assert!(storage.get_workflow("wf-a").await.unwrap().is_none());
        assert!(matches!(
            storage.purge_workflow("wf-a").await.unwrap_err(),
            EngineError::WorkflowNotFound(_)
        ));
    }
}
