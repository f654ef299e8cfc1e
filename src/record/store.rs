/// SQLite persistence layer for records and their audit trail
///
/// Records are compare-and-swapped on their `version` column; the loser of a
/// concurrent write receives `StaleVersion` and must reload. History and
/// revision rows are append-only and never updated; only the explicit
/// retention cleanup may delete revisions.

use crate::error::{EngineError, EngineResult};
use crate::record::types::{Record, Revision, RevisionAction, RevisionFilter, TransitionHistory};
use crate::workflow::types::RecordType;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

const DEFAULT_PAGE_SIZE: i64 = 50;

/// SQLite-based record store
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize record, history, and revision schemas
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                workflow_id TEXT NOT NULL,
                current_state_id TEXT NOT NULL,
                classification_id TEXT,
                department_id TEXT,
                location_id TEXT,
                channel TEXT,
                assignee TEXT,
                reporter TEXT NOT NULL,
                fields JSON NOT NULL DEFAULT '{}',
                sla_due_at TEXT,
                sla_breached INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_sla ON records(sla_breached, sla_due_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_workflow ON records(workflow_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transition_history (
                id TEXT PRIMARY KEY,
                record_id TEXT NOT NULL,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                performed_by TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                comment TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_record ON transition_history(record_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS revisions (
                id TEXT PRIMARY KEY,
                record_id TEXT NOT NULL,
                action TEXT NOT NULL,
                performed_by TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                payload JSON NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_revisions_record ON revisions(record_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a fresh record and its creation revision in one transaction
    pub async fn insert_record(&self, record: &Record, revision: &Revision) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO records (
                id, record_type, workflow_id, current_state_id,
                classification_id, department_id, location_id, channel,
                assignee, reporter, fields, sla_due_at, sla_breached,
                version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.record_type.as_str())
        .bind(&record.workflow_id)
        .bind(&record.current_state_id)
        .bind(&record.classification_id)
        .bind(&record.department_id)
        .bind(&record.location_id)
        .bind(&record.channel)
        .bind(&record.assignee)
        .bind(&record.reporter)
        .bind(serde_json::to_string(&record.fields)?)
        .bind(record.sla_due_at.map(|t| t.to_rfc3339()))
        .bind(record.sla_breached as i64)
        .bind(record.version)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_revision(&mut tx, revision).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Load a record by id
    pub async fn get_record(&self, id: &str) -> EngineResult<Option<Record>> {
        let row = sqlx::query("SELECT * FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    /// Compare-and-swap update of a mutated record
    ///
    /// `record` carries the post-mutation state including the incremented
    /// version; the swap only lands if the stored version still equals
    /// `expected_version`.
    pub async fn update_record(&self, record: &Record, expected_version: i64) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        cas_update(&mut tx, record, expected_version).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Commit a transition: state swap, history entry, and revision entry
    /// land atomically or not at all
    pub async fn commit_transition(
        &self,
        record: &Record,
        expected_version: i64,
        history: &TransitionHistory,
        revision: &Revision,
    ) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        cas_update(&mut tx, record, expected_version).await?;

        sqlx::query(
            r#"
            INSERT INTO transition_history (id, record_id, from_state, to_state, performed_by, timestamp, comment)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&history.id)
        .bind(&history.record_id)
        .bind(&history.from_state)
        .bind(&history.to_state)
        .bind(&history.performed_by)
        .bind(history.timestamp.to_rfc3339())
        .bind(&history.comment)
        .execute(&mut *tx)
        .await?;

        insert_revision(&mut tx, revision).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Apply a non-transition mutation and its revision entry atomically
    ///
    /// Used for comments, assignments, attachments, and field updates: the
    /// version bump and the audit entry land together or not at all.
    pub async fn mutate_with_revision(
        &self,
        record: &Record,
        expected_version: i64,
        revision: &Revision,
    ) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        cas_update(&mut tx, record, expected_version).await?;
        insert_revision(&mut tx, revision).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Append a single revision entry outside a transition commit
    pub async fn append_revision(&self, revision: &Revision) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_revision(&mut tx, revision).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Transition history of a record, most recent first
    pub async fn history(&self, record_id: &str) -> EngineResult<Vec<TransitionHistory>> {
        let rows = sqlx::query(
            "SELECT * FROM transition_history WHERE record_id = ? ORDER BY timestamp DESC, rowid DESC",
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect()
    }

    /// Paginated revision query for a record
    ///
    /// Filterable by action type, actor, and date range; always ordered by
    /// timestamp descending.
    pub async fn revisions(
        &self,
        record_id: &str,
        filter: &RevisionFilter,
    ) -> EngineResult<Vec<Revision>> {
        let mut sql = String::from("SELECT * FROM revisions WHERE record_id = ?");
        if filter.action.is_some() {
            sql.push_str(" AND action = ?");
        }
        if filter.performed_by.is_some() {
            sql.push_str(" AND performed_by = ?");
        }
        if filter.from.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        if filter.to.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }
        sql.push_str(" ORDER BY timestamp DESC, rowid DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql).bind(record_id);
        if let Some(action) = filter.action {
            query = query.bind(action.as_str());
        }
        if let Some(actor) = &filter.performed_by {
            query = query.bind(actor);
        }
        if let Some(from) = filter.from {
            query = query.bind(from.to_rfc3339());
        }
        if let Some(to) = filter.to {
            query = query.bind(to.to_rfc3339());
        }
        query = query
            .bind(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .bind(filter.offset.unwrap_or(0));

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_revision).collect()
    }

    /// Retention cleanup: purge revisions older than the cutoff
    ///
    /// The only sanctioned delete on the revision log; callers must gate it
    /// behind separate authorization.
    pub async fn purge_revisions_before(&self, cutoff: DateTime<Utc>) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM revisions WHERE timestamp < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Open records whose SLA deadline has passed and are not yet flagged
    pub async fn overdue_records(&self, now: DateTime<Utc>) -> EngineResult<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM records
            WHERE sla_breached = 0 AND sla_due_at IS NOT NULL AND sla_due_at < ?
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Atomically flip the breach flag and write its revision entry
    ///
    /// Returns false when the record was already flagged, which makes
    /// overlapping monitor runs idempotent without a distributed lock. The
    /// flip and the revision land in one transaction: if the revision insert
    /// fails, the flip rolls back and the next scan retries the record.
    pub async fn mark_sla_breached(
        &self,
        record_id: &str,
        now: DateTime<Utc>,
        revision: &Revision,
    ) -> EngineResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE records
            SET sla_breached = 1, version = version + 1, updated_at = ?
            WHERE id = ? AND sla_breached = 0
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(record_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        insert_revision(&mut tx, revision).await?;
        tx.commit().await?;

        Ok(true)
    }
}

async fn cas_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    record: &Record,
    expected_version: i64,
) -> EngineResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE records SET
            record_type = ?, current_state_id = ?, assignee = ?, fields = ?,
            sla_due_at = ?, sla_breached = ?, version = ?, updated_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(record.record_type.as_str())
    .bind(&record.current_state_id)
    .bind(&record.assignee)
    .bind(serde_json::to_string(&record.fields)?)
    .bind(record.sla_due_at.map(|t| t.to_rfc3339()))
    .bind(record.sla_breached as i64)
    .bind(record.version)
    .bind(record.updated_at.to_rfc3339())
    .bind(&record.id)
    .bind(expected_version)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish a stale version from a missing record.
        let found: Option<i64> = sqlx::query_scalar("SELECT version FROM records WHERE id = ?")
            .bind(&record.id)
            .fetch_optional(&mut **tx)
            .await?;

        return match found {
            Some(found) => Err(EngineError::StaleVersion {
                record_id: record.id.clone(),
                expected: expected_version,
                found,
            }),
            None => Err(EngineError::RecordNotFound(record.id.clone())),
        };
    }

    Ok(())
}

async fn insert_revision(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    revision: &Revision,
) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO revisions (id, record_id, action, performed_by, timestamp, payload)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&revision.id)
    .bind(&revision.record_id)
    .bind(revision.action.as_str())
    .bind(&revision.performed_by)
    .bind(revision.timestamp.to_rfc3339())
    .bind(serde_json::to_string(&revision.payload)?)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn parse_timestamp(raw: &str, column: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            EngineError::Storage(sqlx::Error::Decode(
                format!("bad timestamp in {column}: {e}").into(),
            ))
        })
}

fn row_to_record(row: &SqliteRow) -> EngineResult<Record> {
    let record_type: String = row.get("record_type");
    let fields_json: String = row.get("fields");
    let sla_due_at: Option<String> = row.get("sla_due_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Record {
        id: row.get("id"),
        record_type: RecordType::parse(&record_type).ok_or_else(|| {
            EngineError::Storage(sqlx::Error::Decode(
                format!("unknown record type '{record_type}'").into(),
            ))
        })?,
        workflow_id: row.get("workflow_id"),
        current_state_id: row.get("current_state_id"),
        classification_id: row.get("classification_id"),
        department_id: row.get("department_id"),
        location_id: row.get("location_id"),
        channel: row.get("channel"),
        assignee: row.get("assignee"),
        reporter: row.get("reporter"),
        fields: serde_json::from_str(&fields_json)?,
        sla_due_at: sla_due_at
            .map(|t| parse_timestamp(&t, "sla_due_at"))
            .transpose()?,
        sla_breached: row.get::<i64, _>("sla_breached") != 0,
        version: row.get("version"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

fn row_to_history(row: &SqliteRow) -> EngineResult<TransitionHistory> {
    let timestamp: String = row.get("timestamp");
    Ok(TransitionHistory {
        id: row.get("id"),
        record_id: row.get("record_id"),
        from_state: row.get("from_state"),
        to_state: row.get("to_state"),
        performed_by: row.get("performed_by"),
        timestamp: parse_timestamp(&timestamp, "timestamp")?,
        comment: row.get("comment"),
    })
}

fn row_to_revision(row: &SqliteRow) -> EngineResult<Revision> {
    let action: String = row.get("action");
    let timestamp: String = row.get("timestamp");
    let payload_json: String = row.get("payload");
    Ok(Revision {
        id: row.get("id"),
        record_id: row.get("record_id"),
        action: RevisionAction::parse(&action).ok_or_else(|| {
            EngineError::Storage(sqlx::Error::Decode(
                format!("unknown revision action '{action}'").into(),
            ))
        })?,
        performed_by: row.get("performed_by"),
        timestamp: parse_timestamp(&timestamp, "timestamp")?,
        payload: serde_json::from_str(&payload_json)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{memory_pool, test_record, test_revision};
    use chrono::Duration;

    async fn store() -> RecordStore {
        let store = RecordStore::new(memory_pool().await);
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let store = store().await;
        let record = test_record("rec-1");
        store
            .insert_record(&record, &test_revision("rev-1", "rec-1", RevisionAction::Created))
            .await
            .unwrap();

        let loaded = store.get_record("rec-1").await.unwrap().unwrap();
        assert_eq!(loaded.current_state_id, record.current_state_id);
        assert_eq!(loaded.version, 1);
        assert!(!loaded.sla_breached);
    }

    #[tokio::test]
    async fn cas_rejects_stale_writers() {
        let store = store().await;
        let record = test_record("rec-1");
        store
            .insert_record(&record, &test_revision("rev-1", "rec-1", RevisionAction::Created))
            .await
            .unwrap();

        // Writer A lands its update from version 1.
        let mut a = store.get_record("rec-1").await.unwrap().unwrap();
        a.version = 2;
        store.update_record(&a, 1).await.unwrap();

        // Writer B still believes version 1 and must lose.
        let mut b = record.clone();
        b.version = 2;
        let err = store.update_record(&b, 1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::StaleVersion { expected: 1, found: 2, .. }
        ));
    }

    #[tokio::test]
    async fn cas_on_missing_record_is_not_found() {
        let store = store().await;
        let record = test_record("rec-missing");
        let err = store.update_record(&record, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn revision_query_filters_and_paginates_descending() {
        let store = store().await;
        let record = test_record("rec-1");
        let base = record.created_at;
        store
            .insert_record(&record, &test_revision("rev-0", "rec-1", RevisionAction::Created))
            .await
            .unwrap();

        for i in 1..=4 {
            let mut rev = test_revision(&format!("rev-{i}"), "rec-1", RevisionAction::Commented);
            rev.timestamp = base + Duration::minutes(i);
            rev.performed_by = if i % 2 == 0 { "alice".into() } else { "bob".into() };
            store.append_revision(&rev).await.unwrap();
        }

        // Most recent first.
        let all = store
            .revisions("rec-1", &RevisionFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, "rev-4");

        // Action filter.
        let commented = store
            .revisions(
                "rec-1",
                &RevisionFilter {
                    action: Some(RevisionAction::Commented),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(commented.len(), 4);

        // Actor filter.
        let by_alice = store
            .revisions(
                "rec-1",
                &RevisionFilter {
                    performed_by: Some("alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_alice.len(), 2);

        // Date range keeps only the middle entries.
        let windowed = store
            .revisions(
                "rec-1",
                &RevisionFilter {
                    from: Some(base + Duration::minutes(2)),
                    to: Some(base + Duration::minutes(3)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(windowed.len(), 2);

        // Pagination.
        let page = store
            .revisions(
                "rec-1",
                &RevisionFilter {
                    limit: Some(2),
                    offset: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "rev-3");
    }

    #[tokio::test]
    async fn breach_flip_is_atomic_and_idempotent() {
        let store = store().await;
        let mut record = test_record("rec-1");
        record.sla_due_at = Some(record.created_at - Duration::hours(1));
        store
            .insert_record(&record, &test_revision("rev-1", "rec-1", RevisionAction::Created))
            .await
            .unwrap();

        let overdue = store.overdue_records(record.created_at).await.unwrap();
        assert_eq!(overdue.len(), 1);

        let breach = test_revision("rev-breach", "rec-1", RevisionAction::SlaBreached);
        assert!(store
            .mark_sla_breached("rec-1", record.created_at, &breach)
            .await
            .unwrap());
        // Second flip is a no-op and writes nothing.
        let again = test_revision("rev-again", "rec-1", RevisionAction::SlaBreached);
        assert!(!store
            .mark_sla_breached("rec-1", record.created_at, &again)
            .await
            .unwrap());

        let overdue = store.overdue_records(record.created_at).await.unwrap();
        assert!(overdue.is_empty());

        // The flip bumps the version like any other mutation.
        let loaded = store.get_record("rec-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert!(loaded.sla_breached);

        // Exactly one breach revision landed with the flip.
        let breaches = store
            .revisions(
                "rec-1",
                &RevisionFilter {
                    action: Some(RevisionAction::SlaBreached),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].id, "rev-breach");
    }

    #[tokio::test]
    async fn retention_cleanup_purges_only_older_revisions() {
        let store = store().await;
        let record = test_record("rec-1");
        let base = record.created_at;
        store
            .insert_record(&record, &test_revision("rev-0", "rec-1", RevisionAction::Created))
            .await
            .unwrap();

        let mut old = test_revision("rev-old", "rec-1", RevisionAction::Commented);
        old.timestamp = base - Duration::days(400);
        store.append_revision(&old).await.unwrap();

        let purged = store
            .purge_revisions_before(base - Duration::days(365))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        let left = store
            .revisions("rec-1", &RevisionFilter::default())
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "rev-0");
    }
}
