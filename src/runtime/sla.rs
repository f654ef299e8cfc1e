/// Background SLA monitor
///
/// A recurring job scans open records whose deadline has passed and flags
/// them. The flip is a single atomic compare on the breach flag, so
/// overlapping runs (or multiple processes on simple per-process schedules)
/// re-flag nothing and need no distributed lock. One bad record never aborts
/// the rest of a scan; it is retried on the next tick.

use crate::clock::Clock;
use crate::error::EngineResult;
use crate::notify::Notifier;
use crate::record::store::RecordStore;
use crate::record::types::{Revision, RevisionAction};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Periodic SLA breach scanner
#[derive(Clone)]
pub struct SlaMonitor {
    store: RecordStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl SlaMonitor {
    pub fn new(store: RecordStore, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Start the recurring scan on the given cron schedule.
    ///
    /// The scheduler owns the job; dropping the returned handle stops it.
    pub async fn start(&self, schedule: &str) -> Result<JobScheduler> {
        tracing::info!("⏰ Starting SLA monitor on schedule: {}", schedule);

        let scheduler = JobScheduler::new().await?;
        let monitor = self.clone();

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let monitor = monitor.clone();
            Box::pin(async move {
                match monitor.scan_once().await {
                    Ok(flagged) if flagged > 0 => {
                        tracing::info!("SLA scan flagged {} breached record(s)", flagged);
                    }
                    Ok(_) => {
                        tracing::debug!("SLA scan found no new breaches");
                    }
                    Err(e) => {
                        tracing::error!("SLA scan failed: {}", e);
                    }
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        tracing::info!("✅ SLA monitor started");
        Ok(scheduler)
    }

    /// One scan pass: flag every overdue record exactly once.
    ///
    /// Returns how many records were newly flagged. Per-record failures are
    /// logged and skipped; the next tick picks them up again.
    pub async fn scan_once(&self) -> EngineResult<usize> {
        let now = self.clock.now();
        let overdue = self.store.overdue_records(now).await?;

        let mut flagged = 0;
        for record in overdue {
            match self.flag_record(&record.id, record.assignee.as_ref()).await {
                Ok(true) => flagged += 1,
                Ok(false) => {
                    // Another run flagged it between the scan and the flip.
                }
                Err(e) => {
                    tracing::warn!("SLA flagging failed for record {}: {}", record.id, e);
                }
            }
        }

        Ok(flagged)
    }

    async fn flag_record(
        &self,
        record_id: &str,
        assignee: Option<&String>,
    ) -> EngineResult<bool> {
        let now = self.clock.now();
        let revision = Revision {
            id: format!("rev-{}", Uuid::new_v4()),
            record_id: record_id.to_string(),
            action: RevisionAction::SlaBreached,
            performed_by: "sla-monitor".to_string(),
            timestamp: now,
            payload: json!({ "breached_at": now }),
        };

        // Flip and revision commit together; a failed insert rolls the flip
        // back so the next tick retries the record.
        if !self.store.mark_sla_breached(record_id, now, &revision).await? {
            return Ok(false);
        }

        // Fire-and-forget: the monitor never blocks on delivery.
        let notifier = Arc::clone(&self.notifier);
        let record_id = record_id.to_string();
        let recipients: Vec<String> = assignee.into_iter().cloned().collect();
        tokio::spawn(async move {
            notifier.notify("sla_breached", &record_id, &recipients).await;
        });

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::notify::NoopNotifier;
    use crate::record::types::RevisionFilter;
    use crate::test_util::{memory_pool, test_record, test_revision};
    use chrono::{Duration, TimeZone, Utc};

    async fn setup() -> (SlaMonitor, RecordStore, Arc<FixedClock>) {
        let store = RecordStore::new(memory_pool().await);
        store.init_schema().await.unwrap();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));
        let monitor = SlaMonitor::new(
            store.clone(),
            Arc::new(NoopNotifier),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (monitor, store, clock)
    }

    async fn insert_with_due(
        store: &RecordStore,
        id: &str,
        due: chrono::DateTime<Utc>,
    ) {
        let mut record = test_record(id);
        record.sla_due_at = Some(due);
        store
            .insert_record(
                &record,
                &test_revision(&format!("rev-{id}"), id, RevisionAction::Created),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scan_flags_overdue_records_once() {
        let (monitor, store, clock) = setup().await;
        insert_with_due(&store, "rec-due", clock.now() - Duration::hours(1)).await;
        insert_with_due(&store, "rec-later", clock.now() + Duration::hours(1)).await;

        assert_eq!(monitor.scan_once().await.unwrap(), 1);
        // Immediate re-run with no time advance is a no-op.
        assert_eq!(monitor.scan_once().await.unwrap(), 0);

        let due = store.get_record("rec-due").await.unwrap().unwrap();
        assert!(due.sla_breached);
        let later = store.get_record("rec-later").await.unwrap().unwrap();
        assert!(!later.sla_breached);

        // Exactly one breach revision exists.
        let revisions = store
            .revisions(
                "rec-due",
                &RevisionFilter {
                    action: Some(RevisionAction::SlaBreached),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(revisions.len(), 1);
    }

    #[tokio::test]
    async fn advancing_the_clock_picks_up_new_breaches() {
        let (monitor, store, clock) = setup().await;
        insert_with_due(&store, "rec-later", clock.now() + Duration::hours(1)).await;

        assert_eq!(monitor.scan_once().await.unwrap(), 0);

        clock.advance(Duration::hours(2));
        assert_eq!(monitor.scan_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_revision_insert_leaves_the_record_for_the_next_tick() {
        let pool = memory_pool().await;
        let store = RecordStore::new(pool.clone());
        store.init_schema().await.unwrap();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));
        let monitor = SlaMonitor::new(
            store.clone(),
            Arc::new(NoopNotifier),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        insert_with_due(&store, "rec-due", clock.now() - Duration::hours(1)).await;

        // Simulate a transient storage fault on the revision insert.
        sqlx::query("ALTER TABLE revisions RENAME TO revisions_hidden")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(monitor.scan_once().await.unwrap(), 0);

        // The flip rolled back with the failed insert, so the record is
        // still eligible for the next scan.
        let record = store.get_record("rec-due").await.unwrap().unwrap();
        assert!(!record.sla_breached);

        sqlx::query("ALTER TABLE revisions_hidden RENAME TO revisions")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(monitor.scan_once().await.unwrap(), 1);

        let revisions = store
            .revisions(
                "rec-due",
                &RevisionFilter {
                    action: Some(RevisionAction::SlaBreached),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(revisions.len(), 1);
    }

    #[tokio::test]
    async fn records_without_sla_are_never_flagged() {
        let (monitor, store, _clock) = setup().await;
        let record = test_record("rec-nosla");
        store
            .insert_record(
                &record,
                &test_revision("rev-n", "rec-nosla", RevisionAction::Created),
            )
            .await
            .unwrap();

        assert_eq!(monitor.scan_once().await.unwrap(), 0);
        let loaded = store.get_record("rec-nosla").await.unwrap().unwrap();
        assert!(!loaded.sla_breached);
    }
}
