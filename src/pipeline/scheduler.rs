use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::fanout::{Broadcaster, METRICS_UPDATE};
use crate::model::{IntakeRecord, IntakeStatus};
use crate::store::Store;

use super::reconciler::{ApplyOutcome, Reconciler};

/// Timing and batch parameters for the reordering buffer.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Time between ticks
    pub interval: Duration,
    /// Minimum time a row must sit in the intake table before it is applied
    pub max_age: Duration,
    /// Maximum rows applied per tick
    pub batch_size: usize,
}

/// Outcome counts for one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub applied: usize,
    pub stale: usize,
    pub failed: usize,
}

impl FlushReport {
    pub fn total(&self) -> usize {
        self.applied + self.stale + self.failed
    }

    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Stale => self.stale += 1,
            ApplyOutcome::Failed => self.failed += 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.applied += other.applied;
        self.stale += other.stale;
        self.failed += other.failed;
    }
}

/// Promotes aged intake rows to the reconciler in a deterministic order.
///
/// Rows younger than `max_age` are left alone so that logically earlier
/// deliveries that arrive late can still be sorted ahead of them. Ticks and
/// the shutdown drain are serialized by one lock; rows within a batch are
/// applied one after another.
pub struct Scheduler {
    store: Store,
    reconciler: Reconciler,
    fanout: Broadcaster,
    settings: SchedulerSettings,
    flush_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        store: Store,
        reconciler: Reconciler,
        fanout: Broadcaster,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            reconciler,
            fanout,
            settings,
            flush_lock: Mutex::new(()),
        }
    }

    /// Runs ticks until `shutdown` fires, then drains every pending row.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Scheduler started (interval {:?}, delay window {:?}, batch {})",
            self.settings.interval, self.settings.max_age, self.settings.batch_size
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Scheduler tick failed: {e}");
                    }
                }
            }
        }

        match self.drain().await {
            Ok(report) => info!(
                "Scheduler stopped after draining {} pending events",
                report.total()
            ),
            Err(e) => error!("Final drain failed: {e}"),
        }
    }

    /// Applies up to one batch of rows that have aged past the delay window.
    ///
    /// # Errors
    ///
    /// Returns an error if pending rows cannot be fetched. Failures of
    /// individual rows are counted in the report instead.
    pub async fn tick(&self) -> Result<FlushReport> {
        let _flush = self.flush_lock.lock().await;

        let rows = self
            .store
            .fetch_pending_older_than(self.settings.max_age, self.settings.batch_size)
            .await?;

        if rows.is_empty() {
            debug!("No pending events past the delay window");
            return Ok(FlushReport::default());
        }

        let report = self.flush(&rows).await;
        self.publish(report);
        Ok(report)
    }

    /// Applies every pending row regardless of age, batch by batch.
    ///
    /// # Errors
    ///
    /// Returns an error if pending rows cannot be fetched.
    pub async fn drain(&self) -> Result<FlushReport> {
        let _flush = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        loop {
            let rows = self
                .store
                .fetch_all_pending(self.settings.batch_size)
                .await?;
            if rows.is_empty() {
                break;
            }

            report.merge(self.flush(&rows).await);

            // Rows that could not even be marked stay pending; stop rather
            // than fetch them again forever.
            if !self.made_progress(&rows).await? {
                error!("{} pending events could not be drained", rows.len());
                break;
            }
        }

        if report.total() > 0 {
            self.publish(report);
        }
        Ok(report)
    }

    /// Whether any row of `rows` left the pending state.
    async fn made_progress(&self, rows: &[IntakeRecord]) -> Result<bool> {
        for row in rows {
            let still_pending = self
                .store
                .get_intake(&row.delivery_id)
                .await?
                .is_some_and(|r| {
                    r.sequence_id == row.sequence_id && r.status == IntakeStatus::Pending
                });
            if !still_pending {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn flush(&self, rows: &[IntakeRecord]) -> FlushReport {
        let mut report = FlushReport::default();

        for row in rows {
            report.record(self.reconciler.apply(row).await);
        }

        info!(
            "Flushed {} events ({} applied, {} stale, {} failed)",
            report.total(),
            report.applied,
            report.stale,
            report.failed
        );
        report
    }

    fn publish(&self, report: FlushReport) {
        self.fanout.broadcast(METRICS_UPDATE, report);
    }
}
