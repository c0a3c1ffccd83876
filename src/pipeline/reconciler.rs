use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;

use crate::error::Result;
use crate::fanout::{Broadcaster, WORKFLOW_UPDATE};
use crate::metrics::MetricsSink;
use crate::model::{IntakeRecord, Job, JobStatus, Run};
use crate::providers::github::WebhookEvent;
use crate::store::{Guard, Store, UpsertOutcome};

/// What happened to one intake record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOutcome {
    /// The entity record was written.
    Applied,
    /// The stored entity was protected; the event was discarded.
    Stale,
    /// Decoding or persistence failed; the row is marked failed.
    Failed,
}

/// Applies intake records to the job and run tables.
///
/// The reconciler is the only writer of entity status. It is driven
/// sequentially by the scheduler.
pub struct Reconciler {
    store: Store,
    metrics: Arc<dyn MetricsSink>,
    fanout: Broadcaster,
    guard: Guard,
}

impl Reconciler {
    pub fn new(
        store: Store,
        metrics: Arc<dyn MetricsSink>,
        fanout: Broadcaster,
        guard: Guard,
    ) -> Self {
        Self {
            store,
            metrics,
            fanout,
            guard,
        }
    }

    /// Reconciles one intake record and moves it out of `pending`.
    ///
    /// Stale events count as processed. Failures are logged and the row is
    /// marked failed; they are not retried.
    pub async fn apply(&self, record: &IntakeRecord) -> ApplyOutcome {
        let outcome = match self.reconcile(record).await {
            Ok(true) => ApplyOutcome::Applied,
            Ok(false) => ApplyOutcome::Stale,
            Err(e) => {
                error!(
                    "Failed to reconcile delivery {} ({}): {e}",
                    record.delivery_id, record.ordering_key
                );
                ApplyOutcome::Failed
            }
        };

        let marked = match outcome {
            ApplyOutcome::Failed => self.store.mark_failed(&record.delivery_id).await,
            ApplyOutcome::Applied | ApplyOutcome::Stale => {
                self.store.mark_processed(&record.delivery_id).await
            }
        };

        match marked {
            Ok(true) => {}
            Ok(false) => warn!(
                "Delivery {} was no longer pending when marking it {outcome:?}",
                record.delivery_id
            ),
            Err(e) => error!(
                "Failed to mark delivery {} as {outcome:?}: {e}",
                record.delivery_id
            ),
        }

        outcome
    }

    /// Returns whether the event was applied.
    async fn reconcile(&self, record: &IntakeRecord) -> Result<bool> {
        let delivery_id = &record.delivery_id;

        match WebhookEvent::decode(record.event_kind, &record.payload)? {
            WebhookEvent::Job(event) => {
                self.reconcile_job(delivery_id, &event.action, event.workflow_job.into())
                    .await
            }
            WebhookEvent::Run(event) => {
                let action = event.action.clone();
                self.reconcile_run(delivery_id, &action, event.into_run())
                    .await
            }
        }
    }

    async fn reconcile_run(&self, delivery_id: &str, action: &str, run: Run) -> Result<bool> {
        match self
            .store
            .upsert_run_if_not_terminal(run.clone(), self.guard)
            .await?
        {
            UpsertOutcome::Applied { .. } => {
                self.fanout
                    .broadcast(WORKFLOW_UPDATE, json!({ "type": "run", "run": run }));
                Ok(true)
            }
            UpsertOutcome::Rejected { current } => {
                info!(
                    "Ignoring stale {action} event {delivery_id} for run {}: already {current}",
                    run.id
                );
                Ok(false)
            }
        }
    }

    async fn reconcile_job(&self, delivery_id: &str, action: &str, job: Job) -> Result<bool> {
        match self
            .store
            .upsert_job_if_not_terminal(job.clone(), self.guard)
            .await?
        {
            UpsertOutcome::Applied { previous } => {
                self.observe_job(previous, &job);
                self.fanout
                    .broadcast(WORKFLOW_UPDATE, json!({ "type": "job", "job": job }));
                Ok(true)
            }
            UpsertOutcome::Rejected { current } => {
                info!(
                    "Ignoring stale {action} event {delivery_id} for job {}: already {current}",
                    job.id
                );
                Ok(false)
            }
        }
    }

    fn observe_job(&self, previous: Option<JobStatus>, job: &Job) {
        if previous == Some(JobStatus::Queued) {
            if let Some(seconds) = job.queue_seconds() {
                self.metrics
                    .observe_queue_duration(&job.label_key(), seconds);
            }
        }

        if job.status.is_terminal() {
            self.metrics
                .observe_conclusion(job.conclusion.as_deref().unwrap_or("unknown"));
        }
    }
}
