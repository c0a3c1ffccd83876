use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use crate::error::{CILensError, Result};
use crate::model::{IntakeRecord, IntakeStatus, NewIntakeRecord};

use super::columns::{opt_time_at, time_at, to_millis};
use super::Store;

const SELECT_INTAKE: &str = "SELECT delivery_id, event_type, sequence_id, claimed_at, received_at, \
     processed_at, payload, status, ordering_key, status_priority FROM intake_events";

/// Scheduler sort order. The sequence number only separates rows that agree
/// on every other key.
const PENDING_ORDER: &str =
    "ORDER BY claimed_at ASC, ordering_key ASC, status_priority ASC, sequence_id ASC";

/// Number of intake rows in each processing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeCounts {
    pub pending: u64,
    pub processed: u64,
    pub failed: u64,
}

impl IntakeCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.processed + self.failed
    }
}

fn read_intake_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IntakeRecord> {
    Ok(IntakeRecord {
        delivery_id: row.get(0)?,
        event_kind: row.get(1)?,
        sequence_id: row.get(2)?,
        claimed_at: time_at(row, 3)?,
        received_at: time_at(row, 4)?,
        processed_at: opt_time_at(row, 5)?,
        payload: row.get(6)?,
        status: row.get(7)?,
        ordering_key: row.get(8)?,
        status_priority: row.get(9)?,
    })
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl Store {
    /// Writes a delivery to the intake table, replacing any earlier row with
    /// the same delivery identifier.
    ///
    /// A replaced row returns to `pending` with a fresh sequence number.
    ///
    /// # Returns
    ///
    /// The sequence number assigned to the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub async fn store_or_replace_intake_record(&self, record: NewIntakeRecord) -> Result<i64> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let sequence_id: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM intake_events",
                [],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT OR REPLACE INTO intake_events (delivery_id, event_type, sequence_id, \
                 claimed_at, received_at, processed_at, payload, status, ordering_key, \
                 status_priority) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9)",
                params![
                    record.delivery_id,
                    record.event_kind,
                    sequence_id,
                    to_millis(record.metadata.claimed_at),
                    to_millis(record.received_at),
                    record.payload,
                    IntakeStatus::Pending,
                    record.metadata.ordering_key,
                    record.metadata.status_priority,
                ],
            )?;

            tx.commit()?;
            Ok(sequence_id)
        })
        .await
    }

    /// Pending rows received at least `max_age` ago, in scheduler order.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_age` is out of range or the query fails.
    pub async fn fetch_pending_older_than(
        &self,
        max_age: Duration,
        limit: usize,
    ) -> Result<Vec<IntakeRecord>> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| CILensError::Config(format!("delay window out of range: {e}")))?;

        self.fetch_pending_received_before(Some(Utc::now() - max_age), limit)
            .await
    }

    /// Every pending row regardless of age, in scheduler order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn fetch_all_pending(&self, limit: usize) -> Result<Vec<IntakeRecord>> {
        self.fetch_pending_received_before(None, limit).await
    }

    async fn fetch_pending_received_before(
        &self,
        cutoff: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<IntakeRecord>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "{SELECT_INTAKE} WHERE status = ?1 AND (?2 IS NULL OR received_at <= ?2) \
                 {PENDING_ORDER} LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![
                        IntakeStatus::Pending,
                        cutoff.map(to_millis),
                        sql_limit(limit)
                    ],
                    read_intake_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Marks a pending row as processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_processed(&self, delivery_id: &str) -> Result<bool> {
        self.finish_intake(delivery_id, IntakeStatus::Processed)
            .await
    }

    /// Marks a pending row as failed. Failed rows are never retried
    /// automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_failed(&self, delivery_id: &str) -> Result<bool> {
        self.finish_intake(delivery_id, IntakeStatus::Failed).await
    }

    /// Moves a row out of `pending`. Returns whether a pending row existed.
    async fn finish_intake(&self, delivery_id: &str, status: IntakeStatus) -> Result<bool> {
        let delivery_id = delivery_id.to_string();

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE intake_events SET status = ?1, processed_at = ?2 \
                 WHERE delivery_id = ?3 AND status = ?4",
                params![
                    status,
                    to_millis(Utc::now()),
                    delivery_id,
                    IntakeStatus::Pending
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Looks up one intake row by delivery identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_intake(&self, delivery_id: &str) -> Result<Option<IntakeRecord>> {
        let delivery_id = delivery_id.to_string();

        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    &format!("{SELECT_INTAKE} WHERE delivery_id = ?1"),
                    params![delivery_id],
                    read_intake_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    /// Row counts per processing state.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn intake_counts(&self) -> Result<IntakeCounts> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM intake_events GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, IntakeStatus>(0)?, row.get::<_, i64>(1)?))
            })?;

            let mut counts = IntakeCounts::default();
            for row in rows {
                let (status, count) = row?;
                let count = u64::try_from(count).unwrap_or_default();
                match status {
                    IntakeStatus::Pending => counts.pending = count,
                    IntakeStatus::Processed => counts.processed = count,
                    IntakeStatus::Failed => counts.failed = count,
                }
            }
            Ok(counts)
        })
        .await
    }
}
