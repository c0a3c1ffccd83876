use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::error::Result;
use crate::model::{Job, JobStatus, Run, RunStatus};

use super::columns::{opt_millis, opt_time_at, time_at, to_millis};
use super::Store;

/// Which stored states an incoming event may not overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Only terminal states are protected.
    TerminalOnly,
    /// Terminal states are protected, and so is any state further along the
    /// lifecycle than the incoming one.
    TerminalAndRegression,
}

/// Result of a guarded upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome<S> {
    /// The record was written; `previous` is the status it replaced.
    Applied { previous: Option<S> },
    /// The stored record was left untouched.
    Rejected { current: S },
}

/// Decides whether an event with status `incoming` may replace `current`.
fn admits(guard: Guard, current: (bool, i32), incoming: i32) -> bool {
    let (terminal, current_priority) = current;
    if terminal {
        return false;
    }
    match guard {
        Guard::TerminalOnly => true,
        Guard::TerminalAndRegression => incoming >= current_priority,
    }
}

fn read_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let labels: String = row.get(3)?;
    let labels = serde_json::from_str(&labels).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        labels,
        url: row.get(4)?,
        conclusion: row.get(5)?,
        created_at: time_at(row, 6)?,
        started_at: opt_time_at(row, 7)?,
        completed_at: opt_time_at(row, 8)?,
        run_id: row.get(9)?,
    })
}

fn read_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        repository: row.get(3)?,
        url: row.get(4)?,
        display_title: row.get(5)?,
        conclusion: row.get(6)?,
        created_at: time_at(row, 7)?,
        started_at: opt_time_at(row, 8)?,
        updated_at: time_at(row, 9)?,
    })
}

const SELECT_JOB: &str = "SELECT id, name, status, labels, url, conclusion, created_at, \
     started_at, completed_at, run_id FROM jobs";

const SELECT_RUN: &str = "SELECT id, name, status, repository, url, display_title, conclusion, \
     created_at, started_at, updated_at FROM runs";

impl Store {
    /// Writes `job` unless the stored job is protected by `guard`.
    ///
    /// The status read and the write happen in one immediate transaction, so
    /// concurrent callers cannot interleave between the check and the upsert.
    /// Every column is overwritten from `job`; `updated_at` is set to now.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn upsert_job_if_not_terminal(
        &self,
        job: Job,
        guard: Guard,
    ) -> Result<UpsertOutcome<JobStatus>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current: Option<JobStatus> = tx
                .query_row(
                    "SELECT status FROM jobs WHERE id = ?1",
                    params![job.id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(current) = current {
                let stored = (current.is_terminal(), current.priority());
                if !admits(guard, stored, job.status.priority()) {
                    return Ok(UpsertOutcome::Rejected { current });
                }
            }

            tx.execute(
                "INSERT INTO jobs (id, name, status, labels, url, conclusion, created_at, \
                 started_at, completed_at, run_id, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, status = excluded.status, \
                 labels = excluded.labels, url = excluded.url, conclusion = excluded.conclusion, \
                 created_at = excluded.created_at, started_at = excluded.started_at, \
                 completed_at = excluded.completed_at, run_id = excluded.run_id, \
                 updated_at = excluded.updated_at",
                params![
                    job.id,
                    job.name,
                    job.status,
                    serde_json::to_string(&job.labels)?,
                    job.url,
                    job.conclusion,
                    to_millis(job.created_at),
                    opt_millis(job.started_at),
                    opt_millis(job.completed_at),
                    job.run_id,
                    to_millis(Utc::now()),
                ],
            )?;

            tx.commit()?;
            Ok(UpsertOutcome::Applied { previous: current })
        })
        .await
    }

    /// Writes `run` unless the stored run is protected by `guard`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn upsert_run_if_not_terminal(
        &self,
        run: Run,
        guard: Guard,
    ) -> Result<UpsertOutcome<RunStatus>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current: Option<RunStatus> = tx
                .query_row(
                    "SELECT status FROM runs WHERE id = ?1",
                    params![run.id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(current) = current {
                let stored = (current.is_terminal(), current.priority());
                if !admits(guard, stored, run.status.priority()) {
                    return Ok(UpsertOutcome::Rejected { current });
                }
            }

            tx.execute(
                "INSERT INTO runs (id, name, status, repository, url, display_title, \
                 conclusion, created_at, started_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, status = excluded.status, \
                 repository = excluded.repository, url = excluded.url, \
                 display_title = excluded.display_title, conclusion = excluded.conclusion, \
                 created_at = excluded.created_at, started_at = excluded.started_at, \
                 updated_at = excluded.updated_at",
                params![
                    run.id,
                    run.name,
                    run.status,
                    run.repository,
                    run.url,
                    run.display_title,
                    run.conclusion,
                    to_millis(run.created_at),
                    opt_millis(run.started_at),
                    to_millis(run.updated_at),
                ],
            )?;

            tx.commit()?;
            Ok(UpsertOutcome::Applied { previous: current })
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_job(&self, id: i64) -> Result<Option<Job>> {
        self.with_conn(move |conn| {
            let job = conn
                .query_row(
                    &format!("{SELECT_JOB} WHERE id = ?1"),
                    params![id],
                    read_job_row,
                )
                .optional()?;
            Ok(job)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_run(&self, id: i64) -> Result<Option<Run>> {
        self.with_conn(move |conn| {
            let run = conn
                .query_row(
                    &format!("{SELECT_RUN} WHERE id = ?1"),
                    params![id],
                    read_run_row,
                )
                .optional()?;
            Ok(run)
        })
        .await
    }

    /// Most recently reconciled jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_JOB} ORDER BY updated_at DESC, id DESC LIMIT ?1"))?;
            let jobs = stmt
                .query_map(params![limit], read_job_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(jobs)
        })
        .await
    }
}
