use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Priority assigned to lifecycle actions that are not part of the known table.
pub const UNKNOWN_PRIORITY: i32 = 999;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseValueError {
    kind: &'static str,
    value: String,
}

impl ParseValueError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The kind of entity an intake record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Job,
    Run,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Run => "run",
        }
    }

    /// Ordering key grouping every event of one entity, e.g. `job_42`.
    pub fn ordering_key(self, id: i64) -> String {
        format!("{}_{id}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" => Ok(Self::Job),
            "run" => Ok(Self::Run),
            other => Err(ParseValueError::new("event kind", other)),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a workflow job.
///
/// GitHub reports `pending` for jobs that are waiting on concurrency groups;
/// it is treated as queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Requested,
    Waiting,
    #[serde(alias = "pending")]
    Queued,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Waiting => "waiting",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Position of this status in the job lifecycle, used as a tie-break.
    pub fn priority(self) -> i32 {
        match self {
            Self::Waiting => 1,
            Self::Queued => 2,
            Self::Requested => 3,
            Self::InProgress => 4,
            Self::Completed | Self::Cancelled => 5,
        }
    }

    /// Priority of a `workflow_job` webhook action.
    pub fn action_priority(action: &str) -> i32 {
        action
            .parse::<Self>()
            .map_or(UNKNOWN_PRIORITY, Self::priority)
    }
}

impl FromStr for JobStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "waiting" => Ok(Self::Waiting),
            "queued" | "pending" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseValueError::new("job status", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a workflow run.
///
/// GitHub's intermediate `queued`, `pending` and `waiting` run states all
/// collapse into `requested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[serde(alias = "queued", alias = "pending", alias = "waiting")]
    Requested,
    InProgress,
    Completed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn priority(self) -> i32 {
        match self {
            Self::Requested => 1,
            Self::InProgress => 2,
            Self::Completed | Self::Cancelled => 3,
        }
    }

    /// Priority of a `workflow_run` webhook action. Only the three documented
    /// run actions are ranked.
    pub fn action_priority(action: &str) -> i32 {
        match action {
            "requested" => 1,
            "in_progress" => 2,
            "completed" | "cancelled" => 3,
            _ => UNKNOWN_PRIORITY,
        }
    }
}

impl FromStr for RunStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" | "queued" | "pending" | "waiting" => Ok(Self::Requested),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseValueError::new("run status", other)),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of CI work, as last reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub status: JobStatus,
    /// Runner labels, in the order the workflow declared them
    pub labels: Vec<String>,
    pub url: String,
    /// Outcome string, only populated once the job completed
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Parent workflow run
    pub run_id: i64,
}

impl Job {
    /// Seconds the job spent queued before a runner picked it up.
    pub fn queue_seconds(&self) -> Option<f64> {
        let started_at = self.started_at?;

        #[allow(clippy::cast_precision_loss)]
        let seconds = (started_at - self.created_at).num_milliseconds() as f64 / 1000.0;

        Some(seconds.max(0.0))
    }

    /// Label used for queue-duration observations.
    pub fn label_key(&self) -> String {
        self.labels.join(",")
    }
}

/// A workflow invocation owning zero or more jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub name: String,
    pub status: RunStatus,
    /// Repository full name (e.g., "owner/repo")
    pub repository: String,
    pub url: String,
    pub display_title: String,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Processing state of an intake record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeStatus {
    Pending,
    Processed,
    Failed,
}

impl IntakeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for IntakeStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseValueError::new("intake status", other)),
        }
    }
}

impl fmt::Display for IntakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering metadata derived from a webhook payload before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMetadata {
    /// Timestamp the payload claims for the event (job/run creation time)
    pub claimed_at: DateTime<Utc>,
    pub ordering_key: String,
    pub status_priority: i32,
}

/// A webhook delivery about to be written to the intake table.
///
/// The sequence number is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewIntakeRecord {
    pub delivery_id: String,
    pub event_kind: EventKind,
    pub metadata: EventMetadata,
    pub received_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

/// One durable webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeRecord {
    pub delivery_id: String,
    pub event_kind: EventKind,
    pub sequence_id: i64,
    pub claimed_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub payload: Vec<u8>,
    pub status: IntakeStatus,
    pub ordering_key: String,
    pub status_priority: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_job_action_priorities() {
        assert_eq!(JobStatus::action_priority("waiting"), 1);
        assert_eq!(JobStatus::action_priority("queued"), 2);
        assert_eq!(JobStatus::action_priority("requested"), 3);
        assert_eq!(JobStatus::action_priority("in_progress"), 4);
        assert_eq!(JobStatus::action_priority("completed"), 5);
        assert_eq!(JobStatus::action_priority("cancelled"), 5);
        assert_eq!(JobStatus::action_priority("rerequested"), UNKNOWN_PRIORITY);
    }

    #[test]
    fn test_run_action_priorities() {
        assert_eq!(RunStatus::action_priority("requested"), 1);
        assert_eq!(RunStatus::action_priority("in_progress"), 2);
        assert_eq!(RunStatus::action_priority("completed"), 3);
        assert_eq!(RunStatus::action_priority("queued"), UNKNOWN_PRIORITY);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Requested.is_terminal());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            JobStatus::Requested,
            JobStatus::Waiting,
            JobStatus::Queued,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert_eq!("pending".parse::<JobStatus>(), Ok(JobStatus::Queued));
        assert!("exploded".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_ordering_key() {
        assert_eq!(EventKind::Job.ordering_key(42), "job_42");
        assert_eq!(EventKind::Run.ordering_key(7), "run_7");
    }

    #[test]
    fn test_queue_seconds() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut job = Job {
            id: 1,
            name: "build".to_string(),
            status: JobStatus::InProgress,
            labels: vec!["ubuntu-latest".to_string(), "x64".to_string()],
            url: String::new(),
            conclusion: None,
            created_at,
            started_at: Some(created_at + Duration::seconds(90)),
            completed_at: None,
            run_id: 10,
        };

        assert_eq!(job.queue_seconds(), Some(90.0));
        assert_eq!(job.label_key(), "ubuntu-latest,x64");

        job.started_at = None;
        assert_eq!(job.queue_seconds(), None);
    }
}
