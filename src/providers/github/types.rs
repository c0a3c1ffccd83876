use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Job, JobStatus, Run, RunStatus};

/// Body of a `workflow_job` webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJobEvent {
    /// Lifecycle action that triggered the delivery (e.g., "queued")
    pub action: String,
    pub workflow_job: GitHubJob,
    pub repository: Option<Repository>,
}

/// Body of a `workflow_run` webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunEvent {
    pub action: String,
    pub workflow_run: GitHubWorkflowRun,
    pub repository: Option<Repository>,
}

/// Job within a GitHub Actions workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubJob {
    /// Unique identifier for the job
    pub id: i64,
    /// Workflow run this job belongs to
    pub run_id: i64,
    /// Name of the job
    pub name: String,
    /// Status of the job
    pub status: JobStatus,
    /// Conclusion of the job
    pub conclusion: Option<String>,
    /// Labels for the runner
    #[serde(default)]
    pub labels: Vec<String>,
    /// Link to the job in the GitHub UI
    #[serde(default)]
    pub html_url: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job started
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed
    pub completed_at: Option<DateTime<Utc>>,
}

/// GitHub Actions workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubWorkflowRun {
    /// Unique identifier for the workflow run
    pub id: i64,
    /// Name of the workflow
    pub name: Option<String>,
    /// Display title for the run
    #[serde(default)]
    pub display_title: Option<String>,
    /// Status of the run
    pub status: RunStatus,
    /// Conclusion of the run (success, failure, etc.)
    pub conclusion: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    /// When the run was created
    pub created_at: DateTime<Utc>,
    /// When the current attempt started
    #[serde(default)]
    pub run_started_at: Option<DateTime<Utc>>,
    /// When the run was updated
    pub updated_at: DateTime<Utc>,
}

/// Repository the delivery originated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Repository path (e.g., "owner/repo")
    pub full_name: String,
}

/// GitHub reports cancellation as a completed status with a `cancelled`
/// conclusion.
fn is_cancellation(completed: bool, conclusion: Option<&str>) -> bool {
    completed && conclusion == Some("cancelled")
}

impl From<GitHubJob> for Job {
    fn from(job: GitHubJob) -> Self {
        let status = if is_cancellation(
            job.status == JobStatus::Completed,
            job.conclusion.as_deref(),
        ) {
            JobStatus::Cancelled
        } else {
            job.status
        };

        Self {
            id: job.id,
            name: job.name,
            status,
            labels: job.labels,
            url: job.html_url.unwrap_or_default(),
            conclusion: job.conclusion,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            run_id: job.run_id,
        }
    }
}

impl WorkflowRunEvent {
    /// Converts the delivery into the stored run representation.
    pub fn into_run(self) -> Run {
        let run = self.workflow_run;
        let status = if is_cancellation(
            run.status == RunStatus::Completed,
            run.conclusion.as_deref(),
        ) {
            RunStatus::Cancelled
        } else {
            run.status
        };

        Run {
            id: run.id,
            name: run.name.unwrap_or_default(),
            status,
            repository: self
                .repository
                .map(|repository| repository.full_name)
                .unwrap_or_default(),
            url: run.html_url.unwrap_or_default(),
            display_title: run.display_title.unwrap_or_default(),
            conclusion: run.conclusion,
            created_at: run.created_at,
            started_at: run.run_started_at,
            updated_at: run.updated_at,
        }
    }
}
