use crate::error::{CILensError, Result};
use crate::model::{EventKind, EventMetadata, JobStatus, RunStatus};

use super::types::{WorkflowJobEvent, WorkflowRunEvent};

/// Value of the `X-GitHub-Event` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHeader {
    /// Sent once when the webhook is created
    Ping,
    WorkflowJob,
    WorkflowRun,
}

impl EventHeader {
    /// Parses the event type header.
    ///
    /// # Errors
    ///
    /// Returns a validation error for event types this receiver does not handle.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "ping" => Ok(Self::Ping),
            "workflow_job" => Ok(Self::WorkflowJob),
            "workflow_run" => Ok(Self::WorkflowRun),
            other => Err(CILensError::Validation(format!(
                "unsupported event type: {other}"
            ))),
        }
    }

    /// Entity kind carried by this event type, if any.
    pub fn kind(self) -> Option<EventKind> {
        match self {
            Self::Ping => None,
            Self::WorkflowJob => Some(EventKind::Job),
            Self::WorkflowRun => Some(EventKind::Run),
        }
    }
}

/// A decoded job or run lifecycle delivery.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Job(WorkflowJobEvent),
    Run(WorkflowRunEvent),
}

impl WebhookEvent {
    /// Decodes a JSON payload for the given entity kind.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the payload is not valid JSON or lacks
    /// a required field.
    pub fn decode(kind: EventKind, payload: &[u8]) -> Result<Self> {
        let event = match kind {
            EventKind::Job => serde_json::from_slice(payload).map(Self::Job),
            EventKind::Run => serde_json::from_slice(payload).map(Self::Run),
        };

        event.map_err(|e| CILensError::Validation(format!("malformed {kind} payload: {e}")))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Job(_) => EventKind::Job,
            Self::Run(_) => EventKind::Run,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Self::Job(event) => &event.action,
            Self::Run(event) => &event.action,
        }
    }

    /// Identifier of the job or run this event describes.
    pub fn entity_id(&self) -> i64 {
        match self {
            Self::Job(event) => event.workflow_job.id,
            Self::Run(event) => event.workflow_run.id,
        }
    }

    /// Derives the fields the scheduler sorts on.
    ///
    /// The claimed timestamp is the entity's creation time; the status
    /// priority ranks the delivery's action within the entity lifecycle.
    pub fn metadata(&self) -> EventMetadata {
        let (claimed_at, status_priority) = match self {
            Self::Job(event) => (
                event.workflow_job.created_at,
                JobStatus::action_priority(&event.action),
            ),
            Self::Run(event) => (
                event.workflow_run.created_at,
                RunStatus::action_priority(&event.action),
            ),
        };

        EventMetadata {
            claimed_at,
            ordering_key: self.kind().ordering_key(self.entity_id()),
            status_priority,
        }
    }
}
