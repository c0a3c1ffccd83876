//! Payload builders shared by unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use crate::model::{EventKind, Job, JobStatus, NewIntakeRecord};
use crate::providers::github::WebhookEvent;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// A `workflow_job` delivery body.
pub fn job_payload(
    id: i64,
    action: &str,
    status: &str,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    conclusion: Option<&str>,
) -> Value {
    json!({
        "action": action,
        "workflow_job": {
            "id": id,
            "run_id": 5000,
            "name": "build",
            "status": status,
            "conclusion": conclusion,
            "labels": ["ubuntu-latest"],
            "html_url": format!("https://github.com/octo/repo/actions/runs/5000/job/{id}"),
            "created_at": created_at,
            "started_at": started_at,
            "completed_at": conclusion.map(|_| created_at + Duration::seconds(300)),
        },
        "repository": { "full_name": "octo/repo" }
    })
}

/// A `workflow_run` delivery body.
pub fn run_payload(id: i64, action: &str, status: &str, conclusion: Option<&str>) -> Value {
    json!({
        "action": action,
        "workflow_run": {
            "id": id,
            "name": "CI",
            "display_title": "Fix flaky test",
            "status": status,
            "conclusion": conclusion,
            "html_url": format!("https://github.com/octo/repo/actions/runs/{id}"),
            "created_at": base_time(),
            "run_started_at": base_time(),
            "updated_at": base_time() + Duration::seconds(60),
        },
        "repository": { "full_name": "octo/repo" }
    })
}

pub fn job(id: i64, status: JobStatus) -> Job {
    Job {
        id,
        name: "build".to_string(),
        status,
        labels: vec!["ubuntu-latest".to_string()],
        url: String::new(),
        conclusion: None,
        created_at: base_time(),
        started_at: None,
        completed_at: None,
        run_id: 5000,
    }
}

/// An intake record for `payload`, received at `received_at`.
pub fn intake(
    delivery_id: &str,
    kind: EventKind,
    payload: &Value,
    received_at: DateTime<Utc>,
) -> NewIntakeRecord {
    let payload = serde_json::to_vec(payload).unwrap();
    let metadata = WebhookEvent::decode(kind, &payload).unwrap().metadata();

    NewIntakeRecord {
        delivery_id: delivery_id.to_string(),
        event_kind: kind,
        metadata,
        received_at,
        payload,
    }
}
