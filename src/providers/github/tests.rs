use chrono::Duration;

use super::signature::SIGNATURE_PREFIX;
use super::*;
use crate::error::CILensError;
use crate::model::{EventKind, Job, JobStatus, RunStatus, UNKNOWN_PRIORITY};
use crate::testing::{base_time, job_payload, run_payload};

#[test]
fn test_signature_accepts_matching_secret() {
    let body = br#"{"action":"queued"}"#;
    let header = sign(b"S1", body).unwrap();

    assert!(header.starts_with(SIGNATURE_PREFIX));
    assert!(verify_signature(b"S1", Some(&header), body).is_ok());
}

#[test]
fn test_signature_rejects_other_secret() {
    let body = br#"{"action":"queued"}"#;
    let header = sign(b"S1", body).unwrap();

    let result = verify_signature(b"S2", Some(&header), body);
    assert!(matches!(result, Err(CILensError::Authentication(_))));
}

#[test]
fn test_signature_rejects_missing_and_malformed_headers() {
    let body = b"{}";

    assert!(matches!(
        verify_signature(b"S1", None, body),
        Err(CILensError::Authentication(_))
    ));
    assert!(matches!(
        verify_signature(b"S1", Some("sha1=abcdef"), body),
        Err(CILensError::Authentication(_))
    ));
    assert!(matches!(
        verify_signature(b"S1", Some("sha256=not-hex"), body),
        Err(CILensError::Authentication(_))
    ));
    assert!(matches!(
        verify_signature(b"S1", Some("sha256=abcd"), body),
        Err(CILensError::Authentication(_))
    ));
}

#[test]
fn test_signature_covers_every_byte() {
    let header = sign(b"S1", br#"{"id":1}"#).unwrap();
    assert!(verify_signature(b"S1", Some(&header), br#"{"id":2}"#).is_err());
}

#[test]
fn test_decode_body_passes_json_through() {
    let body = br#"{"action":"queued"}"#;
    let decoded = decode_body(Some("application/json"), body).unwrap();
    assert_eq!(decoded, body.to_vec());
}

#[test]
fn test_decode_body_unwraps_form_payload() {
    let body = b"payload=%7B%22action%22%3A%22queued%22%7D";
    let decoded = decode_body(Some("application/x-www-form-urlencoded"), body).unwrap();
    assert_eq!(decoded, br#"{"action":"queued"}"#.to_vec());

    // Detected from the body even without a content type
    let decoded = decode_body(None, body).unwrap();
    assert_eq!(decoded, br#"{"action":"queued"}"#.to_vec());
}

#[test]
fn test_decode_body_rejects_form_without_payload() {
    let result = decode_body(Some("application/x-www-form-urlencoded"), b"other=1");
    assert!(matches!(result, Err(CILensError::Validation(_))));
}

#[test]
fn test_decode_body_rejects_empty_body() {
    assert!(decode_body(Some("application/json"), b"  ").is_err());
}

#[test]
fn test_event_header_parsing() {
    assert_eq!(EventHeader::parse("ping").unwrap(), EventHeader::Ping);
    assert_eq!(
        EventHeader::parse("workflow_job").unwrap().kind(),
        Some(EventKind::Job)
    );
    assert_eq!(
        EventHeader::parse("workflow_run").unwrap().kind(),
        Some(EventKind::Run)
    );
    assert!(EventHeader::parse("push").is_err());
}

#[test]
fn test_job_metadata() {
    let payload = job_payload(42, "in_progress", "in_progress", base_time(), None, None);
    let body = serde_json::to_vec(&payload).unwrap();

    let event = WebhookEvent::decode(EventKind::Job, &body).unwrap();
    let metadata = event.metadata();

    assert_eq!(event.kind(), EventKind::Job);
    assert_eq!(event.action(), "in_progress");
    assert_eq!(metadata.claimed_at, base_time());
    assert_eq!(metadata.ordering_key, "job_42");
    assert_eq!(metadata.status_priority, 4);
}

#[test]
fn test_run_metadata() {
    let payload = run_payload(7, "requested", "queued", None);
    let body = serde_json::to_vec(&payload).unwrap();

    let event = WebhookEvent::decode(EventKind::Run, &body).unwrap();
    let metadata = event.metadata();

    assert_eq!(metadata.ordering_key, "run_7");
    assert_eq!(metadata.status_priority, 1);
}

#[test]
fn test_unknown_action_gets_lowest_priority() {
    let payload = job_payload(1, "rerequested", "queued", base_time(), None, None);
    let body = serde_json::to_vec(&payload).unwrap();

    let event = WebhookEvent::decode(EventKind::Job, &body).unwrap();
    assert_eq!(event.metadata().status_priority, UNKNOWN_PRIORITY);
}

#[test]
fn test_decode_rejects_missing_fields() {
    let body = br#"{"action":"queued","workflow_job":{"id":1}}"#;
    let result = WebhookEvent::decode(EventKind::Job, body);
    assert!(matches!(result, Err(CILensError::Validation(_))));
}

#[test]
fn test_decode_rejects_payload_for_other_kind() {
    let payload = job_payload(1, "queued", "queued", base_time(), None, None);
    let body = serde_json::to_vec(&payload).unwrap();
    assert!(WebhookEvent::decode(EventKind::Run, &body).is_err());
}

#[test]
fn test_cancelled_job_conversion() {
    let payload = job_payload(
        3,
        "completed",
        "completed",
        base_time(),
        Some(base_time() + Duration::seconds(5)),
        Some("cancelled"),
    );
    let body = serde_json::to_vec(&payload).unwrap();

    let WebhookEvent::Job(event) = WebhookEvent::decode(EventKind::Job, &body).unwrap() else {
        panic!("expected a job event");
    };
    let job = Job::from(event.workflow_job);

    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.conclusion.as_deref(), Some("cancelled"));
    assert_eq!(job.labels, vec!["ubuntu-latest".to_string()]);
}

#[test]
fn test_run_conversion_collapses_queued() {
    let payload = run_payload(9, "requested", "queued", None);
    let body = serde_json::to_vec(&payload).unwrap();

    let WebhookEvent::Run(event) = WebhookEvent::decode(EventKind::Run, &body).unwrap() else {
        panic!("expected a run event");
    };
    let run = event.into_run();

    assert_eq!(run.status, RunStatus::Requested);
    assert_eq!(run.repository, "octo/repo");
    assert_eq!(run.display_title, "Fix flaky test");
}
