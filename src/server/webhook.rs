use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use log::{debug, info};
use serde_json::{json, Value};

use crate::error::{CILensError, Result};
use crate::model::NewIntakeRecord;
use crate::providers::github::{decode_body, verify_signature, EventHeader, WebhookEvent};

use super::AppState;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    header_str(headers, name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| CILensError::Validation(format!("missing {name} header")))
}

/// `POST /webhook`: authenticates a delivery and queues it for reconciliation.
///
/// Responds as soon as the delivery is durable; reconciliation happens later
/// in the scheduler.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let secret = state
        .secret
        .as_deref()
        .ok_or_else(|| CILensError::Config("webhook secret is not configured".into()))?;

    verify_signature(
        secret.as_bytes(),
        header_str(&headers, SIGNATURE_HEADER),
        &body,
    )?;

    let event_header = EventHeader::parse(required_header(&headers, EVENT_HEADER)?)?;
    let Some(kind) = event_header.kind() else {
        debug!("Received ping delivery");
        return Ok((StatusCode::OK, Json(json!({ "status": "pong" }))));
    };

    let delivery_id = required_header(&headers, DELIVERY_HEADER)?.to_string();

    let payload = decode_body(header_str(&headers, header::CONTENT_TYPE.as_str()), &body)?;
    let event = WebhookEvent::decode(kind, &payload)?;
    let metadata = event.metadata();

    info!(
        "Queued {kind} delivery {delivery_id} ({} {})",
        metadata.ordering_key,
        event.action()
    );

    state
        .store
        .store_or_replace_intake_record(NewIntakeRecord {
            delivery_id: delivery_id.clone(),
            event_kind: kind,
            metadata,
            received_at: Utc::now(),
            payload,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "queued",
            "message": "event accepted and queued for processing",
            "delivery_id": delivery_id,
        })),
    ))
}
