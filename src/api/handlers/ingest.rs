//! Webhook ingestion handlers
//!
//! The endpoint never writes to the primary store synchronously: after
//! signature verification and shape validation the event goes straight to
//! the events queue and the producer gets a 202.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::api::auth::{signature_from_headers, verify_signature};
use crate::api::state::AppState;
use crate::api::types::{ApiError, BulkAccepted, IngestAccepted};
use crate::domain::IngestEvent;
use crate::error::LeadflowError;
use crate::queue::{JobPayload, QueueName};

/// Maximum events accepted by the bulk variant
const BULK_LIMIT: usize = 1_000;

fn authenticate(state: &AppState, headers: &HeaderMap, body: &[u8], source: &str) -> Result<(), ApiError> {
    let signature = signature_from_headers(headers)?;
    let secret = state.config.security.secret_for_source(source);
    verify_signature(secret, body, signature)?;
    state.check_rate_limit(source)?;
    Ok(())
}

/// POST /api/events — single event under one signature
pub async fn ingest_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestAccepted>), ApiError> {
    let event: IngestEvent = serde_json::from_slice(&body)
        .map_err(|e| LeadflowError::Validation(format!("malformed event body: {e}")))?;
    authenticate(&state, &headers, &body, &event.source)?;
    event.validate()?;

    let event_id = Uuid::new_v4();
    state.queues.enqueue(
        QueueName::Events,
        format!("event:{event_id}"),
        JobPayload::ProcessEvent {
            event,
            batch_id: None,
        },
    )?;

    debug!(event = %event_id, "event accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            event_id,
            status: "queued",
            queued_at: Utc::now(),
        }),
    ))
}

/// POST /api/events/bulk — array of events under a single signature,
/// each enqueued as an independent job sharing a batch id.
pub async fn ingest_bulk(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<BulkAccepted>), ApiError> {
    let events: Vec<IngestEvent> = serde_json::from_slice(&body)
        .map_err(|e| LeadflowError::Validation(format!("malformed bulk body: {e}")))?;

    if events.is_empty() {
        return Err(LeadflowError::Validation("bulk body must not be empty".to_string()).into());
    }
    if events.len() > BULK_LIMIT {
        return Err(LeadflowError::Validation(format!(
            "bulk imports are limited to {BULK_LIMIT} events, got {}",
            events.len()
        ))
        .into());
    }

    // One signature covers the whole batch; sources may differ per event,
    // so the first event's source picks the secret.
    let source = events[0].source.clone();
    authenticate(&state, &headers, &body, &source)?;
    for event in &events {
        event.validate()?;
    }

    let batch_id = Uuid::new_v4();
    let queued = events.len();
    for event in events {
        state.queues.enqueue(
            QueueName::Events,
            format!("event:{batch_id}:{}", Uuid::new_v4()),
            JobPayload::ProcessEvent {
                event,
                batch_id: Some(batch_id),
            },
        )?;
    }

    debug!(batch = %batch_id, queued, "bulk import accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(BulkAccepted {
            job_id: batch_id,
            leads_queued: queued,
        }),
    ))
}
