//! Health, stats and the durable failed-job surface

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiResult, HealthResponse, SystemStats};
use crate::error::LeadflowError;
use crate::queue::{JobPayload, QueueName};
use crate::store::FailedJob;

/// GET /health — liveness plus DB ping and queue depths
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = state.store.ping().await.is_ok();
    let queue_depths = QueueName::ALL
        .iter()
        .map(|name| (name.as_str().to_string(), state.queues.depth(*name)))
        .collect();
    Ok(Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        queue_depths,
    }))
}

/// GET /api/system/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<SystemStats>> {
    Ok(Json(SystemStats {
        uptime_seconds: state.uptime_seconds(),
        queues: state.queues.stats(),
    }))
}

/// GET /api/jobs/failed
pub async fn get_failed_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<FailedJob>>> {
    Ok(Json(state.store.list_failed_jobs(100).await?))
}

/// POST /api/jobs/failed/:id/retry — requeue onto the original queue
pub async fn retry_failed_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let failed = state.store.get_failed_job(id).await?;
    let payload: JobPayload = serde_json::from_value(failed.payload.clone())
        .map_err(|e| LeadflowError::Validation(format!("stored payload no longer parses: {e}")))?;
    let queue = QueueName::ALL
        .into_iter()
        .find(|q| q.as_str() == failed.queue)
        .ok_or_else(|| LeadflowError::NotFound {
            entity: "queue",
            id: failed.queue.clone(),
        })?;

    state
        .queues
        .enqueue(queue, format!("retry:{}:{}", failed.id, failed.job_id), payload)?;
    state.store.resolve_failed_job(id, "admin_retry").await?;
    info!(failed_job = id, queue = %failed.queue, "failed job requeued");
    Ok(StatusCode::ACCEPTED)
}
