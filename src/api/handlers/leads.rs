//! Lead projections and routing overrides for the admin surface

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::api::types::{ApiResult, RouteRequest};
use crate::domain::{Intent, Lead};
use crate::error::LeadflowError;
use crate::routing::RoutingResult;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/leads
pub async fn list_leads(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Lead>>> {
    let leads = state
        .store
        .list_leads(query.limit.clamp(1, 500), query.offset.max(0))
        .await?;
    Ok(Json(leads))
}

/// GET /api/leads/unrouted — the Global Pool
pub async fn list_unrouted(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Lead>>> {
    let leads = state
        .store
        .list_unrouted_leads(query.limit.clamp(1, 500))
        .await?;
    Ok(Json(leads))
}

/// GET /api/leads/:id
pub async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(state.store.get_lead(id).await?))
}

/// GET /api/leads/:id/events — recent interaction history
pub async fn get_lead_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<crate::domain::MarketingEvent>>> {
    // 404 for unknown leads rather than an empty list
    state.store.get_lead(id).await?;
    Ok(Json(state.store.get_lead_events(id, 100).await?))
}

/// GET /api/leads/:id/score-history — the authoritative ledger view
pub async fn get_score_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<crate::store::ScoreHistoryEntry>>> {
    state.store.get_lead(id).await?;
    Ok(Json(state.store.get_score_history(id, 200).await?))
}

/// POST /api/leads/:id/route — manual override with a forced pipeline or
/// intent (the conflict-notification buttons land here).
pub async fn route_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RouteRequest>,
) -> ApiResult<Json<RoutingResult>> {
    let forced_intent = request
        .intent
        .as_deref()
        .map(Intent::try_from)
        .transpose()
        .map_err(LeadflowError::Validation)?;

    let result = state
        .router
        .force_route(id, request.pipeline_slug.as_deref(), forced_intent, Utc::now())
        .await?;
    info!(
        lead = %id,
        reason = ?request.reason,
        action = ?result.action,
        "manual route requested"
    );
    Ok(Json(result))
}

/// POST /api/routing/evaluate/:lead_id — synchronous equivalent of the
/// routing worker's evaluation.
pub async fn evaluate_routing(
    State(state): State<AppState>,
    Path(lead_id): Path<Uuid>,
) -> ApiResult<Json<RoutingResult>> {
    let result = state.router.evaluate_and_route(lead_id, Utc::now()).await?;
    Ok(Json(result))
}
