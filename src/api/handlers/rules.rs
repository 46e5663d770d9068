//! Scoring rule catalog CRUD and the cache invalidation hook

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::api::types::{ApiResult, ScoringRuleRequest};
use crate::domain::{RuleType, ScoreCategory, ScoringRule};
use crate::error::LeadflowError;

fn rule_from_request(id: Uuid, request: ScoringRuleRequest) -> Result<ScoringRule, LeadflowError> {
    Ok(ScoringRule {
        id,
        slug: request.slug,
        name: request.name,
        category: ScoreCategory::try_from(request.category.as_str())
            .map_err(LeadflowError::Validation)?,
        rule_type: RuleType::try_from(request.rule_type.as_str())
            .map_err(LeadflowError::Validation)?,
        conditions: serde_json::from_value(request.conditions)
            .map_err(|e| LeadflowError::Validation(format!("invalid conditions: {e}")))?,
        points: request.points,
        max_per_day: request.max_per_day,
        max_per_lead: request.max_per_lead,
        decay_days: request.decay_days,
        priority: request.priority,
        is_active: request.is_active,
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
}

/// GET /api/scoring/rules
pub async fn list_scoring_rules(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ScoringRule>>> {
    Ok(Json(state.store.list_scoring_rules().await?))
}

/// POST /api/scoring/rules
pub async fn create_scoring_rule(
    State(state): State<AppState>,
    Json(request): Json<ScoringRuleRequest>,
) -> ApiResult<(StatusCode, Json<ScoringRule>)> {
    let rule = rule_from_request(Uuid::new_v4(), request)?;
    let created = state.store.create_scoring_rule(&rule).await?;
    state.scoring.invalidate_rules().await;
    info!(rule = %created.slug, "scoring rule created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/scoring/rules/:id
pub async fn update_scoring_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScoringRuleRequest>,
) -> ApiResult<Json<ScoringRule>> {
    let rule = rule_from_request(id, request)?;
    let updated = state.store.update_scoring_rule(&rule).await?;
    state.scoring.invalidate_rules().await;
    info!(rule = %updated.slug, version = updated.version, "scoring rule updated");
    Ok(Json(updated))
}

/// DELETE /api/scoring/rules/:id
pub async fn delete_scoring_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.delete_scoring_rule(id).await?;
    state.scoring.invalidate_rules().await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/rules/reload — invalidate every in-process rule cache
pub async fn reload_rules(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.scoring.invalidate_rules().await;
    state.intent.invalidate_rules().await;
    state.automation.invalidate_rules().await;
    info!("rule caches invalidated");
    Ok(StatusCode::NO_CONTENT)
}
