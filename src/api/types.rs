use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::LeadflowError;
use crate::queue::QueueStatsSnapshot;

/// 202-style body returned by single-event ingestion
#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    pub event_id: Uuid,
    pub status: &'static str,
    pub queued_at: DateTime<Utc>,
}

/// Body returned by bulk ingestion
#[derive(Debug, Serialize)]
pub struct BulkAccepted {
    pub job_id: Uuid,
    pub leads_queued: usize,
}

/// Manual routing override request
#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    #[serde(default)]
    pub pipeline_slug: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Rule catalog write request
#[derive(Debug, Deserialize)]
pub struct ScoringRuleRequest {
    pub slug: String,
    pub name: String,
    pub category: String,
    pub rule_type: String,
    pub conditions: serde_json::Value,
    pub points: i32,
    #[serde(default)]
    pub max_per_day: Option<i32>,
    #[serde(default)]
    pub max_per_lead: Option<i32>,
    #[serde(default)]
    pub decay_days: Option<i32>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub uptime_seconds: i64,
    pub queues: Vec<QueueStatsSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub queue_depths: Vec<(String, i64)>,
}

/// Structured error body: `{"error": {"code", "message"}}`
pub struct ApiError(pub LeadflowError);

impl From<LeadflowError> for ApiError {
    fn from(err: LeadflowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code() {
            "validation" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" | "rate_limited_rule" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let resp = ApiError(LeadflowError::Validation("bad".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError(LeadflowError::Unauthorized("sig".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = ApiError(LeadflowError::NotFound {
            entity: "lead",
            id: "x".to_string(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = ApiError(LeadflowError::Conflict("dup".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
