use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::{handlers, state::AppState};

fn build_cors_layer() -> CorsLayer {
    let mut origins: Vec<HeaderValue> = std::env::var("LEADFLOW_CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .filter_map(|v| HeaderValue::from_str(v).ok())
                .collect()
        })
        .unwrap_or_default();

    if origins.is_empty() {
        origins.push(HeaderValue::from_static("http://localhost:5173"));
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-webhook-signature"),
        ])
}

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    Router::new()
        // Readiness probe
        .route("/health", get(handlers::health))
        // Webhook ingestion
        .route("/api/events", post(handlers::ingest_event))
        .route("/api/events/bulk", post(handlers::ingest_bulk))
        // Lead projections
        .route("/api/leads", get(handlers::list_leads))
        .route("/api/leads/unrouted", get(handlers::list_unrouted))
        .route("/api/leads/:id", get(handlers::get_lead))
        .route("/api/leads/:id/events", get(handlers::get_lead_events))
        .route(
            "/api/leads/:id/score-history",
            get(handlers::get_score_history),
        )
        .route("/api/leads/:id/route", post(handlers::route_lead))
        // Routing
        .route(
            "/api/routing/evaluate/:lead_id",
            post(handlers::evaluate_routing),
        )
        // Scoring rule catalog
        .route(
            "/api/scoring/rules",
            get(handlers::list_scoring_rules).post(handlers::create_scoring_rule),
        )
        .route(
            "/api/scoring/rules/:id",
            put(handlers::update_scoring_rule).delete(handlers::delete_scoring_rule),
        )
        .route("/api/admin/rules/reload", post(handlers::reload_rules))
        // System surface
        .route("/api/system/stats", get(handlers::get_stats))
        .route("/api/jobs/failed", get(handlers::get_failed_jobs))
        .route("/api/jobs/failed/:id/retry", post(handlers::retry_failed_job))
        .with_state(state)
        .layer(cors)
}
