//! HTTP surface: webhook ingestion plus admin projections

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod types;

pub use routes::create_router;
pub use state::AppState;
