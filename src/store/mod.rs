//! Persistence layer
//!
//! One `PostgresStore` over a shared pool; query methods are grouped into
//! impl blocks per aggregate. All SQL is hand-written; the denormalized
//! lead fields are read caches over the score-history and intent-signal
//! ledgers, which stay authoritative.

mod automation;
mod events;
mod intent;
mod jobs;
mod leads;
mod organizations;
mod pipelines;
mod postgres;
mod scoring;
mod tasks;
mod team;

pub use jobs::FailedJob;
pub use leads::{ExternalIdColumn, NewLead};
pub use pipelines::RoutingOutcome;
pub use postgres::PostgresStore;
pub use scoring::ScoreHistoryEntry;
