//! Leadflow — lead event pipeline for dna-me marketing automation
//!
//! Turns the raw interaction event stream (page visits, form submissions,
//! email opens, LinkedIn actions, ROI-calculator submissions, conference
//! imports) into deduplicated leads with time-decayed composite scores, a
//! calibrated product-intent classification, and automated placement into
//! the right sales pipeline with an owner.

pub mod api;
pub mod automation;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod intent;
pub mod outbound;
pub mod queue;
pub mod routing;
pub mod rules;
pub mod scoring;
pub mod shutdown;
pub mod store;
pub mod workers;

pub use config::AppConfig;
pub use error::{LeadflowError, Result};
