//! Scoring engine: versioned rules over events, a ledger of point deltas,
//! and tier-crossing detection.

mod engine;

pub use engine::{matching_rules, ScoringEngine, ScoringOutcome};
