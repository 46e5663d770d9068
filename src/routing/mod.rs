//! Pipeline Router: the single decision point moving leads out of the
//! Global Pool into a pipeline with a deal and an owner.

pub mod assignment;
mod router;

pub use router::{decide, PipelineRouter, RoutingAction, RoutingDecision, RoutingResult};
