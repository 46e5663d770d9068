//! Automation engine: rule triggers evaluated on the event path plus the
//! daily time-in-stage sweep, executing a bounded set of actions.

mod engine;
mod template;

pub use engine::{AutomationEngine, AutomationOutcome, EventSnapshot};
pub use template::interpolate;
