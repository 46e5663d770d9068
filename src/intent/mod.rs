//! Intent detector: rule-driven signals and the calibrated confidence
//! summary that gates routing.

mod detector;

pub use detector::{compute_confidence, IntentCalc, IntentDetector, IntentOutcome};
