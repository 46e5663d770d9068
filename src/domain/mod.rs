//! Core domain types for the lead event pipeline

pub mod event;
pub mod lead;
pub mod organization;
pub mod pipeline;
pub mod rules;
pub mod task;
pub mod team;

pub use event::{EventCategory, IngestEvent, LeadIdentifier, MarketingEvent};
pub use lead::{
    Attribution, Intent, IntentSummary, Lead, LeadStatus, LifecycleStage, RoutingStatus,
    ScoreCategory, ScoreTier, Scores,
};
pub use organization::Organization;
pub use pipeline::{Deal, DealStatus, Pipeline, PipelineStage, StageType};
pub use rules::{
    ActionType, AutomationAction, AutomationRule, AutomationTrigger, IntentRule, RuleType,
    ScoringRule, TriggerType,
};
pub use task::{Task, TaskStatus};
pub use team::{AssignmentStrategy, Role, TeamMember};
