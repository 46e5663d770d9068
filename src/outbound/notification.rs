use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::IntentSummary;

/// Chat-bound messages produced across the pipeline. Carried on the
/// notifications queue so outbound delivery never blocks processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Score crossed the hot threshold
    HotLead {
        lead_id: Uuid,
        name: String,
        email: String,
        total_score: i32,
        primary_intent: Option<String>,
        confidence: i32,
        job_title: Option<String>,
    },
    /// Primary and secondary intent within margin; needs a human call
    RoutingConflict {
        lead_id: Uuid,
        name: String,
        email: String,
        summary: IntentSummary,
    },
    /// Routed without an owner (manual strategy or no capacity)
    AssignmentNeeded {
        lead_id: Uuid,
        name: String,
        pipeline: String,
    },
    /// Lead exceeded the pool residency limit
    StuckLead {
        lead_id: Uuid,
        name: String,
        email: String,
        days_in_pool: i64,
        total_score: i32,
        confidence: i32,
    },
    /// Routing completed with an assignment
    LeadRouted {
        lead_id: Uuid,
        name: String,
        email: String,
        total_score: i32,
        primary_intent: Option<String>,
        confidence: i32,
        job_title: Option<String>,
        pipeline: String,
        assignee: Option<String>,
    },
    /// Daily aggregate message
    DailyDigest {
        new_leads: i64,
        hot_leads: i64,
        deals_created: i64,
        deals_won: i64,
        open_pipeline_value: String,
        top_sources: Vec<(String, i64)>,
    },
    /// Decay job report
    DecaySummary {
        expired_count: u64,
        leads_updated: u64,
        execution_time_ms: u64,
    },
    /// Operator alert for a permanently failed job
    JobFailed {
        queue: String,
        job_id: String,
        error: String,
    },
    /// Free-form message from automation templates
    Custom {
        channel: Option<String>,
        text: String,
    },
}

impl Notification {
    /// Stable-ish description used in logs and job ids
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::HotLead { .. } => "hot_lead",
            Notification::RoutingConflict { .. } => "routing_conflict",
            Notification::AssignmentNeeded { .. } => "assignment_needed",
            Notification::StuckLead { .. } => "stuck_lead",
            Notification::LeadRouted { .. } => "lead_routed",
            Notification::DailyDigest { .. } => "daily_digest",
            Notification::DecaySummary { .. } => "decay_summary",
            Notification::JobFailed { .. } => "job_failed",
            Notification::Custom { .. } => "custom",
        }
    }
}
