mod ingest;
mod leads;
mod rules;
mod system;

pub use ingest::{ingest_bulk, ingest_event};
pub use leads::{
    evaluate_routing, get_lead, get_lead_events, get_score_history, list_leads, list_unrouted,
    route_lead,
};
pub use rules::{
    create_scoring_rule, delete_scoring_rule, list_scoring_rules, reload_rules,
    update_scoring_rule,
};
pub use system::{get_failed_jobs, get_stats, health, retry_failed_job};
