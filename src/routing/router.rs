use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RoutingConfig;
use crate::domain::pipeline::deal_name;
use crate::domain::team::OwnerAssignment;
use crate::domain::{Intent, Lead, Pipeline, RoutingStatus};
use crate::error::{LeadflowError, Result};
use crate::intent::{IntentCalc, IntentDetector};
use crate::outbound::Notification;
use crate::queue::{JobPayload, JobQueues, QueueName};
use crate::store::PostgresStore;

use super::assignment::{plan_for, region_for_country, AssignmentNotify, AssignmentPlan};

/// Slug of the pipeline stuck leads escalate into
const STUCK_PIPELINE_SLUG: &str = "discovery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    Routed,
    Skip,
    Wait,
    ManualReview,
}

/// What `evaluateAndRoute` decided and did
#[derive(Debug, Clone, Serialize)]
pub struct RoutingResult {
    pub action: RoutingAction,
    pub reason: &'static str,
    pub pipeline_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
}

impl RoutingResult {
    fn bare(action: RoutingAction, reason: &'static str) -> Self {
        Self {
            action,
            reason,
            pipeline_id: None,
            deal_id: None,
            assigned_to: None,
        }
    }
}

/// Pure routing decision, separated from side effects for testability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Skip(&'static str),
    Wait(&'static str),
    Route(Intent),
    /// Primary/secondary within margin; humans pick
    Conflict,
    /// Pool residency exceeded; escalate to discovery
    Stuck { days_in_pool: i64 },
}

/// The routing decision ladder, stopping at the first matching clause.
pub fn decide(
    lead: &Lead,
    calc: &IntentCalc,
    config: &RoutingConfig,
    now: DateTime<Utc>,
) -> RoutingDecision {
    if !lead.is_routing_candidate() {
        return RoutingDecision::Skip("deletion_requested");
    }
    if lead.pipeline_id.is_some() {
        return RoutingDecision::Skip("already_routed");
    }
    if lead.total_score() < config.min_score {
        return RoutingDecision::Wait("score_below_threshold");
    }
    if calc.routable {
        if let Some(intent) = calc.primary {
            return RoutingDecision::Route(intent);
        }
    }
    if calc.conflict {
        return RoutingDecision::Conflict;
    }
    let days_in_pool = (now - lead.created_at).num_days();
    if days_in_pool > config.stuck_after_days {
        return RoutingDecision::Stuck { days_in_pool };
    }
    RoutingDecision::Wait("insufficient_confidence")
}

/// Routes leads out of the Global Pool. Safe to re-run: the
/// already-routed guard short-circuits, the deal upsert deduplicates and
/// the owner increment fires only when a deal is actually created.
pub struct PipelineRouter {
    store: Arc<PostgresStore>,
    detector: Arc<IntentDetector>,
    queues: JobQueues,
    config: RoutingConfig,
}

impl PipelineRouter {
    pub fn new(
        store: Arc<PostgresStore>,
        detector: Arc<IntentDetector>,
        queues: JobQueues,
        config: RoutingConfig,
    ) -> Self {
        Self {
            store,
            detector,
            queues,
            config,
        }
    }

    /// Evaluate the decision ladder for one lead and apply the outcome.
    pub async fn evaluate_and_route(
        &self,
        lead_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RoutingResult> {
        let lead = self.store.get_lead(lead_id).await?;
        // Refresh the intent read from the signal ledger
        let calc = self.detector.recompute_lead(lead_id).await?;

        match decide(&lead, &calc, &self.config, now) {
            RoutingDecision::Skip(reason) => Ok(RoutingResult::bare(RoutingAction::Skip, reason)),
            RoutingDecision::Wait(reason) => Ok(RoutingResult::bare(RoutingAction::Wait, reason)),
            RoutingDecision::Route(intent) => {
                let pipeline = self.store.get_pipeline_by_slug(intent.pipeline_slug()).await?;
                let plan = plan_for(OwnerAssignment::for_intent(intent));
                let mut result = self.route_into(&lead, &pipeline, plan, now).await?;
                result.reason = "routed";
                self.notify_routed(&lead, &calc, &pipeline, result.assigned_to)
                    .await?;
                Ok(result)
            }
            RoutingDecision::Conflict => {
                self.store
                    .set_routing_status(lead.id, RoutingStatus::ManualReview)
                    .await?;
                self.enqueue_notification(Notification::RoutingConflict {
                    lead_id: lead.id,
                    name: lead.display_name(),
                    email: lead.email.clone(),
                    summary: calc.summary.clone(),
                })?;
                info!(lead = %lead.id, "routing conflict, manual review requested");
                Ok(RoutingResult::bare(
                    RoutingAction::ManualReview,
                    "intent_conflict",
                ))
            }
            RoutingDecision::Stuck { days_in_pool } => {
                let pipeline = self.store.get_pipeline_by_slug(STUCK_PIPELINE_SLUG).await?;
                let plan = AssignmentPlan {
                    role: None,
                    region_aware: false,
                    notify: AssignmentNotify::MarketingManager,
                };
                let routed = self.route_into(&lead, &pipeline, plan, now).await?;
                self.enqueue_notification(Notification::StuckLead {
                    lead_id: lead.id,
                    name: lead.display_name(),
                    email: lead.email.clone(),
                    days_in_pool,
                    total_score: lead.total_score(),
                    confidence: calc.confidence,
                })?;
                warn!(lead = %lead.id, days_in_pool, "stuck lead escalated to discovery");
                Ok(RoutingResult {
                    action: RoutingAction::ManualReview,
                    reason: "stuck_in_pool",
                    ..routed
                })
            }
        }
    }

    /// Manual-route path: the admin surface forces a pipeline or intent
    /// (conflict-button semantics). Gates are bypassed; the already-routed
    /// guard still applies.
    pub async fn force_route(
        &self,
        lead_id: Uuid,
        pipeline_slug: Option<&str>,
        forced_intent: Option<Intent>,
        now: DateTime<Utc>,
    ) -> Result<RoutingResult> {
        let lead = self.store.get_lead(lead_id).await?;
        if !lead.is_routing_candidate() {
            return Ok(RoutingResult::bare(RoutingAction::Skip, "deletion_requested"));
        }
        if lead.pipeline_id.is_some() {
            return Ok(RoutingResult::bare(RoutingAction::Skip, "already_routed"));
        }

        let slug = match (pipeline_slug, forced_intent) {
            (Some(slug), _) => slug,
            (None, Some(intent)) => intent.pipeline_slug(),
            (None, None) => {
                return Err(LeadflowError::Validation(
                    "manual route requires a pipeline slug or intent".to_string(),
                ))
            }
        };
        let pipeline = self.store.get_pipeline_by_slug(slug).await?;
        let plan = match forced_intent {
            Some(intent) => plan_for(OwnerAssignment::for_intent(intent)),
            None => AssignmentPlan {
                role: None,
                region_aware: false,
                notify: AssignmentNotify::AssignmentNeeded,
            },
        };
        let mut result = self.route_into(&lead, &pipeline, plan, now).await?;
        result.reason = "manual_route";
        info!(lead = %lead.id, pipeline = %pipeline.slug, "lead routed manually");
        Ok(result)
    }

    /// Shared routing side effects: deal upsert, lead fields and owner
    /// assignment in one transaction, then follow-up notifications.
    async fn route_into(
        &self,
        lead: &Lead,
        pipeline: &Pipeline,
        plan: AssignmentPlan,
        now: DateTime<Utc>,
    ) -> Result<RoutingResult> {
        let stage = self.store.get_first_stage(pipeline.id).await?;
        let name = deal_name(&lead.display_name(), &pipeline.name);

        let desired_region = if plan.region_aware {
            let organization = self.store.organization_for_lead(lead.id).await?;
            region_for_country(organization.as_ref().and_then(|o| o.country.as_deref()))
        } else {
            None
        };

        let outcome = self
            .store
            .apply_routing(
                lead.id,
                pipeline.id,
                stage.id,
                &name,
                plan.role,
                desired_region.as_deref(),
                now,
            )
            .await?;

        let owner_missing = outcome.assigned_to.is_none();
        match plan.notify {
            AssignmentNotify::AssignmentNeeded => {
                self.enqueue_notification(Notification::AssignmentNeeded {
                    lead_id: lead.id,
                    name: lead.display_name(),
                    pipeline: pipeline.name.clone(),
                })?;
            }
            AssignmentNotify::MarketingManager => {
                self.enqueue_notification(Notification::Custom {
                    channel: None,
                    text: format!(
                        "Lead {} ({}) placed in {} for marketing review",
                        lead.display_name(),
                        lead.email,
                        pipeline.name
                    ),
                })?;
            }
            AssignmentNotify::None if owner_missing && plan.role.is_some() => {
                // Everyone at capacity; surface instead of silently dropping
                warn!(lead = %lead.id, "no team member with free capacity");
                self.enqueue_notification(Notification::AssignmentNeeded {
                    lead_id: lead.id,
                    name: lead.display_name(),
                    pipeline: pipeline.name.clone(),
                })?;
            }
            AssignmentNotify::None => {}
        }

        info!(
            lead = %lead.id,
            pipeline = %pipeline.slug,
            deal = %outcome.deal.id,
            created = outcome.deal_created,
            assigned = ?outcome.assigned_to,
            "lead routed"
        );

        Ok(RoutingResult {
            action: RoutingAction::Routed,
            reason: "routed",
            pipeline_id: Some(pipeline.id),
            deal_id: Some(outcome.deal.id),
            assigned_to: outcome.assigned_to,
        })
    }

    async fn notify_routed(
        &self,
        lead: &Lead,
        calc: &IntentCalc,
        pipeline: &Pipeline,
        assigned_to: Option<Uuid>,
    ) -> Result<()> {
        let assignee = match assigned_to {
            Some(id) => Some(self.store.get_team_member(id).await?.name),
            None => None,
        };
        self.enqueue_notification(Notification::LeadRouted {
            lead_id: lead.id,
            name: lead.display_name(),
            email: lead.email.clone(),
            total_score: lead.total_score(),
            primary_intent: calc.primary.map(|i| i.as_str().to_string()),
            confidence: calc.confidence,
            job_title: lead.job_title.clone(),
            pipeline: pipeline.name.clone(),
            assignee,
        })
    }

    fn enqueue_notification(&self, notification: Notification) -> Result<()> {
        let job_id = format!("notify:{}:{}", notification.kind(), Uuid::new_v4());
        self.queues
            .enqueue(QueueName::Notifications, job_id, JobPayload::Notify { notification })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::Attribution;
    use crate::domain::{IntentSummary, LeadStatus, LifecycleStage, Scores};
    use crate::intent::compute_confidence;
    use chrono::Duration;

    fn config() -> RoutingConfig {
        RoutingConfig::default()
    }

    fn lead_with(total: i32, created_days_ago: i64) -> Lead {
        let created = Utc::now() - Duration::days(created_days_ago);
        Lead {
            id: Uuid::new_v4(),
            email: "x@y.com".to_string(),
            placeholder_email: false,
            portal_id: None,
            linkedin_url: None,
            waalaxy_id: None,
            lemlist_id: None,
            first_name: None,
            last_name: None,
            phone: None,
            job_title: None,
            organization_id: None,
            status: LeadStatus::New,
            lifecycle_stage: LifecycleStage::Lead,
            scores: Scores {
                demographic: 0,
                engagement: 0,
                behavior: total,
            },
            pipeline_id: None,
            routing_status: RoutingStatus::Unrouted,
            routed_at: None,
            primary_intent: None,
            intent_confidence: 0,
            intent_summary: IntentSummary::new(),
            attribution: Attribution::default(),
            gdpr_consent_at: None,
            gdpr_consent_source: None,
            deletion_requested_at: None,
            created_at: created,
            updated_at: created,
            last_activity_at: None,
        }
    }

    fn calc(entries: &[(&str, i64)]) -> IntentCalc {
        let summary: IntentSummary = entries.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        compute_confidence(&summary, 15, 60)
    }

    #[test]
    fn test_already_routed_short_circuits() {
        let mut lead = lead_with(100, 1);
        lead.pipeline_id = Some(Uuid::new_v4());
        let decision = decide(&lead, &calc(&[("research", 80)]), &config(), Utc::now());
        assert_eq!(decision, RoutingDecision::Skip("already_routed"));
    }

    #[test]
    fn test_deletion_requested_never_routes() {
        let mut lead = lead_with(100, 1);
        lead.deletion_requested_at = Some(Utc::now());
        let decision = decide(&lead, &calc(&[("research", 80)]), &config(), Utc::now());
        assert_eq!(decision, RoutingDecision::Skip("deletion_requested"));
    }

    #[test]
    fn test_score_gate_below_forty() {
        let decision = decide(
            &lead_with(39, 1),
            &calc(&[("research", 80)]),
            &config(),
            Utc::now(),
        );
        assert_eq!(decision, RoutingDecision::Wait("score_below_threshold"));

        // Exactly 40 passes the gate
        let decision = decide(
            &lead_with(40, 1),
            &calc(&[("research", 80)]),
            &config(),
            Utc::now(),
        );
        assert_eq!(decision, RoutingDecision::Route(Intent::Research));
    }

    #[test]
    fn test_conflict_goes_to_manual_review() {
        let decision = decide(
            &lead_with(50, 1),
            &calc(&[("co_creation", 40), ("research", 30), ("b2b", 25)]),
            &config(),
            Utc::now(),
        );
        assert_eq!(decision, RoutingDecision::Conflict);
    }

    #[test]
    fn test_stuck_after_fourteen_days() {
        // Low confidence, no conflict (margin exactly met), 15 days in pool
        let weak = calc(&[("research", 35), ("b2b", 20), ("co_creation", 20)]);
        assert!(!weak.routable);
        assert!(!weak.conflict);
        let decision = decide(&lead_with(50, 15), &weak, &config(), Utc::now());
        assert!(matches!(decision, RoutingDecision::Stuck { days_in_pool: 15 }));

        // Exactly 14 days is not yet stuck
        let decision = decide(&lead_with(50, 14), &weak, &config(), Utc::now());
        assert_eq!(decision, RoutingDecision::Wait("insufficient_confidence"));
    }

    #[test]
    fn test_routable_intent_routes() {
        let decision = decide(
            &lead_with(90, 2),
            &calc(&[("b2b", 85)]),
            &config(),
            Utc::now(),
        );
        assert_eq!(decision, RoutingDecision::Route(Intent::B2b));
    }
}
