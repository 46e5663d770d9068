use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    AutomationAction, AutomationRule, AutomationTrigger, Deal, Lead, MarketingEvent, Organization,
};
use crate::error::{LeadflowError, Result};
use crate::outbound::Notification;
use crate::queue::{JobPayload, JobQueues, QueueName};
use crate::routing::PipelineRouter;
use crate::rules::TtlCache;
use crate::store::PostgresStore;

use super::template::interpolate;

/// Pre/post snapshot the event worker carries into trigger evaluation
#[derive(Debug, Clone, Copy)]
pub struct EventSnapshot {
    pub pre_total: i32,
    pub post_total: i32,
    pub intent_confidence: i32,
    pub primary_intent: Option<crate::domain::Intent>,
}

/// Rules fired for one evaluation cycle
#[derive(Debug, Clone, Default)]
pub struct AutomationOutcome {
    pub rules_fired: Vec<String>,
}

/// Evaluates automation triggers and executes their actions serially.
pub struct AutomationEngine {
    store: Arc<PostgresStore>,
    queues: JobQueues,
    router: Arc<PipelineRouter>,
    cache: TtlCache<Vec<AutomationRule>>,
}

impl AutomationEngine {
    pub fn new(
        store: Arc<PostgresStore>,
        queues: JobQueues,
        router: Arc<PipelineRouter>,
        cache_ttl: std::time::Duration,
    ) -> Self {
        Self {
            store,
            queues,
            router,
            cache: TtlCache::new(cache_ttl),
        }
    }

    async fn rules(&self) -> Result<Arc<Vec<AutomationRule>>> {
        let store = self.store.clone();
        self.cache
            .get_with(|| async move { store.list_active_automation_rules().await })
            .await
    }

    pub async fn invalidate_rules(&self) {
        self.cache.invalidate().await;
    }

    /// Event-path evaluation: event triggers, upward score-threshold
    /// crossings (guarded by automation_logs) and intent-detected
    /// triggers. Time-in-stage rules belong to the daily sweep.
    pub async fn process_event(
        &self,
        event: &MarketingEvent,
        lead: &Lead,
        organization: Option<&Organization>,
        snapshot: EventSnapshot,
        now: DateTime<Utc>,
    ) -> Result<AutomationOutcome> {
        let rules = self.rules().await?;
        let mut outcome = AutomationOutcome::default();

        for rule in rules.iter() {
            let fired = match &rule.trigger {
                AutomationTrigger::Event { condition } => {
                    if !condition.matches(event) {
                        false
                    } else {
                        // Guard against double-firing on job retries
                        self.store
                            .try_log_automation(
                                rule.id,
                                lead.id,
                                &format!("event:{}", event.id),
                                &json!({ "event_type": event.event_type }),
                            )
                            .await?
                    }
                }
                AutomationTrigger::ScoreThreshold { threshold } => {
                    let crossed =
                        snapshot.pre_total < *threshold && snapshot.post_total >= *threshold;
                    if !crossed {
                        false
                    } else {
                        // The log row is the re-fire guard
                        self.store
                            .try_log_automation(
                                rule.id,
                                lead.id,
                                &format!("threshold:{threshold}"),
                                &json!({ "threshold": threshold, "event_id": event.id }),
                            )
                            .await?
                    }
                }
                AutomationTrigger::IntentDetected {
                    intent,
                    confidence_gte,
                } => {
                    let matched = snapshot.primary_intent == Some(*intent)
                        && snapshot.intent_confidence >= *confidence_gte;
                    if !matched {
                        false
                    } else {
                        self.store
                            .try_log_automation(
                                rule.id,
                                lead.id,
                                &format!("intent:{}", intent.as_str()),
                                &json!({
                                    "intent": intent.as_str(),
                                    "confidence": snapshot.intent_confidence,
                                }),
                            )
                            .await?
                    }
                }
                AutomationTrigger::TimeInStage { .. } => false,
            };

            if !fired {
                continue;
            }

            debug!(rule = %rule.name, lead = %lead.id, "automation rule fired");
            self.execute(rule, lead, None, organization, Some(event.id), now)
                .await?;
            self.store.record_automation_execution(rule.id, now).await?;
            outcome.rules_fired.push(rule.name.clone());
        }

        Ok(outcome)
    }

    /// Daily sweep for time-in-stage triggers, run off the event path.
    pub async fn run_time_in_stage_sweep(&self, now: DateTime<Utc>) -> Result<u64> {
        let rules = self.rules().await?;
        let mut fired = 0u64;

        for rule in rules.iter() {
            let AutomationTrigger::TimeInStage { stage_slug, days } = &rule.trigger else {
                continue;
            };
            let Some(pipeline_id) = rule.pipeline_id else {
                warn!(rule = %rule.name, "time_in_stage rule without pipeline scope");
                continue;
            };
            let stage = self.store.get_stage_by_slug(pipeline_id, stage_slug).await?;
            let cutoff = now - Duration::days(*days);
            let deals = self.store.deals_in_stage_since(stage.id, cutoff).await?;

            for deal in deals {
                // One firing per stay in the stage
                let key = format!(
                    "time_in_stage:{}:{}",
                    stage_slug,
                    deal.stage_entered_at.timestamp()
                );
                let first = self
                    .store
                    .try_log_automation(
                        rule.id,
                        deal.lead_id,
                        &key,
                        &json!({ "deal_id": deal.id, "stage": stage_slug, "days": days }),
                    )
                    .await?;
                if !first {
                    continue;
                }

                let lead = self.store.get_lead(deal.lead_id).await?;
                let organization = self.store.organization_for_lead(lead.id).await?;
                self.execute(rule, &lead, Some(&deal), organization.as_ref(), None, now)
                    .await?;
                self.store.record_automation_execution(rule.id, now).await?;
                fired += 1;
            }
        }

        Ok(fired)
    }

    /// Execute one action. Serial per rule; failures surface as job
    /// errors and go through the normal retry path.
    async fn execute(
        &self,
        rule: &AutomationRule,
        lead: &Lead,
        deal: Option<&Deal>,
        organization: Option<&Organization>,
        event_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let _ = organization;
        match &rule.action {
            AutomationAction::MoveToStage { stage_slug } => {
                let deal = match deal {
                    Some(deal) => deal.clone(),
                    None => match self.current_deal(lead).await? {
                        Some(deal) => deal,
                        None => {
                            warn!(rule = %rule.name, lead = %lead.id, "move_to_stage without a deal");
                            return Ok(());
                        }
                    },
                };
                let stage = self
                    .store
                    .get_stage_by_slug(deal.pipeline_id, stage_slug)
                    .await?;
                self.store.update_deal_stage(deal.id, stage.id, now).await?;
                info!(deal = %deal.id, stage = %stage.slug, "deal moved by automation");
            }
            AutomationAction::AssignOwner {
                role,
                strategy: _,
                region_aware,
            } => {
                let deal = match deal {
                    Some(deal) => deal.clone(),
                    None => match self.current_deal(lead).await? {
                        Some(deal) => deal,
                        None => {
                            warn!(rule = %rule.name, lead = %lead.id, "assign_owner without a deal");
                            return Ok(());
                        }
                    },
                };
                let region = if *region_aware {
                    deal.assigned_region.clone()
                } else {
                    None
                };
                let candidates = self.store.available_members(*role, region.as_deref()).await?;
                let mut assigned = false;
                for member in candidates {
                    if self.store.try_assign_lead(member.id, now).await? {
                        self.store
                            .assign_deal(deal.id, member.id, member.region.as_deref())
                            .await?;
                        info!(deal = %deal.id, member = %member.email, "owner assigned by automation");
                        assigned = true;
                        break;
                    }
                }
                if !assigned {
                    self.enqueue_notification(Notification::AssignmentNeeded {
                        lead_id: lead.id,
                        name: lead.display_name(),
                        pipeline: deal.name.clone(),
                    })?;
                }
            }
            AutomationAction::SendNotification { template, channel } => {
                let deal_owned;
                let deal_ref = match deal {
                    Some(deal) => Some(deal),
                    None => {
                        deal_owned = self.current_deal(lead).await?;
                        deal_owned.as_ref()
                    }
                };
                let text = interpolate(template, Some(lead), deal_ref);
                self.enqueue_notification(Notification::Custom {
                    channel: channel.clone(),
                    text,
                })?;
            }
            AutomationAction::CreateTask {
                title_template,
                description_template,
                task_type,
                due_days,
                assign_role,
            } => {
                let title = interpolate(title_template, Some(lead), deal);
                let description = description_template
                    .as_ref()
                    .map(|t| interpolate(t, Some(lead), deal));
                let assignee = match assign_role {
                    Some(role) => self
                        .store
                        .available_members(*role, None)
                        .await?
                        .first()
                        .map(|m| m.id),
                    None => None,
                };
                let due = (now + Duration::days(*due_days)).date_naive();
                let task_id = self
                    .store
                    .insert_task(
                        Some(lead.id),
                        deal.map(|d| d.id),
                        &title,
                        description.as_deref(),
                        task_type,
                        assignee,
                        Some(due),
                        Some(rule.id),
                    )
                    .await?;
                info!(task = %task_id, lead = %lead.id, "task created by automation");
            }
            AutomationAction::SyncMoco { action } => {
                let job_id = format!("moco:{}:{}", action.as_str(), lead.id);
                self.queues.enqueue(
                    QueueName::Sync,
                    job_id,
                    JobPayload::SyncMoco {
                        lead_id: lead.id,
                        deal_id: deal.map(|d| d.id),
                        action: *action,
                    },
                )?;
            }
            AutomationAction::UpdateField { field, value } => {
                if !AutomationAction::UPDATABLE_FIELDS.contains(&field.as_str()) {
                    return Err(LeadflowError::Validation(format!(
                        "automation may not update field {field}"
                    )));
                }
                let value = value.as_str().ok_or_else(|| {
                    LeadflowError::Validation("update_field value must be a string".to_string())
                })?;
                self.store.update_lead_field(lead.id, field, value).await?;
            }
            AutomationAction::RouteToPipeline {
                pipeline_slug,
                create_deal,
            } => {
                if *create_deal {
                    self.router
                        .force_route(lead.id, Some(pipeline_slug), None, now)
                        .await?;
                } else {
                    let pipeline = self.store.get_pipeline_by_slug(pipeline_slug).await?;
                    self.store.set_lead_pipeline(lead.id, pipeline.id).await?;
                }
            }
        }

        // Fired automations may enqueue routing re-evaluation indirectly;
        // event-path callers already do so after this returns.
        Ok(())
    }

    async fn current_deal(&self, lead: &Lead) -> Result<Option<Deal>> {
        match lead.pipeline_id {
            Some(pipeline_id) => self.store.get_deal_for_lead(lead.id, pipeline_id).await,
            None => Ok(None),
        }
    }

    fn enqueue_notification(&self, notification: Notification) -> Result<()> {
        let job_id = format!("notify:{}:{}", notification.kind(), Uuid::new_v4());
        self.queues.enqueue(
            QueueName::Notifications,
            job_id,
            JobPayload::Notify { notification },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_crossing_window() {
        // The trigger condition itself: pre below, post at-or-above
        let crossed = |pre: i32, post: i32, threshold: i32| pre < threshold && post >= threshold;
        assert!(crossed(75, 80, 80));
        assert!(crossed(0, 120, 80));
        assert!(!crossed(80, 95, 80));
        assert!(!crossed(85, 70, 80));
    }
}
