//! Event worker
//!
//! Per job: resolve identity, dedupe by correlation id, store the event,
//! update attribution, run scoring, intent and automation, then enqueue a
//! routing evaluation. Each step commits independently; a failure after
//! the event insert retries the job, and every engine re-entry is
//! idempotent, so a retry resumes rather than double-applies.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::automation::{AutomationEngine, EventSnapshot};
use crate::domain::{IngestEvent, MarketingEvent, ScoreTier};
use crate::error::{LeadflowError, Result};
use crate::identity::IdentityResolver;
use crate::intent::IntentDetector;
use crate::outbound::Notification;
use crate::queue::{Job, JobHandler, JobOutcome, JobPayload, JobQueues, QueueName, RoutingTrigger};
use crate::scoring::ScoringEngine;
use crate::store::PostgresStore;

pub struct EventWorker {
    store: Arc<PostgresStore>,
    resolver: IdentityResolver,
    scoring: Arc<ScoringEngine>,
    intent: Arc<IntentDetector>,
    automation: Arc<AutomationEngine>,
    queues: JobQueues,
}

impl EventWorker {
    pub fn new(
        store: Arc<PostgresStore>,
        scoring: Arc<ScoringEngine>,
        intent: Arc<IntentDetector>,
        automation: Arc<AutomationEngine>,
        queues: JobQueues,
    ) -> Self {
        Self {
            resolver: IdentityResolver::new(store.clone()),
            store,
            scoring,
            intent,
            automation,
            queues,
        }
    }

    async fn process(&self, ingest: &IngestEvent, batch_id: Option<Uuid>) -> Result<JobOutcome> {
        ingest.validate()?;

        // 1. Identity
        let resolved = self.resolver.resolve(ingest).await?;
        let lead_id = resolved.lead.id;

        // 2. Idempotency: processed hit = duplicate, unprocessed = resume
        let stored = match &ingest.correlation_id {
            Some(correlation_id) => {
                match self
                    .store
                    .find_event_by_correlation(lead_id, correlation_id)
                    .await?
                {
                    Some(event) if event.processed_at.is_some() => {
                        debug!(lead = %lead_id, correlation_id, "duplicate event skipped");
                        return Ok(JobOutcome::Skipped("duplicate_skipped"));
                    }
                    Some(event) => Some(event),
                    None => None,
                }
            }
            None => None,
        };

        // 3. Event row (unless resuming a stored one)
        let event: MarketingEvent = match stored {
            Some(event) => event,
            None => {
                self.store
                    .insert_event(
                        lead_id,
                        &ingest.event_type,
                        ingest.category(),
                        &ingest.source,
                        ingest.occurred_at,
                        &ingest.metadata,
                        ingest.correlation_id.as_deref(),
                        ingest.campaign_id.as_deref(),
                        ingest.utm_source.as_deref(),
                        ingest.utm_medium.as_deref(),
                        ingest.utm_campaign.as_deref(),
                    )
                    .await?
            }
        };

        // 4. Attribution and consent
        self.store
            .update_attribution(
                lead_id,
                &event.source,
                event.campaign_id.as_deref(),
                event.occurred_at,
            )
            .await?;
        self.record_consent(&event).await?;

        // Fresh read: attribution/coalesced identifiers included
        let lead = self.store.get_lead(lead_id).await?;
        let organization = self.store.organization_for_lead(lead_id).await?;

        // 5. Scoring
        let now = Utc::now();
        let scoring = self
            .scoring
            .process_event(&event, &lead, organization.as_ref(), now)
            .await?;

        // 6. Intent
        let intent = self
            .intent
            .process_event(&event, &lead, organization.as_ref())
            .await?;

        // 7. Automation with the post-scoring snapshot
        let post_lead = self.store.get_lead(lead_id).await?;
        let snapshot = EventSnapshot {
            pre_total: scoring.pre_scores.total(),
            post_total: scoring.new_scores.total(),
            intent_confidence: intent.calc.confidence,
            primary_intent: intent.calc.primary,
        };
        self.automation
            .process_event(&event, &post_lead, organization.as_ref(), snapshot, now)
            .await?;

        // Hot-lead path: forwarded tier crossings at 80 and above
        if matches!(scoring.tier_crossed, Some(ScoreTier::Hot | ScoreTier::VeryHot)) {
            self.enqueue_notification(Notification::HotLead {
                lead_id,
                name: post_lead.display_name(),
                email: post_lead.email.clone(),
                total_score: scoring.new_scores.total(),
                primary_intent: intent.calc.primary.map(|i| i.as_str().to_string()),
                confidence: intent.calc.confidence,
                job_title: post_lead.job_title.clone(),
            })?;
        }

        // 8. Routing evaluation, coalesced per lead by job id
        self.queues.enqueue(
            QueueName::Routing,
            Job::routing_job_id(lead_id),
            JobPayload::EvaluateRouting {
                lead_id,
                trigger: RoutingTrigger::EventProcessed,
            },
        )?;

        // 9. Close out the event
        self.store
            .set_last_activity(lead_id, event.occurred_at)
            .await?;
        self.store
            .mark_event_processed(
                event.id,
                event.occurred_at,
                scoring.points_added,
                scoring.annotated_category,
                now,
            )
            .await?;

        info!(
            lead = %lead_id,
            event = %event.id,
            event_type = %event.event_type,
            batch = ?batch_id,
            created = resolved.created,
            points = scoring.points_added,
            signals = intent.signals_added,
            "event processed"
        );
        Ok(JobOutcome::Done)
    }

    async fn record_consent(&self, event: &MarketingEvent) -> Result<()> {
        let consented = event
            .metadata_value("gdpr_consent")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if consented {
            let source = event
                .metadata_value("gdpr_consent_source")
                .and_then(|v| v.as_str())
                .unwrap_or(&event.source)
                .to_string();
            self.store
                .set_gdpr_consent(event.lead_id, event.occurred_at, &source)
                .await?;
        }
        Ok(())
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

#[async_trait]
impl JobHandler for EventWorker {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        match &job.payload {
            JobPayload::ProcessEvent { event, batch_id } => self.process(event, *batch_id).await,
            other => Err(LeadflowError::Internal(format!(
                "events queue received unexpected payload: {other:?}"
            ))),
        }
    }
}
