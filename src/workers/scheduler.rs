//! Cron-style producers and the scheduled-queue worker
//!
//! The scheduler ticks once a minute and enqueues the daily jobs at their
//! configured local hours: score decay (plus the time-in-stage sweep) and
//! the daily digest. Date-stamped job ids make double-enqueue impossible.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::automation::AutomationEngine;
use crate::config::{FeatureFlags, ScheduleConfig};
use crate::error::{LeadflowError, Result};
use crate::outbound::Notification;
use crate::queue::{Job, JobHandler, JobOutcome, JobPayload, JobQueues, QueueName, ScheduledJob};
use crate::scoring::ScoringEngine;
use crate::store::PostgresStore;

/// Daily score expiry sweep
pub struct DecayJob {
    store: Arc<PostgresStore>,
    scoring: Arc<ScoringEngine>,
}

#[derive(Debug, Clone, Copy)]
pub struct DecayOutcome {
    pub expired_count: u64,
    pub leads_updated: u64,
    pub execution_time_ms: u64,
}

impl DecayJob {
    pub fn new(store: Arc<PostgresStore>, scoring: Arc<ScoringEngine>) -> Self {
        Self { store, scoring }
    }

    /// Mark due ledger rows expired and recompute the denormalized
    /// category scores of every affected lead. Running twice in
    /// succession is a no-op the second time.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<DecayOutcome> {
        let started = Instant::now();
        let (expired_count, lead_ids) = self.store.expire_due_score_history(now).await?;

        let mut leads_updated = 0u64;
        for lead_id in &lead_ids {
            self.scoring.recompute_lead(*lead_id).await?;
            leads_updated += 1;
        }

        let outcome = DecayOutcome {
            expired_count,
            leads_updated,
            execution_time_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            expired = outcome.expired_count,
            leads = outcome.leads_updated,
            elapsed_ms = outcome.execution_time_ms,
            "score decay completed"
        );
        Ok(outcome)
    }
}

/// Daily digest aggregation over the last 24 hours
pub struct DigestJob {
    store: Arc<PostgresStore>,
}

impl DigestJob {
    pub fn new(store: Arc<PostgresStore>) -> Self {
        Self { store }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<Notification> {
        let since = now - chrono::Duration::hours(24);
        let new_leads = self.store.count_leads_created_since(since).await?;
        let hot_leads = self.store.count_hot_leads().await?;
        let deals_created = self.store.count_deals_created_since(since).await?;
        let deals_won = self.store.count_deals_won_since(since).await?;
        let open_value = self.store.open_pipeline_value().await?;
        let top_sources = self.store.top_sources_since(since, 5).await?;

        info!(
            new_leads,
            hot_leads, deals_created, deals_won, "daily digest aggregated"
        );
        Ok(Notification::DailyDigest {
            new_leads,
            hot_leads,
            deals_created,
            deals_won,
            open_pipeline_value: open_value.to_string(),
            top_sources,
        })
    }
}

/// Minute-tick producer enqueuing the daily jobs at their local hours
pub struct Scheduler {
    queues: JobQueues,
    config: ScheduleConfig,
    features: FeatureFlags,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        queues: JobQueues,
        config: ScheduleConfig,
        features: FeatureFlags,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queues,
            config,
            features,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        let mut last_decay: Option<NaiveDate> = None;
        let mut last_digest: Option<NaiveDate> = None;
        info!(
            decay_hour = self.config.decay_hour,
            digest_hour = self.config.digest_hour,
            "scheduler started"
        );

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("scheduler stopped");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    let local = Local::now();
                    let today = local.date_naive();
                    use chrono::Timelike;

                    if local.hour() == self.config.decay_hour && last_decay != Some(today) {
                        last_decay = Some(today);
                        if self.features.score_decay {
                            self.enqueue(ScheduledJob::ScoreDecay, today);
                        }
                        self.enqueue(ScheduledJob::TimeInStageSweep, today);
                    }
                    if local.hour() == self.config.digest_hour && last_digest != Some(today) {
                        last_digest = Some(today);
                        self.enqueue(ScheduledJob::DailyDigest, today);
                    }
                }
            }
        }
    }

    fn enqueue(&self, job: ScheduledJob, date: NaiveDate) {
        let job_id = format!("{:?}:{date}", job).to_lowercase();
        match self
            .queues
            .enqueue(QueueName::Scheduled, job_id, JobPayload::RunScheduled { job })
        {
            Ok(true) => info!(job = ?job, "scheduled job enqueued"),
            Ok(false) => {}
            Err(err) => warn!(job = ?job, error = %err, "failed to enqueue scheduled job"),
        }
    }
}

/// Consumer for the scheduled queue (concurrency 1)
pub struct ScheduledWorker {
    decay: DecayJob,
    digest: DigestJob,
    automation: Arc<AutomationEngine>,
    queues: JobQueues,
}

impl ScheduledWorker {
    pub fn new(
        decay: DecayJob,
        digest: DigestJob,
        automation: Arc<AutomationEngine>,
        queues: JobQueues,
    ) -> Self {
        Self {
            decay,
            digest,
            automation,
            queues,
        }
    }

    fn notify(&self, notification: Notification) {
        let job_id = format!("notify:{}:{}", notification.kind(), uuid::Uuid::new_v4());
        let _ = self.queues.enqueue(
            QueueName::Notifications,
            job_id,
            JobPayload::Notify { notification },
        );
    }
}

#[async_trait]
impl JobHandler for ScheduledWorker {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        let JobPayload::RunScheduled { job: scheduled } = &job.payload else {
            return Err(LeadflowError::Internal(format!(
                "scheduled queue received unexpected payload: {:?}",
                job.payload
            )));
        };

        let now = Utc::now();
        match scheduled {
            ScheduledJob::ScoreDecay => {
                let outcome = self.decay.run(now).await?;
                if outcome.expired_count > 0 {
                    self.notify(Notification::DecaySummary {
                        expired_count: outcome.expired_count,
                        leads_updated: outcome.leads_updated,
                        execution_time_ms: outcome.execution_time_ms,
                    });
                }
            }
            ScheduledJob::DailyDigest => {
                let digest = self.digest.run(now).await?;
                self.notify(digest);
            }
            ScheduledJob::TimeInStageSweep => {
                let fired = self.automation.run_time_in_stage_sweep(now).await?;
                info!(fired, "time-in-stage sweep completed");
            }
        }
        Ok(JobOutcome::Done)
    }
}
