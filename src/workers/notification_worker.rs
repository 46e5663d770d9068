//! Notification worker: drains the notifications queue into Slack

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::FeatureFlags;
use crate::error::{LeadflowError, Result};
use crate::outbound::SlackNotifier;
use crate::queue::{Job, JobHandler, JobOutcome, JobPayload};

pub struct NotificationWorker {
    slack: Arc<SlackNotifier>,
    features: FeatureFlags,
}

impl NotificationWorker {
    pub fn new(slack: Arc<SlackNotifier>, features: FeatureFlags) -> Self {
        Self { slack, features }
    }
}

#[async_trait]
impl JobHandler for NotificationWorker {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        let JobPayload::Notify { notification } = &job.payload else {
            return Err(LeadflowError::Internal(format!(
                "notifications queue received unexpected payload: {:?}",
                job.payload
            )));
        };

        if !self.features.slack_alerts {
            debug!(kind = notification.kind(), "slack alerts disabled");
            return Ok(JobOutcome::Skipped("slack_alerts_disabled"));
        }

        self.slack.send(notification).await?;
        Ok(JobOutcome::Done)
    }
}
