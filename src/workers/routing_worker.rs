//! Routing worker: consumes coalesced per-lead routing evaluations

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::error::{LeadflowError, Result};
use crate::queue::{Job, JobHandler, JobOutcome, JobPayload};
use crate::routing::{PipelineRouter, RoutingAction};

pub struct RoutingWorker {
    router: Arc<PipelineRouter>,
}

impl RoutingWorker {
    pub fn new(router: Arc<PipelineRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl JobHandler for RoutingWorker {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        let JobPayload::EvaluateRouting { lead_id, trigger } = &job.payload else {
            return Err(LeadflowError::Internal(format!(
                "routing queue received unexpected payload: {:?}",
                job.payload
            )));
        };

        let result = self.router.evaluate_and_route(*lead_id, Utc::now()).await?;
        info!(
            lead = %lead_id,
            trigger = ?trigger,
            action = ?result.action,
            reason = result.reason,
            "routing evaluated"
        );

        match result.action {
            RoutingAction::Routed | RoutingAction::ManualReview => Ok(JobOutcome::Done),
            RoutingAction::Skip | RoutingAction::Wait => Ok(JobOutcome::Skipped(result.reason)),
        }
    }
}
