//! Sync worker: outbound Moco synchronization
//!
//! Low concurrency and rate cap to respect the finance API quota. The
//! pipeline never depends on these calls for correctness; permanent
//! rejections park the job and alert the operators.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::FeatureFlags;
use crate::domain::rules::MocoAction;
use crate::error::{LeadflowError, Result};
use crate::outbound::{MocoClient, Notification};
use crate::queue::{Job, JobHandler, JobOutcome, JobPayload, JobQueues, QueueName};
use crate::store::PostgresStore;

pub struct SyncWorker {
    store: Arc<PostgresStore>,
    moco: Arc<MocoClient>,
    queues: JobQueues,
    features: FeatureFlags,
}

impl SyncWorker {
    pub fn new(
        store: Arc<PostgresStore>,
        moco: Arc<MocoClient>,
        queues: JobQueues,
        features: FeatureFlags,
    ) -> Self {
        Self {
            store,
            moco,
            queues,
            features,
        }
    }

    async fn sync(
        &self,
        lead_id: Uuid,
        deal_id: Option<Uuid>,
        action: MocoAction,
    ) -> Result<JobOutcome> {
        if !self.features.moco_sync || !self.moco.is_enabled() {
            return Ok(JobOutcome::Skipped("moco_disabled"));
        }

        let lead = self.store.get_lead(lead_id).await?;
        let organization = self.store.organization_for_lead(lead_id).await?;

        match action {
            MocoAction::CreateCustomer => {
                let (name, country) = match &organization {
                    Some(org) => {
                        if org.moco_customer_id.is_some() {
                            return Ok(JobOutcome::Skipped("customer_already_synced"));
                        }
                        (org.name.clone(), org.country.clone())
                    }
                    None => (lead.display_name(), None),
                };
                let customer_id = self.moco.create_customer(&name, country.as_deref()).await?;
                if let Some(org) = &organization {
                    self.store
                        .set_organization_moco_id(org.id, &customer_id)
                        .await?;
                }
                info!(lead = %lead_id, customer = %customer_id, "moco customer synced");
            }
            MocoAction::CreateOffer => {
                let deal_id = deal_id.ok_or_else(|| {
                    LeadflowError::Validation("create_offer requires a deal".to_string())
                })?;
                let deal = self.store.get_deal(deal_id).await?;
                let customer_id = organization
                    .as_ref()
                    .and_then(|o| o.moco_customer_id.clone())
                    .ok_or_else(|| LeadflowError::Validation(
                        "create_offer requires a synced customer".to_string(),
                    ))?;
                let offer_id = self
                    .moco
                    .create_offer(&customer_id, &deal.name, deal.value)
                    .await?;
                self.store
                    .set_deal_moco_ids(deal.id, Some(&offer_id), None)
                    .await?;
                info!(deal = %deal.id, offer = %offer_id, "moco offer synced");
            }
            MocoAction::CreateInvoice => {
                let deal_id = deal_id.ok_or_else(|| {
                    LeadflowError::Validation("create_invoice requires a deal".to_string())
                })?;
                let deal = self.store.get_deal(deal_id).await?;
                let offer_id = deal.moco_offer_id.clone().ok_or_else(|| {
                    LeadflowError::Validation("create_invoice requires a synced offer".to_string())
                })?;
                let invoice_id = self.moco.create_invoice_from_offer(&offer_id).await?;
                self.store
                    .set_deal_moco_ids(deal.id, None, Some(&invoice_id))
                    .await?;
                info!(deal = %deal.id, invoice = %invoice_id, "moco invoice synced");
            }
        }

        Ok(JobOutcome::Done)
    }
}

#[async_trait]
impl JobHandler for SyncWorker {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        let JobPayload::SyncMoco {
            lead_id,
            deal_id,
            action,
        } = &job.payload
        else {
            return Err(LeadflowError::Internal(format!(
                "sync queue received unexpected payload: {:?}",
                job.payload
            )));
        };

        match self.sync(*lead_id, *deal_id, *action).await {
            Ok(outcome) => Ok(outcome),
            Err(err @ LeadflowError::DownstreamRejected { .. }) => {
                // Permanent rejection: alert operators, do not retry
                warn!(job = %job.id, error = %err, "moco permanently rejected sync");
                let _ = self.queues.enqueue(
                    QueueName::Notifications,
                    format!("notify:job_failed:{}", job.id),
                    JobPayload::Notify {
                        notification: Notification::JobFailed {
                            queue: "sync".to_string(),
                            job_id: job.id.clone(),
                            error: err.to_string(),
                        },
                    },
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}
