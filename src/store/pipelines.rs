use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{Deal, DealStatus, Pipeline, PipelineStage, Role, StageType};
use crate::error::{LeadflowError, Result};

use super::PostgresStore;

fn pipeline_from_row(row: &PgRow) -> Pipeline {
    Pipeline {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        sales_cycle_days: row.get("sales_cycle_days"),
        is_default: row.get("is_default"),
        created_at: row.get("created_at"),
    }
}

fn stage_from_row(row: &PgRow) -> Result<PipelineStage> {
    let stage_type: String = row.get("stage_type");
    Ok(PipelineStage {
        id: row.get("id"),
        pipeline_id: row.get("pipeline_id"),
        slug: row.get("slug"),
        name: row.get("name"),
        position: row.get("position"),
        stage_type: StageType::try_from(stage_type.as_str()).map_err(LeadflowError::Internal)?,
        automation_rule_ids: row.get("automation_rule_ids"),
    })
}

fn deal_from_row(row: &PgRow) -> Result<Deal> {
    let status: String = row.get("status");
    Ok(Deal {
        id: row.get("id"),
        lead_id: row.get("lead_id"),
        pipeline_id: row.get("pipeline_id"),
        stage_id: row.get("stage_id"),
        name: row.get("name"),
        value: row.get("value"),
        currency: row.get("currency"),
        status: DealStatus::try_from(status.as_str()).map_err(LeadflowError::Internal)?,
        stage_entered_at: row.get("stage_entered_at"),
        assigned_to: row.get("assigned_to"),
        assigned_region: row.get("assigned_region"),
        moco_offer_id: row.get("moco_offer_id"),
        moco_invoice_id: row.get("moco_invoice_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const DEAL_COLUMNS: &str = "id, lead_id, pipeline_id, stage_id, name, value, currency, status, \
     stage_entered_at, assigned_to, assigned_region, moco_offer_id, moco_invoice_id, \
     created_at, updated_at";

/// Result of the routing transaction
#[derive(Debug, Clone)]
pub struct RoutingOutcome {
    pub deal: Deal,
    pub deal_created: bool,
    pub assigned_to: Option<Uuid>,
}

impl PostgresStore {
    pub async fn get_pipeline_by_slug(&self, slug: &str) -> Result<Pipeline> {
        let row = sqlx::query(
            "SELECT id, slug, name, sales_cycle_days, is_default, created_at \
             FROM pipelines WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| LeadflowError::NotFound {
            entity: "pipeline",
            id: slug.to_string(),
        })?;
        Ok(pipeline_from_row(&row))
    }

    /// Entry stage (position 1) of a pipeline
    pub async fn get_first_stage(&self, pipeline_id: Uuid) -> Result<PipelineStage> {
        let row = sqlx::query(
            "SELECT id, pipeline_id, slug, name, position, stage_type, automation_rule_ids \
             FROM pipeline_stages WHERE pipeline_id = $1 ORDER BY position ASC LIMIT 1",
        )
        .bind(pipeline_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| LeadflowError::NotFound {
            entity: "pipeline_stage",
            id: format!("first stage of {pipeline_id}"),
        })?;
        stage_from_row(&row)
    }

    pub async fn get_stage_by_slug(&self, pipeline_id: Uuid, slug: &str) -> Result<PipelineStage> {
        let row = sqlx::query(
            "SELECT id, pipeline_id, slug, name, position, stage_type, automation_rule_ids \
             FROM pipeline_stages WHERE pipeline_id = $1 AND slug = $2",
        )
        .bind(pipeline_id)
        .bind(slug)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| LeadflowError::NotFound {
            entity: "pipeline_stage",
            id: slug.to_string(),
        })?;
        stage_from_row(&row)
    }

    pub async fn get_deal(&self, id: Uuid) -> Result<Deal> {
        let query = format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "deal",
                id: id.to_string(),
            })?;
        deal_from_row(&row)
    }

    pub async fn get_deal_for_lead(&self, lead_id: Uuid, pipeline_id: Uuid) -> Result<Option<Deal>> {
        let query =
            format!("SELECT {DEAL_COLUMNS} FROM deals WHERE lead_id = $1 AND pipeline_id = $2");
        let row = sqlx::query(&query)
            .bind(lead_id)
            .bind(pipeline_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(deal_from_row).transpose()
    }

    /// Routing side effects in one transaction: deal upsert, lead routing
    /// fields, owner pick and conditional capacity increment. The
    /// conditional `current_leads < max_leads` update makes over-assignment
    /// impossible; the increment happens only when the deal was created.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_routing(
        &self,
        lead_id: Uuid,
        pipeline_id: Uuid,
        stage_id: Uuid,
        deal_name: &str,
        assignee_role: Option<Role>,
        desired_region: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RoutingOutcome> {
        let mut tx = self.pool().begin().await?;

        let insert_query = format!(
            "INSERT INTO deals (lead_id, pipeline_id, stage_id, name, currency, status, stage_entered_at) \
             VALUES ($1, $2, $3, $4, 'EUR', 'open', $5) \
             ON CONFLICT (lead_id, pipeline_id) DO NOTHING \
             RETURNING {DEAL_COLUMNS}"
        );
        let inserted = sqlx::query(&insert_query)
            .bind(lead_id)
            .bind(pipeline_id)
            .bind(stage_id)
            .bind(deal_name)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        let deal_created = inserted.is_some();

        let mut deal = match inserted {
            Some(row) => deal_from_row(&row)?,
            None => {
                let query = format!(
                    "SELECT {DEAL_COLUMNS} FROM deals WHERE lead_id = $1 AND pipeline_id = $2"
                );
                let row = sqlx::query(&query)
                    .bind(lead_id)
                    .bind(pipeline_id)
                    .fetch_one(&mut *tx)
                    .await?;
                deal_from_row(&row)?
            }
        };

        sqlx::query(
            "UPDATE leads SET pipeline_id = $2, routing_status = 'routed', routed_at = $3, \
             updated_at = now() WHERE id = $1",
        )
        .bind(lead_id)
        .bind(pipeline_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Owner increment only for a freshly created deal (idempotent re-runs)
        let mut assigned_to = deal.assigned_to;
        if deal_created {
            if let Some(role) = assignee_role {
                let candidate = sqlx::query(
                    r#"
                    SELECT id, region FROM team_members
                    WHERE role = $1
                      AND is_active
                      AND current_leads < max_leads
                      AND ($2::TEXT IS NULL OR region IS NULL OR region = $2)
                    ORDER BY current_leads ASC, last_assigned_at ASC NULLS FIRST
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                    "#,
                )
                .bind(role.as_str())
                .bind(desired_region)
                .fetch_optional(&mut *tx)
                .await?;

                if let Some(row) = candidate {
                    let member_id: Uuid = row.get("id");
                    let member_region: Option<String> = row.get("region");
                    let updated = sqlx::query(
                        "UPDATE team_members SET current_leads = current_leads + 1, \
                         last_assigned_at = $2 WHERE id = $1 AND current_leads < max_leads",
                    )
                    .bind(member_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;

                    if updated.rows_affected() == 1 {
                        sqlx::query(
                            "UPDATE deals SET assigned_to = $2, assigned_region = $3, \
                             updated_at = now() WHERE id = $1",
                        )
                        .bind(deal.id)
                        .bind(member_id)
                        .bind(&member_region)
                        .execute(&mut *tx)
                        .await?;
                        assigned_to = Some(member_id);
                        deal.assigned_region = member_region;
                    }
                }
            }
        }

        tx.commit().await?;
        deal.assigned_to = assigned_to;

        Ok(RoutingOutcome {
            deal,
            deal_created,
            assigned_to,
        })
    }

    /// Direct owner write used by automation's assign_owner action
    pub async fn assign_deal(
        &self,
        deal_id: Uuid,
        member_id: Uuid,
        region: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE deals SET assigned_to = $2, assigned_region = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(deal_id)
        .bind(member_id)
        .bind(region)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn update_deal_stage(
        &self,
        deal_id: Uuid,
        stage_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE deals SET stage_id = $2, stage_entered_at = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(deal_id)
        .bind(stage_id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_deal_moco_ids(
        &self,
        deal_id: Uuid,
        offer_id: Option<&str>,
        invoice_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE deals SET moco_offer_id = COALESCE($2, moco_offer_id), \
             moco_invoice_id = COALESCE($3, moco_invoice_id), updated_at = now() WHERE id = $1",
        )
        .bind(deal_id)
        .bind(offer_id)
        .bind(invoice_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Open deals sitting in a stage since before the cutoff (daily sweep)
    pub async fn deals_in_stage_since(
        &self,
        stage_id: Uuid,
        entered_before: DateTime<Utc>,
    ) -> Result<Vec<Deal>> {
        let query = format!(
            "SELECT {DEAL_COLUMNS} FROM deals \
             WHERE stage_id = $1 AND status = 'open' AND stage_entered_at < $2"
        );
        let rows = sqlx::query(&query)
            .bind(stage_id)
            .bind(entered_before)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(deal_from_row).collect()
    }

    pub async fn count_deals_created_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM deals WHERE created_at >= $1")
            .bind(since)
            .fetch_one(self.pool())
            .await?;
        Ok(row.get("count"))
    }

    pub async fn count_deals_won_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM deals WHERE status = 'won' AND updated_at >= $1",
        )
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("count"))
    }

    /// Sum of open deal values across all pipelines (digest)
    pub async fn open_pipeline_value(&self) -> Result<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(value), 0) AS total FROM deals WHERE status = 'open'",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("total"))
    }
}
