use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::lead::Attribution;
use crate::domain::{
    Intent, IntentSummary, Lead, LeadStatus, LifecycleStage, RoutingStatus, Scores,
};
use crate::error::{LeadflowError, Result};

use super::PostgresStore;

const LEAD_COLUMNS: &str = "id, email, placeholder_email, portal_id, linkedin_url, waalaxy_id, \
     lemlist_id, first_name, last_name, phone, job_title, organization_id, status, \
     lifecycle_stage, demographic_score, engagement_score, behavior_score, pipeline_id, \
     routing_status, routed_at, primary_intent, intent_confidence, intent_summary, \
     first_touch_source, first_touch_campaign, first_touch_date, last_touch_source, \
     last_touch_campaign, last_touch_date, gdpr_consent_at, gdpr_consent_source, \
     deletion_requested_at, created_at, updated_at, last_activity_at";

/// Fields needed to create a lead on first contact
#[derive(Debug, Clone)]
pub struct NewLead {
    pub email: String,
    pub placeholder_email: bool,
    pub portal_id: Option<String>,
    pub linkedin_url: Option<String>,
    pub waalaxy_id: Option<String>,
    pub lemlist_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub first_touch_source: Option<String>,
    pub first_touch_campaign: Option<String>,
    pub first_touch_date: Option<DateTime<Utc>>,
}

pub(crate) fn lead_from_row(row: &PgRow) -> Result<Lead> {
    let status: String = row.get("status");
    let lifecycle: String = row.get("lifecycle_stage");
    let routing: String = row.get("routing_status");
    let primary_intent: Option<String> = row.get("primary_intent");
    let summary_raw: serde_json::Value = row.get("intent_summary");
    let intent_summary: IntentSummary =
        serde_json::from_value(summary_raw).unwrap_or_default();

    Ok(Lead {
        id: row.get("id"),
        email: row.get("email"),
        placeholder_email: row.get("placeholder_email"),
        portal_id: row.get("portal_id"),
        linkedin_url: row.get("linkedin_url"),
        waalaxy_id: row.get("waalaxy_id"),
        lemlist_id: row.get("lemlist_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone: row.get("phone"),
        job_title: row.get("job_title"),
        organization_id: row.get("organization_id"),
        status: LeadStatus::try_from(status.as_str()).map_err(LeadflowError::Internal)?,
        lifecycle_stage: LifecycleStage::try_from(lifecycle.as_str())
            .map_err(LeadflowError::Internal)?,
        scores: Scores {
            demographic: row.get("demographic_score"),
            engagement: row.get("engagement_score"),
            behavior: row.get("behavior_score"),
        },
        pipeline_id: row.get("pipeline_id"),
        routing_status: RoutingStatus::try_from(routing.as_str())
            .map_err(LeadflowError::Internal)?,
        routed_at: row.get("routed_at"),
        primary_intent: primary_intent
            .as_deref()
            .map(Intent::try_from)
            .transpose()
            .map_err(LeadflowError::Internal)?,
        intent_confidence: row.get("intent_confidence"),
        intent_summary,
        attribution: Attribution {
            first_touch_source: row.get("first_touch_source"),
            first_touch_campaign: row.get("first_touch_campaign"),
            first_touch_date: row.get("first_touch_date"),
            last_touch_source: row.get("last_touch_source"),
            last_touch_campaign: row.get("last_touch_campaign"),
            last_touch_date: row.get("last_touch_date"),
        },
        gdpr_consent_at: row.get("gdpr_consent_at"),
        gdpr_consent_source: row.get("gdpr_consent_source"),
        deletion_requested_at: row.get("deletion_requested_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_activity_at: row.get("last_activity_at"),
    })
}

impl PostgresStore {
    pub async fn get_lead(&self, id: Uuid) -> Result<Lead> {
        let query = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "lead",
                id: id.to_string(),
            })?;
        lead_from_row(&row)
    }

    pub async fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>> {
        let query = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE lower(email) = lower($1)");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(lead_from_row).transpose()
    }

    /// Lookup by one external identifier column (exact match)
    pub async fn find_lead_by_external_id(
        &self,
        column: ExternalIdColumn,
        value: &str,
    ) -> Result<Option<Lead>> {
        let query = match column {
            ExternalIdColumn::PortalId => {
                format!("SELECT {LEAD_COLUMNS} FROM leads WHERE portal_id = $1")
            }
            ExternalIdColumn::WaalaxyId => {
                format!("SELECT {LEAD_COLUMNS} FROM leads WHERE waalaxy_id = $1")
            }
            ExternalIdColumn::LinkedinUrl => {
                format!("SELECT {LEAD_COLUMNS} FROM leads WHERE lower(linkedin_url) = lower($1)")
            }
            ExternalIdColumn::LemlistId => {
                format!("SELECT {LEAD_COLUMNS} FROM leads WHERE lemlist_id = $1")
            }
        };
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(lead_from_row).transpose()
    }

    /// Insert a lead; unique violations surface as `Conflict` so the
    /// resolver can retry its lookup.
    pub async fn insert_lead(&self, new: &NewLead) -> Result<Lead> {
        let query = format!(
            "INSERT INTO leads (email, placeholder_email, portal_id, linkedin_url, waalaxy_id, \
                 lemlist_id, first_name, last_name, job_title, first_touch_source, \
                 first_touch_campaign, first_touch_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {LEAD_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(&new.email)
            .bind(new.placeholder_email)
            .bind(&new.portal_id)
            .bind(&new.linkedin_url)
            .bind(&new.waalaxy_id)
            .bind(&new.lemlist_id)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.job_title)
            .bind(&new.first_touch_source)
            .bind(&new.first_touch_campaign)
            .bind(new.first_touch_date)
            .fetch_one(self.pool())
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                    LeadflowError::Conflict(format!("lead identifier already taken: {db}"))
                }
                _ => LeadflowError::Database(e),
            })?;
        lead_from_row(&row)
    }

    /// Fill missing identifiers with COALESCE semantics; a set identifier
    /// is never overwritten.
    pub async fn coalesce_lead_identifiers(
        &self,
        lead_id: Uuid,
        portal_id: Option<&str>,
        linkedin_url: Option<&str>,
        waalaxy_id: Option<&str>,
        lemlist_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE leads SET
                portal_id = COALESCE(portal_id, $2),
                linkedin_url = COALESCE(linkedin_url, $3),
                waalaxy_id = COALESCE(waalaxy_id, $4),
                lemlist_id = COALESCE(lemlist_id, $5),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .bind(portal_id)
        .bind(linkedin_url)
        .bind(waalaxy_id)
        .bind(lemlist_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Monotonic counter for synthesized placeholder emails
    pub async fn next_placeholder_seq(&self) -> Result<i64> {
        let row = sqlx::query("SELECT nextval('placeholder_email_seq') AS seq")
            .fetch_one(self.pool())
            .await?;
        Ok(row.get("seq"))
    }

    /// Last-touch always; first-touch only when currently null
    pub async fn update_attribution(
        &self,
        lead_id: Uuid,
        source: &str,
        campaign: Option<&str>,
        occurred_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE leads SET
                first_touch_source = COALESCE(first_touch_source, $2),
                first_touch_campaign = COALESCE(first_touch_campaign, $3),
                first_touch_date = COALESCE(first_touch_date, $4),
                last_touch_source = $2,
                last_touch_campaign = $3,
                last_touch_date = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .bind(source)
        .bind(campaign)
        .bind(occurred_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// GDPR consent carried in event metadata by consent-aware producers
    pub async fn set_gdpr_consent(
        &self,
        lead_id: Uuid,
        at: DateTime<Utc>,
        source: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE leads SET gdpr_consent_at = COALESCE(gdpr_consent_at, $2), \
             gdpr_consent_source = COALESCE(gdpr_consent_source, $3), updated_at = now() \
             WHERE id = $1",
        )
        .bind(lead_id)
        .bind(at)
        .bind(source)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_last_activity(&self, lead_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE leads SET last_activity_at = GREATEST(COALESCE(last_activity_at, $2), $2), \
             updated_at = now() WHERE id = $1",
        )
        .bind(lead_id)
        .bind(at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Write the recomputed denormalized category scores
    pub async fn update_lead_scores(&self, lead_id: Uuid, scores: &Scores) -> Result<()> {
        sqlx::query(
            "UPDATE leads SET demographic_score = $2, engagement_score = $3, \
             behavior_score = $4, updated_at = now() WHERE id = $1",
        )
        .bind(lead_id)
        .bind(scores.demographic.max(0))
        .bind(scores.engagement.max(0))
        .bind(scores.behavior.max(0))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn update_lifecycle_stage(&self, lead_id: Uuid, stage: LifecycleStage) -> Result<()> {
        sqlx::query("UPDATE leads SET lifecycle_stage = $2, updated_at = now() WHERE id = $1")
            .bind(lead_id)
            .bind(stage.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_lead_intent(
        &self,
        lead_id: Uuid,
        primary: Option<Intent>,
        confidence: i32,
        summary: &IntentSummary,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE leads SET primary_intent = $2, intent_confidence = $3, \
             intent_summary = $4, updated_at = now() WHERE id = $1",
        )
        .bind(lead_id)
        .bind(primary.map(|i| i.as_str()))
        .bind(confidence)
        .bind(serde_json::to_value(summary)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_routing_status(&self, lead_id: Uuid, status: RoutingStatus) -> Result<()> {
        sqlx::query("UPDATE leads SET routing_status = $2, updated_at = now() WHERE id = $1")
            .bind(lead_id)
            .bind(status.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Place a lead in a pipeline without a deal (automation's
    /// route_to_pipeline with create_deal = false). Routing status stays
    /// manual_review until a deal and owner exist.
    pub async fn set_lead_pipeline(&self, lead_id: Uuid, pipeline_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE leads SET pipeline_id = $2, routing_status = 'manual_review', \
             updated_at = now() WHERE id = $1",
        )
        .bind(lead_id)
        .bind(pipeline_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Allow-listed field update used by the automation engine
    pub async fn update_lead_field(
        &self,
        lead_id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<()> {
        // Validate through the domain enums before touching SQL
        let query = match field {
            "status" => {
                LeadStatus::try_from(value).map_err(LeadflowError::Validation)?;
                "UPDATE leads SET status = $2, updated_at = now() WHERE id = $1"
            }
            "lifecycle_stage" => {
                LifecycleStage::try_from(value).map_err(LeadflowError::Validation)?;
                "UPDATE leads SET lifecycle_stage = $2, updated_at = now() WHERE id = $1"
            }
            "primary_intent" => {
                Intent::try_from(value).map_err(LeadflowError::Validation)?;
                "UPDATE leads SET primary_intent = $2, updated_at = now() WHERE id = $1"
            }
            other => {
                return Err(LeadflowError::Validation(format!(
                    "field not updatable by automation: {other}"
                )))
            }
        };
        sqlx::query(query)
            .bind(lead_id)
            .bind(value)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_leads(&self, limit: i64, offset: i64) -> Result<Vec<Lead>> {
        let query = format!(
            "SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(lead_from_row).collect()
    }

    /// Global Pool projection for the admin surface
    pub async fn list_unrouted_leads(&self, limit: i64) -> Result<Vec<Lead>> {
        let query = format!(
            "SELECT {LEAD_COLUMNS} FROM leads \
             WHERE pipeline_id IS NULL AND deletion_requested_at IS NULL \
             ORDER BY total_score DESC, created_at ASC LIMIT $1"
        );
        let rows = sqlx::query(&query).bind(limit).fetch_all(self.pool()).await?;
        rows.iter().map(lead_from_row).collect()
    }

    pub async fn count_leads_created_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM leads WHERE created_at >= $1")
            .bind(since)
            .fetch_one(self.pool())
            .await?;
        Ok(row.get("count"))
    }

    pub async fn count_hot_leads(&self) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM leads \
             WHERE total_score >= 80 AND deletion_requested_at IS NULL",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("count"))
    }
}

/// External identifier columns addressable by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalIdColumn {
    PortalId,
    WaalaxyId,
    LinkedinUrl,
    LemlistId,
}
