use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::event::{partition_bounds, partition_suffix};
use crate::domain::{EventCategory, MarketingEvent, ScoreCategory};
use crate::error::{LeadflowError, Result};

use super::PostgresStore;

fn event_from_row(row: &PgRow) -> Result<MarketingEvent> {
    let category: String = row.get("event_category");
    let score_category: Option<String> = row.get("score_category");
    let metadata: serde_json::Value = row.get("metadata");

    Ok(MarketingEvent {
        id: row.get("id"),
        lead_id: row.get("lead_id"),
        event_type: row.get("event_type"),
        event_category: EventCategory::try_from(category.as_str())
            .map_err(LeadflowError::Internal)?,
        source: row.get("source"),
        occurred_at: row.get("occurred_at"),
        metadata: metadata.as_object().cloned().unwrap_or_default(),
        correlation_id: row.get("correlation_id"),
        campaign_id: row.get("campaign_id"),
        utm_source: row.get("utm_source"),
        utm_medium: row.get("utm_medium"),
        utm_campaign: row.get("utm_campaign"),
        score_points: row.get("score_points"),
        score_category: score_category
            .as_deref()
            .map(ScoreCategory::try_from)
            .transpose()
            .map_err(LeadflowError::Internal)?,
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
    })
}

impl PostgresStore {
    /// Create the monthly partition for an occurrence time if missing.
    /// IF NOT EXISTS makes the statement race-safe across workers.
    pub async fn ensure_event_partition(&self, occurred_at: DateTime<Utc>) -> Result<()> {
        let suffix = partition_suffix(occurred_at);
        let (start, end) = partition_bounds(occurred_at);
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS events_{suffix} PARTITION OF events \
             FOR VALUES FROM ('{}') TO ('{}')",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
        );
        sqlx::query(&statement).execute(self.pool()).await?;
        Ok(())
    }

    /// Insert one immutable event row into its monthly partition
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_event(
        &self,
        lead_id: Uuid,
        event_type: &str,
        event_category: EventCategory,
        source: &str,
        occurred_at: DateTime<Utc>,
        metadata: &serde_json::Map<String, serde_json::Value>,
        correlation_id: Option<&str>,
        campaign_id: Option<&str>,
        utm_source: Option<&str>,
        utm_medium: Option<&str>,
        utm_campaign: Option<&str>,
    ) -> Result<MarketingEvent> {
        self.ensure_event_partition(occurred_at).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO events (
                lead_id, event_type, event_category, source, occurred_at, metadata,
                correlation_id, campaign_id, utm_source, utm_medium, utm_campaign
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, lead_id, event_type, event_category, source, occurred_at,
                      metadata, correlation_id, campaign_id, utm_source, utm_medium,
                      utm_campaign, score_points, score_category, processed_at, created_at
            "#,
        )
        .bind(lead_id)
        .bind(event_type)
        .bind(event_category.as_str())
        .bind(source)
        .bind(occurred_at)
        .bind(serde_json::Value::Object(metadata.clone()))
        .bind(correlation_id)
        .bind(campaign_id)
        .bind(utm_source)
        .bind(utm_medium)
        .bind(utm_campaign)
        .fetch_one(self.pool())
        .await?;

        event_from_row(&row)
    }

    /// Idempotency lookup: the event already stored under this
    /// correlation id for this lead, if any. A processed hit means the
    /// delivery is a duplicate; an unprocessed hit is a retry to resume.
    pub async fn find_event_by_correlation(
        &self,
        lead_id: Uuid,
        correlation_id: &str,
    ) -> Result<Option<MarketingEvent>> {
        let row = sqlx::query(
            r#"
            SELECT id, lead_id, event_type, event_category, source, occurred_at,
                   metadata, correlation_id, campaign_id, utm_source, utm_medium,
                   utm_campaign, score_points, score_category, processed_at, created_at
            FROM events
            WHERE lead_id = $1 AND correlation_id = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(lead_id)
        .bind(correlation_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    /// Whether a rule already wrote a ledger row for this event (makes
    /// scoring idempotent across job retries)
    pub async fn rule_applied_for_event(&self, event_id: Uuid, rule_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM score_history WHERE event_id = $1 AND rule_id = $2) AS seen",
        )
        .bind(event_id)
        .bind(rule_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("seen"))
    }

    /// Stamp post-processing annotations. The event itself is immutable;
    /// only the annotation columns are written, exactly once.
    pub async fn mark_event_processed(
        &self,
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        score_points: i32,
        score_category: Option<ScoreCategory>,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE events SET score_points = $3, score_category = $4, processed_at = $5 \
             WHERE id = $1 AND occurred_at = $2 AND processed_at IS NULL",
        )
        .bind(event_id)
        .bind(occurred_at)
        .bind(score_points)
        .bind(score_category.map(|c| c.as_str()))
        .bind(processed_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_lead_events(&self, lead_id: Uuid, limit: i64) -> Result<Vec<MarketingEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, lead_id, event_type, event_category, source, occurred_at,
                   metadata, correlation_id, campaign_id, utm_source, utm_medium,
                   utm_campaign, score_points, score_category, processed_at, created_at
            FROM events
            WHERE lead_id = $1
            ORDER BY occurred_at DESC
            LIMIT $2
            "#,
        )
        .bind(lead_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Top lead sources by event count over a window (digest)
    pub async fn top_sources_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT source, COUNT(*) AS count
            FROM events
            WHERE occurred_at >= $1
            GROUP BY source
            ORDER BY count DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("source"), r.get("count")))
            .collect())
    }
}
