use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{RuleType, ScoreCategory, Scores, ScoringRule};
use crate::error::{LeadflowError, Result};

use super::PostgresStore;

/// Ledger row recording one rule application
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoreHistoryEntry {
    pub id: i64,
    pub lead_id: Uuid,
    pub event_id: Option<Uuid>,
    pub rule_id: Option<Uuid>,
    pub category: ScoreCategory,
    pub points_change: i32,
    pub new_total: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn rule_from_row(row: &PgRow) -> Result<ScoringRule> {
    let category: String = row.get("category");
    let rule_type: String = row.get("rule_type");
    let conditions: serde_json::Value = row.get("conditions");

    Ok(ScoringRule {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        category: ScoreCategory::try_from(category.as_str()).map_err(LeadflowError::Internal)?,
        rule_type: RuleType::try_from(rule_type.as_str()).map_err(LeadflowError::Internal)?,
        conditions: serde_json::from_value(conditions)?,
        points: row.get("points"),
        max_per_day: row.get("max_per_day"),
        max_per_lead: row.get("max_per_lead"),
        decay_days: row.get("decay_days"),
        priority: row.get("priority"),
        is_active: row.get("is_active"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn history_from_row(row: &PgRow) -> Result<ScoreHistoryEntry> {
    let category: String = row.get("category");
    Ok(ScoreHistoryEntry {
        id: row.get("id"),
        lead_id: row.get("lead_id"),
        event_id: row.get("event_id"),
        rule_id: row.get("rule_id"),
        category: ScoreCategory::try_from(category.as_str()).map_err(LeadflowError::Internal)?,
        points_change: row.get("points_change"),
        new_total: row.get("new_total"),
        expires_at: row.get("expires_at"),
        expired: row.get("expired"),
        expired_at: row.get("expired_at"),
        created_at: row.get("created_at"),
    })
}

const RULE_COLUMNS: &str = "id, slug, name, category, rule_type, conditions, points, \
     max_per_day, max_per_lead, decay_days, priority, is_active, version, created_at, updated_at";

impl PostgresStore {
    /// Active rules ordered by descending priority (evaluation order)
    pub async fn list_active_scoring_rules(&self) -> Result<Vec<ScoringRule>> {
        let query = format!(
            "SELECT {RULE_COLUMNS} FROM scoring_rules WHERE is_active \
             ORDER BY priority DESC, slug ASC"
        );
        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(rule_from_row).collect()
    }

    pub async fn list_scoring_rules(&self) -> Result<Vec<ScoringRule>> {
        let query =
            format!("SELECT {RULE_COLUMNS} FROM scoring_rules ORDER BY priority DESC, slug ASC");
        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(rule_from_row).collect()
    }

    pub async fn get_scoring_rule(&self, id: Uuid) -> Result<ScoringRule> {
        let query = format!("SELECT {RULE_COLUMNS} FROM scoring_rules WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "scoring_rule",
                id: id.to_string(),
            })?;
        rule_from_row(&row)
    }

    pub async fn create_scoring_rule(&self, rule: &ScoringRule) -> Result<ScoringRule> {
        let query = format!(
            "INSERT INTO scoring_rules (slug, name, category, rule_type, conditions, points, \
                 max_per_day, max_per_lead, decay_days, priority, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {RULE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(&rule.slug)
            .bind(&rule.name)
            .bind(rule.category.as_str())
            .bind(rule.rule_type.as_str())
            .bind(serde_json::to_value(&rule.conditions)?)
            .bind(rule.points)
            .bind(rule.max_per_day)
            .bind(rule.max_per_lead)
            .bind(rule.decay_days)
            .bind(rule.priority)
            .bind(rule.is_active)
            .fetch_one(self.pool())
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                    LeadflowError::Conflict(format!("scoring rule slug already exists: {}", rule.slug))
                }
                _ => LeadflowError::Database(e),
            })?;
        rule_from_row(&row)
    }

    /// Update bumps the version so historic ledger rows stay attributable
    pub async fn update_scoring_rule(&self, rule: &ScoringRule) -> Result<ScoringRule> {
        let query = format!(
            "UPDATE scoring_rules SET name = $2, category = $3, rule_type = $4, conditions = $5, \
                 points = $6, max_per_day = $7, max_per_lead = $8, decay_days = $9, \
                 priority = $10, is_active = $11, version = version + 1, updated_at = now() \
             WHERE id = $1 RETURNING {RULE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(rule.id)
            .bind(&rule.name)
            .bind(rule.category.as_str())
            .bind(rule.rule_type.as_str())
            .bind(serde_json::to_value(&rule.conditions)?)
            .bind(rule.points)
            .bind(rule.max_per_day)
            .bind(rule.max_per_lead)
            .bind(rule.decay_days)
            .bind(rule.priority)
            .bind(rule.is_active)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "scoring_rule",
                id: rule.id.to_string(),
            })?;
        rule_from_row(&row)
    }

    pub async fn delete_scoring_rule(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM scoring_rules WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(LeadflowError::NotFound {
                entity: "scoring_rule",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Hits for a (lead, rule) in the rolling 24h window ending at `now`
    pub async fn count_rule_hits_window(
        &self,
        lead_id: Uuid,
        rule_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM score_history \
             WHERE lead_id = $1 AND rule_id = $2 AND created_at > $3",
        )
        .bind(lead_id)
        .bind(rule_id)
        .bind(now - Duration::hours(24))
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("count"))
    }

    /// Lifetime hits for a (lead, rule)
    pub async fn count_rule_hits_total(&self, lead_id: Uuid, rule_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM score_history WHERE lead_id = $1 AND rule_id = $2",
        )
        .bind(lead_id)
        .bind(rule_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("count"))
    }

    /// Append one ledger row; `new_total` snapshots the category running sum
    #[allow(clippy::too_many_arguments)]
    pub async fn append_score_history(
        &self,
        lead_id: Uuid,
        event_id: Option<Uuid>,
        rule_id: Option<Uuid>,
        category: ScoreCategory,
        points_change: i32,
        new_total: i32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO score_history (lead_id, event_id, rule_id, category, points_change, new_total, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(lead_id)
        .bind(event_id)
        .bind(rule_id)
        .bind(category.as_str())
        .bind(points_change)
        .bind(new_total)
        .bind(expires_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("id"))
    }

    /// Authoritative per-category sums over non-expired ledger rows
    pub async fn live_category_sums(&self, lead_id: Uuid) -> Result<Scores> {
        let rows = sqlx::query(
            r#"
            SELECT category, COALESCE(SUM(points_change), 0)::BIGINT AS total
            FROM score_history
            WHERE lead_id = $1 AND NOT expired
            GROUP BY category
            "#,
        )
        .bind(lead_id)
        .fetch_all(self.pool())
        .await?;

        let mut scores = Scores::default();
        for row in rows {
            let category: String = row.get("category");
            let total: i64 = row.get("total");
            let category =
                ScoreCategory::try_from(category.as_str()).map_err(LeadflowError::Internal)?;
            // Raw ledger sum; the lead write path floors categories at zero
            scores.set(category, total.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
        }
        Ok(scores)
    }

    /// Expire due ledger rows. Returns the number of rows expired and the
    /// deduplicated set of affected lead ids.
    pub async fn expire_due_score_history(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(u64, Vec<Uuid>)> {
        let rows = sqlx::query(
            r#"
            UPDATE score_history
            SET expired = TRUE, expired_at = $1
            WHERE expires_at < $1 AND NOT expired
            RETURNING lead_id
            "#,
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        let expired = rows.len() as u64;
        let mut lead_ids: Vec<Uuid> = rows.iter().map(|r| r.get("lead_id")).collect();
        lead_ids.sort();
        lead_ids.dedup();
        Ok((expired, lead_ids))
    }

    pub async fn get_score_history(
        &self,
        lead_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ScoreHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, lead_id, event_id, rule_id, category, points_change, new_total,
                   expires_at, expired, expired_at, created_at
            FROM score_history
            WHERE lead_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(lead_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(history_from_row).collect()
    }
}
