use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{Intent, IntentRule, IntentSummary};
use crate::error::{LeadflowError, Result};

use super::PostgresStore;

fn intent_rule_from_row(row: &PgRow) -> Result<IntentRule> {
    let intent: String = row.get("intent");
    let trigger: serde_json::Value = row.get("trigger");
    Ok(IntentRule {
        id: row.get("id"),
        intent: Intent::try_from(intent.as_str()).map_err(LeadflowError::Internal)?,
        trigger: serde_json::from_value(trigger)?,
        confidence_points: row.get("confidence_points"),
        description: row.get("description"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

impl PostgresStore {
    pub async fn list_active_intent_rules(&self) -> Result<Vec<IntentRule>> {
        let rows = sqlx::query(
            "SELECT id, intent, trigger, confidence_points, description, is_active, created_at \
             FROM intent_rules WHERE is_active ORDER BY confidence_points DESC, id ASC",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(intent_rule_from_row).collect()
    }

    /// Intent rules fire at most once per (lead, rule); signals stay
    /// monotonic without repeated events inflating one rule's evidence.
    pub async fn intent_signal_exists(&self, lead_id: Uuid, rule_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM intent_signals WHERE lead_id = $1 AND rule_id = $2) AS seen",
        )
        .bind(lead_id)
        .bind(rule_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("seen"))
    }

    pub async fn insert_intent_signal(
        &self,
        lead_id: Uuid,
        intent: Intent,
        rule_id: Uuid,
        confidence_points: i64,
        trigger_type: &str,
        event_id: Option<Uuid>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO intent_signals (lead_id, intent, rule_id, confidence_points, trigger_type, event_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(lead_id)
        .bind(intent.as_str())
        .bind(rule_id)
        .bind(confidence_points)
        .bind(trigger_type)
        .bind(event_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("id"))
    }

    /// Accumulated confidence points per intent from the signal ledger
    pub async fn intent_summary(&self, lead_id: Uuid) -> Result<IntentSummary> {
        let rows = sqlx::query(
            r#"
            SELECT intent, COALESCE(SUM(confidence_points), 0)::BIGINT AS points
            FROM intent_signals
            WHERE lead_id = $1
            GROUP BY intent
            "#,
        )
        .bind(lead_id)
        .fetch_all(self.pool())
        .await?;

        let mut summary = IntentSummary::new();
        for row in rows {
            let intent: String = row.get("intent");
            let points: i64 = row.get("points");
            summary.insert(intent, points);
        }
        Ok(summary)
    }
}
