use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::AutomationRule;
use crate::error::Result;

use super::PostgresStore;

fn automation_rule_from_row(row: &PgRow) -> Result<AutomationRule> {
    let trigger: serde_json::Value = row.get("trigger_config");
    let action: serde_json::Value = row.get("action_config");
    Ok(AutomationRule {
        id: row.get("id"),
        name: row.get("name"),
        trigger: serde_json::from_value(trigger)?,
        action: serde_json::from_value(action)?,
        priority: row.get("priority"),
        pipeline_id: row.get("pipeline_id"),
        stage_id: row.get("stage_id"),
        is_active: row.get("is_active"),
        last_executed_at: row.get("last_executed_at"),
        execution_count: row.get("execution_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl PostgresStore {
    pub async fn list_active_automation_rules(&self) -> Result<Vec<AutomationRule>> {
        let rows = sqlx::query(
            "SELECT id, name, trigger_type, trigger_config, action_type, action_config, \
                    priority, pipeline_id, stage_id, is_active, last_executed_at, \
                    execution_count, created_at, updated_at \
             FROM automation_rules WHERE is_active \
             ORDER BY priority DESC, name ASC",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(automation_rule_from_row).collect()
    }

    /// Write the idempotency row for a guarded trigger. Returns false when
    /// the (rule, lead, key) combination already fired.
    pub async fn try_log_automation(
        &self,
        rule_id: Uuid,
        lead_id: Uuid,
        trigger_key: &str,
        trigger_data: &serde_json::Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO automation_logs (rule_id, lead_id, trigger_key, trigger_data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (rule_id, lead_id, trigger_key) DO NOTHING
            "#,
        )
        .bind(rule_id)
        .bind(lead_id)
        .bind(trigger_key)
        .bind(trigger_data)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Bump execution bookkeeping after a successful action
    pub async fn record_automation_execution(
        &self,
        rule_id: Uuid,
        executed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE automation_rules SET execution_count = execution_count + 1, \
             last_executed_at = $2, updated_at = now() WHERE id = $1",
        )
        .bind(rule_id)
        .bind(executed_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
