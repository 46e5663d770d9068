use chrono::NaiveDate;
use sqlx::Row;
use uuid::Uuid;

use crate::error::Result;

use super::PostgresStore;

impl PostgresStore {
    /// Insert a task produced by an automation rule or the admin surface
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_task(
        &self,
        lead_id: Option<Uuid>,
        deal_id: Option<Uuid>,
        title: &str,
        description: Option<&str>,
        task_type: &str,
        assigned_to: Option<Uuid>,
        due_date: Option<NaiveDate>,
        source_rule_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO tasks (lead_id, deal_id, title, description, task_type, assigned_to, due_date, source_rule_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(lead_id)
        .bind(deal_id)
        .bind(title)
        .bind(description)
        .bind(task_type)
        .bind(assigned_to)
        .bind(due_date)
        .bind(source_rule_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("id"))
    }
}
