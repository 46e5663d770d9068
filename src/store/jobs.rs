use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::{LeadflowError, Result};

use super::PostgresStore;

/// A job that exhausted its retry budget, parked for manual inspection
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailedJob {
    pub id: i64,
    pub queue: String,
    pub job_id: String,
    pub payload: serde_json::Value,
    pub error_code: String,
    pub error_message: String,
    pub attempts: i32,
    pub failed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

fn failed_job_from_row(row: &PgRow) -> FailedJob {
    FailedJob {
        id: row.get("id"),
        queue: row.get("queue"),
        job_id: row.get("job_id"),
        payload: row.get("payload"),
        error_code: row.get("error_code"),
        error_message: row.get("error_message"),
        attempts: row.get("attempts"),
        failed_at: row.get("failed_at"),
        resolved_at: row.get("resolved_at"),
        resolved_by: row.get("resolved_by"),
    }
}

impl PostgresStore {
    pub async fn insert_failed_job(
        &self,
        queue: &str,
        job_id: &str,
        payload: &serde_json::Value,
        error_code: &str,
        error_message: &str,
        attempts: i32,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO failed_jobs (queue, job_id, payload, error_code, error_message, attempts)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(queue)
        .bind(job_id)
        .bind(payload)
        .bind(error_code)
        .bind(error_message)
        .bind(attempts)
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("id"))
    }

    pub async fn list_failed_jobs(&self, limit: i64) -> Result<Vec<FailedJob>> {
        let rows = sqlx::query(
            "SELECT id, queue, job_id, payload, error_code, error_message, attempts, \
                    failed_at, resolved_at, resolved_by \
             FROM failed_jobs WHERE resolved_at IS NULL \
             ORDER BY failed_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(failed_job_from_row).collect())
    }

    pub async fn get_failed_job(&self, id: i64) -> Result<FailedJob> {
        let row = sqlx::query(
            "SELECT id, queue, job_id, payload, error_code, error_message, attempts, \
                    failed_at, resolved_at, resolved_by \
             FROM failed_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| LeadflowError::NotFound {
            entity: "failed_job",
            id: id.to_string(),
        })?;
        Ok(failed_job_from_row(&row))
    }

    pub async fn resolve_failed_job(&self, id: i64, resolved_by: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE failed_jobs SET resolved_at = now(), resolved_by = $2 \
             WHERE id = $1 AND resolved_at IS NULL",
        )
        .bind(id)
        .bind(resolved_by)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(LeadflowError::NotFound {
                entity: "failed_job",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
