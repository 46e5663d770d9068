use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{Role, TeamMember};
use crate::error::{LeadflowError, Result};

use super::PostgresStore;

fn member_from_row(row: &PgRow) -> Result<TeamMember> {
    let role: String = row.get("role");
    Ok(TeamMember {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        role: Role::try_from(role.as_str()).map_err(LeadflowError::Internal)?,
        region: row.get("region"),
        is_active: row.get("is_active"),
        max_leads: row.get("max_leads"),
        current_leads: row.get("current_leads"),
        last_assigned_at: row.get("last_assigned_at"),
        created_at: row.get("created_at"),
    })
}

const MEMBER_COLUMNS: &str = "id, email, name, role, region, is_active, max_leads, \
     current_leads, last_assigned_at, created_at";

impl PostgresStore {
    pub async fn get_team_member(&self, id: Uuid) -> Result<TeamMember> {
        let query = format!("SELECT {MEMBER_COLUMNS} FROM team_members WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "team_member",
                id: id.to_string(),
            })?;
        member_from_row(&row)
    }

    /// Members of a role with free capacity, least loaded first
    pub async fn available_members(
        &self,
        role: Role,
        region: Option<&str>,
    ) -> Result<Vec<TeamMember>> {
        let query = format!(
            "SELECT {MEMBER_COLUMNS} FROM team_members \
             WHERE role = $1 AND is_active AND current_leads < max_leads \
               AND ($2::TEXT IS NULL OR region IS NULL OR region = $2) \
             ORDER BY current_leads ASC, last_assigned_at ASC NULLS FIRST"
        );
        let rows = sqlx::query(&query)
            .bind(role.as_str())
            .bind(region)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(member_from_row).collect()
    }

    /// Conditional capacity increment; false when the member is already at
    /// max_leads (the guard that makes over-assignment impossible).
    pub async fn try_assign_lead(
        &self,
        member_id: Uuid,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE team_members SET current_leads = current_leads + 1, last_assigned_at = $2 \
             WHERE id = $1 AND is_active AND current_leads < max_leads",
        )
        .bind(member_id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
