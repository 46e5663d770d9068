use sqlx::Row;
use uuid::Uuid;

use crate::domain::organization::CompanySize;
use crate::domain::Organization;
use crate::error::{LeadflowError, Result};

use super::PostgresStore;

impl PostgresStore {
    pub async fn get_organization(&self, id: Uuid) -> Result<Organization> {
        let row = sqlx::query(
            "SELECT id, name, domain, industry, company_size, country, moco_customer_id, \
                    created_at, updated_at \
             FROM organizations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| LeadflowError::NotFound {
            entity: "organization",
            id: id.to_string(),
        })?;

        let company_size: Option<String> = row.get("company_size");
        Ok(Organization {
            id: row.get("id"),
            name: row.get("name"),
            domain: row.get("domain"),
            industry: row.get("industry"),
            company_size: company_size
                .as_deref()
                .map(CompanySize::try_from)
                .transpose()
                .map_err(LeadflowError::Internal)?,
            country: row.get("country"),
            moco_customer_id: row.get("moco_customer_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Organization for a lead, when one is linked
    pub async fn organization_for_lead(&self, lead_id: Uuid) -> Result<Option<Organization>> {
        let row = sqlx::query("SELECT organization_id FROM leads WHERE id = $1")
            .bind(lead_id)
            .fetch_optional(self.pool())
            .await?;
        let Some(row) = row else { return Ok(None) };
        let org_id: Option<Uuid> = row.get("organization_id");
        match org_id {
            Some(id) => Ok(Some(self.get_organization(id).await?)),
            None => Ok(None),
        }
    }

    pub async fn set_organization_moco_id(
        &self,
        organization_id: Uuid,
        moco_customer_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE organizations SET moco_customer_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(organization_id)
        .bind(moco_customer_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
