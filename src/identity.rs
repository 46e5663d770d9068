//! Identity Resolver
//!
//! Maps an incoming event's identifier set to a single lead, creating one
//! when nothing matches. Resolution order is fixed: email, portal id,
//! Waalaxy id, LinkedIn URL, Lemlist id; first match wins. Matching is
//! case-insensitive for email and LinkedIn URL.

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{IngestEvent, Lead, LeadIdentifier};
use crate::error::{LeadflowError, Result};
use crate::store::{ExternalIdColumn, NewLead, PostgresStore};

/// Outcome of identity resolution
#[derive(Debug, Clone)]
pub struct ResolvedLead {
    pub lead: Lead,
    pub created: bool,
}

/// Synthesized address for leads known only by external platform ids.
/// Flagged via `placeholder_email` so it is never used for outbound.
pub fn placeholder_email(seq: i64) -> String {
    format!("unknown+{seq}@placeholder.local")
}

/// Optional profile fields producers may carry in event metadata
fn metadata_str(event: &IngestEvent, key: &str) -> Option<String> {
    event
        .metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub struct IdentityResolver {
    store: Arc<PostgresStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<PostgresStore>) -> Self {
        Self { store }
    }

    /// Resolve the event's identifier set to exactly one lead.
    ///
    /// Two concurrent first events for the same identifier may both miss
    /// the lookup; the insert runs under the unique constraints and a
    /// conflict triggers one lookup retry, so at most one lead is ever
    /// created per identifier set.
    pub async fn resolve(&self, event: &IngestEvent) -> Result<ResolvedLead> {
        if event.lead_identifier.is_empty() {
            return Err(LeadflowError::Validation(
                "lead_identifier must carry at least one identifier".to_string(),
            ));
        }

        if let Some(lead) = self.lookup(&event.lead_identifier).await? {
            self.fill_missing_identifiers(&lead, &event.lead_identifier)
                .await?;
            debug!(lead = %lead.id, "identity resolved to existing lead");
            return Ok(ResolvedLead {
                lead,
                created: false,
            });
        }

        match self.create(event).await {
            Ok(lead) => {
                info!(lead = %lead.id, email = %lead.email, "lead created");
                Ok(ResolvedLead {
                    lead,
                    created: true,
                })
            }
            Err(err) if err.is_unique_violation() => {
                // Lost the race; the winner's row must be visible now
                let lead = self.lookup(&event.lead_identifier).await?.ok_or(err)?;
                self.fill_missing_identifiers(&lead, &event.lead_identifier)
                    .await?;
                Ok(ResolvedLead {
                    lead,
                    created: false,
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn lookup(&self, identifier: &LeadIdentifier) -> Result<Option<Lead>> {
        if let Some(email) = identifier.normalized_email() {
            if let Some(lead) = self.store.find_lead_by_email(&email).await? {
                return Ok(Some(lead));
            }
        }
        if let Some(portal_id) = identifier.portal_id.as_deref() {
            if let Some(lead) = self
                .store
                .find_lead_by_external_id(ExternalIdColumn::PortalId, portal_id)
                .await?
            {
                return Ok(Some(lead));
            }
        }
        if let Some(waalaxy_id) = identifier.waalaxy_id.as_deref() {
            if let Some(lead) = self
                .store
                .find_lead_by_external_id(ExternalIdColumn::WaalaxyId, waalaxy_id)
                .await?
            {
                return Ok(Some(lead));
            }
        }
        if let Some(linkedin) = identifier.normalized_linkedin() {
            if let Some(lead) = self
                .store
                .find_lead_by_external_id(ExternalIdColumn::LinkedinUrl, &linkedin)
                .await?
            {
                return Ok(Some(lead));
            }
        }
        if let Some(lemlist_id) = identifier.lemlist_id.as_deref() {
            if let Some(lead) = self
                .store
                .find_lead_by_external_id(ExternalIdColumn::LemlistId, lemlist_id)
                .await?
            {
                return Ok(Some(lead));
            }
        }
        Ok(None)
    }

    async fn create(&self, event: &IngestEvent) -> Result<Lead> {
        let identifier = &event.lead_identifier;
        let (email, is_placeholder) = match identifier.normalized_email() {
            Some(email) => (email, false),
            None => {
                let seq = self.store.next_placeholder_seq().await?;
                (placeholder_email(seq), true)
            }
        };

        let new = NewLead {
            email,
            placeholder_email: is_placeholder,
            portal_id: identifier.portal_id.clone(),
            linkedin_url: identifier.normalized_linkedin(),
            waalaxy_id: identifier.waalaxy_id.clone(),
            lemlist_id: identifier.lemlist_id.clone(),
            first_name: metadata_str(event, "first_name"),
            last_name: metadata_str(event, "last_name"),
            job_title: metadata_str(event, "job_title"),
            first_touch_source: Some(event.source.clone()),
            first_touch_campaign: event.campaign_id.clone(),
            first_touch_date: Some(event.occurred_at),
        };
        self.store.insert_lead(&new).await
    }

    /// COALESCE semantics: only missing identifiers are written
    async fn fill_missing_identifiers(
        &self,
        lead: &Lead,
        identifier: &LeadIdentifier,
    ) -> Result<()> {
        let portal = identifier.portal_id.as_deref().filter(|_| lead.portal_id.is_none());
        let linkedin = identifier
            .normalized_linkedin()
            .filter(|_| lead.linkedin_url.is_none());
        let waalaxy = identifier
            .waalaxy_id
            .as_deref()
            .filter(|_| lead.waalaxy_id.is_none());
        let lemlist = identifier
            .lemlist_id
            .as_deref()
            .filter(|_| lead.lemlist_id.is_none());

        if portal.is_none() && linkedin.is_none() && waalaxy.is_none() && lemlist.is_none() {
            return Ok(());
        }
        self.store
            .coalesce_lead_identifiers(lead.id, portal, linkedin.as_deref(), waalaxy, lemlist)
            .await
    }
}
