//! Moco finance API client
//!
//! Outbound-only: the pipeline never depends on inbound replies for
//! correctness. Created ids are persisted on the organization or deal.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::config::MocoConfig;
use crate::error::{LeadflowError, Result};
use crate::outbound::retry::{classify_status, with_retries};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct CreatedEntity {
    id: i64,
}

/// Moco REST client scoped to one tenant subdomain
#[derive(Clone)]
pub struct MocoClient {
    client: Client,
    config: MocoConfig,
}

impl MocoClient {
    pub fn new(config: MocoConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.api_key.is_empty() && !self.config.subdomain.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!(
            "https://{}.mocoapp.com/api/v1/{path}",
            self.config.subdomain
        )
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<i64> {
        if !self.is_enabled() {
            return Err(LeadflowError::DownstreamRejected {
                service: "moco",
                reason: "moco sync is disabled".to_string(),
            });
        }

        let url = self.url(path);
        with_retries("moco_api", MAX_ATTEMPTS, || async {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Token token={}", self.config.api_key))
                .json(&body)
                .send()
                .await?;
            if response.status().is_success() {
                let created: CreatedEntity = response.json().await?;
                Ok(created.id)
            } else {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                Err(classify_status("moco", status, text))
            }
        })
        .await
    }

    /// Create a company record; returns the Moco customer id
    pub async fn create_customer(&self, name: &str, country: Option<&str>) -> Result<String> {
        let id = self
            .post(
                "companies",
                json!({
                    "name": name,
                    "type": "customer",
                    "country_code": country.unwrap_or("DE"),
                }),
            )
            .await?;
        info!(customer = id, "moco customer created");
        Ok(id.to_string())
    }

    /// Create an offer for a customer; returns the Moco offer id
    pub async fn create_offer(
        &self,
        customer_id: &str,
        title: &str,
        value: Option<rust_decimal::Decimal>,
    ) -> Result<String> {
        let mut body = json!({
            "company_id": customer_id,
            "title": title,
            "currency": "EUR",
        });
        if let Some(value) = value {
            body["items"] = json!([{ "title": title, "net_total": value }]);
        }
        let id = self.post("offers", body).await?;
        info!(offer = id, "moco offer created");
        Ok(id.to_string())
    }

    /// Turn an accepted offer into an invoice; returns the invoice id
    pub async fn create_invoice_from_offer(&self, offer_id: &str) -> Result<String> {
        let id = self
            .post("invoices", json!({ "offer_id": offer_id }))
            .await?;
        info!(invoice = id, "moco invoice created");
        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_url_shape() {
        let client = MocoClient::new(MocoConfig {
            enabled: true,
            api_key: "k".to_string(),
            subdomain: "dna-me".to_string(),
        });
        assert_eq!(
            client.url("companies"),
            "https://dna-me.mocoapp.com/api/v1/companies"
        );
    }

    #[tokio::test]
    async fn test_disabled_client_rejects() {
        let client = MocoClient::new(MocoConfig::default());
        assert!(!client.is_enabled());
        let err = client.create_customer("Biotech Corp", None).await.unwrap_err();
        assert_eq!(err.code(), "downstream_rejected");
    }
}
