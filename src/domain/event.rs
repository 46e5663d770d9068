use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LeadflowError, Result};

use super::lead::ScoreCategory;

/// Broad grouping recorded alongside each event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Web,
    Email,
    Linkedin,
    Portal,
    Conference,
    Crm,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Web => "web",
            EventCategory::Email => "email",
            EventCategory::Linkedin => "linkedin",
            EventCategory::Portal => "portal",
            EventCategory::Conference => "conference",
            EventCategory::Crm => "crm",
        }
    }

    /// Category implied by a producer source when the payload omits one
    pub fn for_source(source: &str) -> Self {
        match source {
            "website" | "web" => EventCategory::Web,
            "lemlist" | "email" | "smtp" => EventCategory::Email,
            "waalaxy" | "linkedin" => EventCategory::Linkedin,
            "portal" => EventCategory::Portal,
            "conference" | "import" => EventCategory::Conference,
            _ => EventCategory::Crm,
        }
    }
}

impl TryFrom<&str> for EventCategory {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "web" => Ok(EventCategory::Web),
            "email" => Ok(EventCategory::Email),
            "linkedin" => Ok(EventCategory::Linkedin),
            "portal" => Ok(EventCategory::Portal),
            "conference" => Ok(EventCategory::Conference),
            "crm" => Ok(EventCategory::Crm),
            other => Err(format!("unknown event category: {other}")),
        }
    }
}

/// Identifier set used to deduplicate leads across platforms
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadIdentifier {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub portal_id: Option<String>,
    #[serde(default)]
    pub waalaxy_id: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub lemlist_id: Option<String>,
}

impl LeadIdentifier {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.portal_id.is_none()
            && self.waalaxy_id.is_none()
            && self.linkedin_url.is_none()
            && self.lemlist_id.is_none()
    }

    /// Email lowered for case-insensitive matching
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| e.to_ascii_lowercase())
    }

    /// LinkedIn URL with the host lowercased and trailing slash stripped
    pub fn normalized_linkedin(&self) -> Option<String> {
        let raw = self.linkedin_url.as_deref().map(str::trim)?;
        if raw.is_empty() {
            return None;
        }
        match url::Url::parse(raw) {
            Ok(mut parsed) => {
                if let Some(host) = parsed.host_str().map(|h| h.to_ascii_lowercase()) {
                    let _ = parsed.set_host(Some(&host));
                }
                let mut out = parsed.to_string();
                while out.ends_with('/') {
                    out.pop();
                }
                Some(out)
            }
            // Not a parseable URL; match on the trimmed raw value
            Err(_) => Some(raw.trim_end_matches('/').to_string()),
        }
    }
}

/// Wire shape of an ingested event (the external producer contract)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    pub event_type: String,
    pub source: String,
    pub occurred_at: DateTime<Utc>,
    pub lead_identifier: LeadIdentifier,
    #[serde(default)]
    pub event_category: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
}

impl IngestEvent {
    /// Validate the external contract. Violations are terminal, never retried.
    pub fn validate(&self) -> Result<()> {
        if self.event_type.trim().is_empty() {
            return Err(LeadflowError::Validation(
                "event_type must not be empty".to_string(),
            ));
        }
        if self.source.trim().is_empty() {
            return Err(LeadflowError::Validation(
                "source must not be empty".to_string(),
            ));
        }
        if self.lead_identifier.is_empty() {
            return Err(LeadflowError::Validation(
                "lead_identifier must carry at least one identifier".to_string(),
            ));
        }
        if let Some(category) = &self.event_category {
            EventCategory::try_from(category.as_str()).map_err(LeadflowError::Validation)?;
        }
        Ok(())
    }

    pub fn category(&self) -> EventCategory {
        self.event_category
            .as_deref()
            .and_then(|c| EventCategory::try_from(c).ok())
            .unwrap_or_else(|| EventCategory::for_source(&self.source))
    }
}

/// Immutable stored record of one observed interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketingEvent {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub event_type: String,
    pub event_category: EventCategory,
    pub source: String,
    pub occurred_at: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub correlation_id: Option<String>,
    pub campaign_id: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    /// Post-processing annotations
    pub score_points: Option<i32>,
    pub score_category: Option<ScoreCategory>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MarketingEvent {
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

/// Partition suffix for the month an event occurred in, e.g. `y2026m01`
pub fn partition_suffix(occurred_at: DateTime<Utc>) -> String {
    format!("y{:04}m{:02}", occurred_at.year(), occurred_at.month())
}

/// First day of the occurrence month and of the following month (UTC),
/// used as partition range bounds.
pub fn partition_bounds(occurred_at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let year = occurred_at.year();
    let month = occurred_at.month();
    let start = first_of_month(year, month);
    let end = if month == 12 {
        first_of_month(year + 1, 1)
    } else {
        first_of_month(year, month + 1)
    };
    (start, end)
}

fn first_of_month(year: i32, month: u32) -> DateTime<Utc> {
    chrono::NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        // Month is always 1-12 here
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_with_identifier(identifier: LeadIdentifier) -> IngestEvent {
        IngestEvent {
            event_type: "page_visited".to_string(),
            source: "website".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 21, 12, 10, 0).unwrap(),
            lead_identifier: identifier,
            event_category: None,
            metadata: serde_json::Map::new(),
            correlation_id: None,
            campaign_id: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
        }
    }

    #[test]
    fn test_missing_identifiers_rejected() {
        let event = event_with_identifier(LeadIdentifier::default());
        let err = event.validate().unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn test_email_normalization() {
        let identifier = LeadIdentifier {
            email: Some("  Professor@Uni-Freiburg.DE ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            identifier.normalized_email().as_deref(),
            Some("professor@uni-freiburg.de")
        );
    }

    #[test]
    fn test_linkedin_normalization() {
        let identifier = LeadIdentifier {
            linkedin_url: Some("https://WWW.LinkedIn.com/in/ada-lovelace/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            identifier.normalized_linkedin().as_deref(),
            Some("https://www.linkedin.com/in/ada-lovelace")
        );
    }

    #[test]
    fn test_category_fallback_by_source() {
        let event = event_with_identifier(LeadIdentifier {
            email: Some("x@y.com".to_string()),
            ..Default::default()
        });
        assert_eq!(event.category(), EventCategory::Web);

        let mut portal = event.clone();
        portal.source = "portal".to_string();
        assert_eq!(portal.category(), EventCategory::Portal);

        let mut tagged = event;
        tagged.event_category = Some("conference".to_string());
        assert_eq!(tagged.category(), EventCategory::Conference);
    }

    #[test]
    fn test_partition_naming_and_bounds() {
        let at = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(partition_suffix(at), "y2026m12");
        let (start, end) = partition_bounds(at);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_wire_shape_deserializes() {
        let raw = r#"{
            "event_type": "roi_calculator_submitted",
            "source": "portal",
            "occurred_at": "2026-01-21T12:10:00Z",
            "lead_identifier": { "email": "x@y.com" },
            "metadata": { "samples_per_month": 200 },
            "correlation_id": "3a1d9c7e-7a44-4b1e-8f0f-1c2c8f4b9d21",
            "campaign_id": "q1",
            "utm_source": "google", "utm_medium": "cpc", "utm_campaign": "q1_launch"
        }"#;
        let event: IngestEvent = serde_json::from_str(raw).unwrap();
        assert!(event.validate().is_ok());
        assert_eq!(event.category(), EventCategory::Portal);
        assert_eq!(
            event.metadata.get("samples_per_month"),
            Some(&serde_json::json!(200))
        );
    }
}
