//! Placeholder interpolation for notification and task templates
//!
//! Supports `{lead.*}` and `{deal.*}` placeholders. Unknown placeholders
//! are left in place so broken templates are visible in the output.

use crate::domain::{Deal, Lead};

fn lead_field(lead: &Lead, field: &str) -> Option<String> {
    match field {
        "first_name" => Some(lead.first_name.clone().unwrap_or_default()),
        "last_name" => Some(lead.last_name.clone().unwrap_or_default()),
        "name" => Some(lead.display_name()),
        "email" => Some(lead.email.clone()),
        "job_title" => Some(lead.job_title.clone().unwrap_or_default()),
        "total_score" => Some(lead.total_score().to_string()),
        "status" => Some(lead.status.as_str().to_string()),
        "lifecycle_stage" => Some(lead.lifecycle_stage.as_str().to_string()),
        "primary_intent" => Some(
            lead.primary_intent
                .map(|i| i.as_str().to_string())
                .unwrap_or_default(),
        ),
        "intent_confidence" => Some(lead.intent_confidence.to_string()),
        _ => None,
    }
}

fn deal_field(deal: &Deal, field: &str) -> Option<String> {
    match field {
        "name" => Some(deal.name.clone()),
        "value" => Some(
            deal.value
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ),
        "currency" => Some(deal.currency.clone()),
        "status" => Some(deal.status.as_str().to_string()),
        _ => None,
    }
}

/// Substitute placeholders in one template string
pub fn interpolate(template: &str, lead: Option<&Lead>, deal: Option<&Deal>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };
        let token = &after[..end];

        let replacement = token
            .strip_prefix("lead.")
            .and_then(|field| lead.and_then(|l| lead_field(l, field)))
            .or_else(|| {
                token
                    .strip_prefix("deal.")
                    .and_then(|field| deal.and_then(|d| deal_field(d, field)))
            });

        match replacement {
            Some(value) => output.push_str(&value),
            None => {
                output.push('{');
                output.push_str(token);
                output.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::Attribution;
    use crate::domain::{
        DealStatus, IntentSummary, LeadStatus, LifecycleStage, RoutingStatus, Scores,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            email: "ada@uni-test.edu".to_string(),
            placeholder_email: false,
            portal_id: None,
            linkedin_url: None,
            waalaxy_id: None,
            lemlist_id: None,
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            phone: None,
            job_title: Some("PI".to_string()),
            organization_id: None,
            status: LeadStatus::New,
            lifecycle_stage: LifecycleStage::Mql,
            scores: Scores {
                demographic: 15,
                engagement: 10,
                behavior: 25,
            },
            pipeline_id: None,
            routing_status: RoutingStatus::Unrouted,
            routed_at: None,
            primary_intent: None,
            intent_confidence: 0,
            intent_summary: IntentSummary::new(),
            attribution: Attribution::default(),
            gdpr_consent_at: None,
            gdpr_consent_source: None,
            deletion_requested_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_activity_at: None,
        }
    }

    fn deal() -> Deal {
        Deal {
            id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            pipeline_id: Uuid::new_v4(),
            stage_id: Uuid::new_v4(),
            name: "Ada Lovelace — Research Lab".to_string(),
            value: None,
            currency: "EUR".to_string(),
            status: DealStatus::Open,
            stage_entered_at: Utc::now(),
            assigned_to: None,
            assigned_region: None,
            moco_offer_id: None,
            moco_invoice_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_lead_placeholders() {
        let text = interpolate(
            "Call {lead.first_name} {lead.last_name} (score {lead.total_score})",
            Some(&lead()),
            None,
        );
        assert_eq!(text, "Call Ada Lovelace (score 50)");
    }

    #[test]
    fn test_deal_placeholders() {
        let text = interpolate("Deal {deal.name} is {deal.status}", None, Some(&deal()));
        assert_eq!(text, "Deal Ada Lovelace — Research Lab is open");
    }

    #[test]
    fn test_unknown_placeholders_left_intact() {
        let text = interpolate("{lead.shoe_size} and {weather}", Some(&lead()), None);
        assert_eq!(text, "{lead.shoe_size} and {weather}");
    }

    #[test]
    fn test_missing_context_leaves_placeholder() {
        let text = interpolate("{deal.name}", Some(&lead()), None);
        assert_eq!(text, "{deal.name}");
    }

    #[test]
    fn test_unterminated_brace_preserved() {
        let text = interpolate("hello {lead.email", Some(&lead()), None);
        assert_eq!(text, "hello {lead.email");
    }
}
