//! Rule condition grammar
//!
//! Scoring, intent and automation rules share one small predicate algebra:
//! event-match (type + metadata predicates), field-match (lead/organization
//! field + operator) and threshold-match (score comparator). Conditions are
//! stored as JSONB on the rule rows and deserialized into the tagged enum
//! here; each variant has exactly one evaluator.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Lead, MarketingEvent, Organization, ScoreCategory, Scores};

/// Comparator keys accepted inside metadata predicates
pub const COMPARATOR_KEYS: [&str; 7] = ["lt", "lte", "gt", "gte", "in", "contains", "pattern"];

/// One predicate over a metadata value: either a literal (deep equality)
/// or an object of comparators, all of which must hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataPredicate {
    /// `{"samples_per_month": {"gte": 100, "lt": 500}}`
    Comparators(serde_json::Map<String, Value>),
    /// `{"page": "/pricing/16s"}`
    Literal(Value),
}

impl MetadataPredicate {
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            MetadataPredicate::Literal(expected) => actual == Some(expected),
            MetadataPredicate::Comparators(ops) => {
                // An object without comparator keys is a nested literal
                if !ops.keys().any(|k| COMPARATOR_KEYS.contains(&k.as_str())) {
                    return actual == Some(&Value::Object(ops.clone()));
                }
                let Some(actual) = actual else {
                    return false;
                };
                ops.iter().all(|(op, expected)| compare(op, actual, expected))
            }
        }
    }
}

/// Operators available to field conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOperator {
    Equals,
    In,
    Contains,
    Pattern,
    Gte,
    Lte,
}

/// Match on an event type plus any number of metadata predicates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventCondition {
    pub event_type: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl EventCondition {
    pub fn matches(&self, event: &MarketingEvent) -> bool {
        if event.event_type != self.event_type {
            return false;
        }
        self.metadata.iter().all(|(key, raw)| {
            let predicate: MetadataPredicate = match serde_json::from_value(raw.clone()) {
                Ok(p) => p,
                Err(_) => MetadataPredicate::Literal(raw.clone()),
            };
            predicate.matches(event.metadata_value(key))
        })
    }
}

/// Match on a lead or organization field at a dotted path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldCondition {
    /// `lead.email`, `organization.industry`, or a bare lead field name
    pub field: String,
    pub operator: FieldOperator,
    pub value: Value,
}

impl FieldCondition {
    pub fn matches(&self, lead: &Lead, organization: Option<&Organization>) -> bool {
        let Some(actual) = field_value(&self.field, lead, organization) else {
            return false;
        };
        match self.operator {
            FieldOperator::Equals => equals_ci(&actual, &self.value),
            FieldOperator::In => compare("in", &actual, &self.value),
            FieldOperator::Contains => compare("contains", &actual, &self.value),
            FieldOperator::Pattern => compare("pattern", &actual, &self.value),
            FieldOperator::Gte => compare("gte", &actual, &self.value),
            FieldOperator::Lte => compare("lte", &actual, &self.value),
        }
    }

    /// Whether the path targets the organization aggregate
    pub fn is_organization_field(&self) -> bool {
        self.field.starts_with("organization.")
    }
}

/// Score comparator used by automation threshold triggers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdCondition {
    /// `total_score` or a category name
    pub metric: String,
    #[serde(default = "default_threshold_operator")]
    pub operator: String,
    pub value: i64,
}

fn default_threshold_operator() -> String {
    "gte".to_string()
}

impl ThresholdCondition {
    pub fn matches(&self, scores: &Scores) -> bool {
        let actual = match self.metric.as_str() {
            "total_score" | "total" => scores.total() as i64,
            metric => match ScoreCategory::try_from(metric) {
                Ok(category) => scores.get(category) as i64,
                Err(_) => return false,
            },
        };
        match self.operator.as_str() {
            "gte" => actual >= self.value,
            "gt" => actual > self.value,
            "lte" => actual <= self.value,
            "lt" => actual < self.value,
            "eq" => actual == self.value,
            _ => false,
        }
    }
}

/// Tagged sum of the three condition variants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    Event(EventCondition),
    Field(FieldCondition),
    Threshold(ThresholdCondition),
}

impl RuleCondition {
    /// Evaluate in the event-processing context. Threshold conditions are
    /// never triggered by events; they belong to the automation engine.
    pub fn matches_event(
        &self,
        event: &MarketingEvent,
        lead: &Lead,
        organization: Option<&Organization>,
    ) -> bool {
        match self {
            RuleCondition::Event(cond) => cond.matches(event),
            RuleCondition::Field(cond) => cond.matches(lead, organization),
            RuleCondition::Threshold(_) => false,
        }
    }

    /// Tag recorded on intent signals for observability
    pub fn trigger_type(&self) -> &'static str {
        match self {
            RuleCondition::Event(_) => "event",
            RuleCondition::Field(cond) if cond.is_organization_field() => "organization_field",
            RuleCondition::Field(_) => "lead_field",
            RuleCondition::Threshold(_) => "threshold",
        }
    }
}

/// Shared comparator grammar: `lt`, `lte`, `gt`, `gte`, `in`, `contains`,
/// `pattern`. Numeric comparators require both sides numeric; `contains`
/// is a case-insensitive substring (any element when the expectation is a
/// list); `pattern` is a case-insensitive regex.
pub fn compare(op: &str, actual: &Value, expected: &Value) -> bool {
    match op {
        "lt" | "lte" | "gt" | "gte" => match (actual.as_f64(), expected.as_f64()) {
            (Some(a), Some(e)) => match op {
                "lt" => a < e,
                "lte" => a <= e,
                "gt" => a > e,
                _ => a >= e,
            },
            _ => false,
        },
        "in" => match expected.as_array() {
            Some(options) => options.iter().any(|option| equals_ci(actual, option)),
            None => equals_ci(actual, expected),
        },
        "contains" => {
            let candidates: Vec<&Value> = match expected.as_array() {
                Some(options) => options.iter().collect(),
                None => vec![expected],
            };
            candidates.iter().any(|candidate| contains_ci(actual, candidate))
        }
        "pattern" => match (actual_str(actual), expected.as_str()) {
            (Some(haystack), Some(pattern)) => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(|re| re.is_match(&haystack))
                .unwrap_or(false),
            _ => false,
        },
        _ => false,
    }
}

/// Equality with case-insensitive string comparison
fn equals_ci(actual: &Value, expected: &Value) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) => a.eq_ignore_ascii_case(e),
        _ => actual == expected,
    }
}

fn contains_ci(actual: &Value, candidate: &Value) -> bool {
    match actual {
        Value::String(haystack) => candidate
            .as_str()
            .map(|needle| {
                haystack
                    .to_ascii_lowercase()
                    .contains(&needle.to_ascii_lowercase())
            })
            .unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| equals_ci(item, candidate)),
        _ => false,
    }
}

fn actual_str(actual: &Value) -> Option<String> {
    match actual {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve a dotted field path against the lead or its organization.
/// Unknown paths yield None, which fails the condition.
pub fn field_value(path: &str, lead: &Lead, organization: Option<&Organization>) -> Option<Value> {
    if let Some(field) = path.strip_prefix("organization.") {
        let org = organization?;
        return match field {
            "name" => Some(Value::String(org.name.clone())),
            "domain" => org.domain.clone().map(Value::String),
            "industry" => org.industry.clone().map(Value::String),
            "company_size" => org
                .company_size
                .map(|s| Value::String(s.as_str().to_string())),
            "country" => org.country.clone().map(Value::String),
            _ => None,
        };
    }

    let field = path.strip_prefix("lead.").unwrap_or(path);
    match field {
        "email" => Some(Value::String(lead.email.clone())),
        "first_name" => lead.first_name.clone().map(Value::String),
        "last_name" => lead.last_name.clone().map(Value::String),
        "phone" => lead.phone.clone().map(Value::String),
        "job_title" => lead.job_title.clone().map(Value::String),
        "linkedin_url" => lead.linkedin_url.clone().map(Value::String),
        "status" => Some(Value::String(lead.status.as_str().to_string())),
        "lifecycle_stage" => Some(Value::String(lead.lifecycle_stage.as_str().to_string())),
        "routing_status" => Some(Value::String(lead.routing_status.as_str().to_string())),
        "primary_intent" => lead
            .primary_intent
            .map(|i| Value::String(i.as_str().to_string())),
        "total_score" => Some(Value::from(lead.total_score())),
        "demographic_score" => Some(Value::from(lead.scores.demographic)),
        "engagement_score" => Some(Value::from(lead.scores.engagement)),
        "behavior_score" => Some(Value::from(lead.scores.behavior)),
        "first_touch_source" => lead.attribution.first_touch_source.clone().map(Value::String),
        "last_touch_source" => lead.attribution.last_touch_source.clone().map(Value::String),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Attribution, EventCategory, IntentSummary, LeadStatus, LifecycleStage, RoutingStatus,
    };
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            email: "professor@uni-freiburg.de".to_string(),
            placeholder_email: false,
            portal_id: None,
            linkedin_url: None,
            waalaxy_id: None,
            lemlist_id: None,
            first_name: Some("Eva".to_string()),
            last_name: Some("Braun".to_string()),
            phone: None,
            job_title: Some("Head of Genomics Core Facility".to_string()),
            organization_id: None,
            status: LeadStatus::New,
            lifecycle_stage: LifecycleStage::Lead,
            scores: Scores {
                demographic: 10,
                engagement: 15,
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

    fn event(event_type: &str, metadata: Value) -> MarketingEvent {
        MarketingEvent {
            id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            event_category: EventCategory::Web,
            source: "website".to_string(),
            occurred_at: Utc::now(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            correlation_id: None,
            campaign_id: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            score_points: None,
            score_category: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_condition_literal_metadata() {
        let condition: RuleCondition = serde_json::from_value(json!({
            "type": "event",
            "event_type": "page_visited",
            "metadata": { "page": "/pricing/16s" }
        }))
        .unwrap();

        let hit = event("page_visited", json!({ "page": "/pricing/16s" }));
        let miss_value = event("page_visited", json!({ "page": "/about" }));
        let miss_type = event("form_submitted", json!({ "page": "/pricing/16s" }));

        assert!(condition.matches_event(&hit, &lead(), None));
        assert!(!condition.matches_event(&miss_value, &lead(), None));
        assert!(!condition.matches_event(&miss_type, &lead(), None));
    }

    #[test]
    fn test_metadata_comparators() {
        let condition: RuleCondition = serde_json::from_value(json!({
            "type": "event",
            "event_type": "roi_calculator_submitted",
            "metadata": { "samples_per_month": { "gte": 100, "lt": 500 } }
        }))
        .unwrap();

        assert!(condition.matches_event(
            &event("roi_calculator_submitted", json!({"samples_per_month": 200})),
            &lead(),
            None
        ));
        assert!(!condition.matches_event(
            &event("roi_calculator_submitted", json!({"samples_per_month": 40})),
            &lead(),
            None
        ));
        assert!(!condition.matches_event(
            &event("roi_calculator_submitted", json!({"samples_per_month": 500})),
            &lead(),
            None
        ));
        // Missing key never matches a comparator predicate
        assert!(!condition.matches_event(
            &event("roi_calculator_submitted", json!({})),
            &lead(),
            None
        ));
    }

    #[test]
    fn test_metadata_contains_and_in() {
        let contains: RuleCondition = serde_json::from_value(json!({
            "type": "event",
            "event_type": "page_visited",
            "metadata": { "page": { "contains": "/PRICING" } }
        }))
        .unwrap();
        assert!(contains.matches_event(
            &event("page_visited", json!({"page": "/pricing/16s"})),
            &lead(),
            None
        ));

        let membership: RuleCondition = serde_json::from_value(json!({
            "type": "event",
            "event_type": "email_clicked",
            "metadata": { "campaign": { "in": ["q1", "q2"] } }
        }))
        .unwrap();
        assert!(membership.matches_event(
            &event("email_clicked", json!({"campaign": "Q1"})),
            &lead(),
            None
        ));
        assert!(!membership.matches_event(
            &event("email_clicked", json!({"campaign": "q3"})),
            &lead(),
            None
        ));
    }

    #[test]
    fn test_field_pattern_academic_email() {
        let condition: RuleCondition = serde_json::from_value(json!({
            "type": "field",
            "field": "lead.email",
            "operator": "pattern",
            "value": "@(.*\\.)?(edu|uni-[a-z-]+\\.de|ac\\.[a-z]{2})$"
        }))
        .unwrap();

        let any_event = event("page_visited", json!({}));
        assert!(condition.matches_event(&any_event, &lead(), None));

        let mut corporate = lead();
        corporate.email = "director@biotech-corp.com".to_string();
        assert!(!condition.matches_event(&any_event, &corporate, None));
    }

    #[test]
    fn test_field_contains_with_list() {
        let condition = FieldCondition {
            field: "job_title".to_string(),
            operator: FieldOperator::Contains,
            value: json!(["genomics", "sequencing"]),
        };
        assert!(condition.matches(&lead(), None));

        let mut other = lead();
        other.job_title = Some("VP Finance".to_string());
        assert!(!condition.matches(&other, None));
        other.job_title = None;
        assert!(!condition.matches(&other, None));
    }

    #[test]
    fn test_organization_field_condition() {
        let condition = FieldCondition {
            field: "organization.company_size".to_string(),
            operator: FieldOperator::In,
            value: json!(["large", "enterprise"]),
        };
        let org = Organization {
            id: Uuid::new_v4(),
            name: "Biotech Corp".to_string(),
            domain: Some("biotech-corp.com".to_string()),
            industry: Some("pharma".to_string()),
            company_size: Some(crate::domain::organization::CompanySize::Enterprise),
            country: Some("DE".to_string()),
            moco_customer_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(condition.matches(&lead(), Some(&org)));
        // Missing organization fails the condition
        assert!(!condition.matches(&lead(), None));
        assert!(RuleCondition::Field(condition).trigger_type() == "organization_field");
    }

    #[test]
    fn test_threshold_condition_not_event_triggered() {
        let condition: RuleCondition = serde_json::from_value(json!({
            "type": "threshold",
            "metric": "total_score",
            "operator": "gte",
            "value": 40
        }))
        .unwrap();
        // Never fires in the event path even when the score qualifies
        assert!(!condition.matches_event(&event("page_visited", json!({})), &lead(), None));

        if let RuleCondition::Threshold(threshold) = &condition {
            let scores = Scores {
                demographic: 10,
                engagement: 15,
                behavior: 15,
            };
            assert!(threshold.matches(&scores));
            assert!(!threshold.matches(&Scores::default()));
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_numeric_gte_on_field() {
        let condition = FieldCondition {
            field: "total_score".to_string(),
            operator: FieldOperator::Gte,
            value: json!(50),
        };
        assert!(condition.matches(&lead(), None));
        let condition_high = FieldCondition {
            value: json!(51),
            ..condition
        };
        assert!(!condition_high.matches(&lead(), None));
    }

    #[test]
    fn test_invalid_pattern_fails_closed() {
        assert!(!compare("pattern", &json!("abc"), &json!("([")));
        assert!(!compare("unknown_op", &json!(1), &json!(1)));
    }
}
