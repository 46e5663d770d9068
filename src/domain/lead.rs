use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lead lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Nurturing,
    Customer,
    Churned,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Nurturing => "nurturing",
            LeadStatus::Customer => "customer",
            LeadStatus::Churned => "churned",
        }
    }
}

impl TryFrom<&str> for LeadStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "nurturing" => Ok(LeadStatus::Nurturing),
            "customer" => Ok(LeadStatus::Customer),
            "churned" => Ok(LeadStatus::Churned),
            other => Err(format!("unknown lead status: {other}")),
        }
    }
}

/// Funnel stage. Ordered; promotions never regress on decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Lead,
    Mql,
    Sql,
    Opportunity,
    Customer,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Lead => "lead",
            LifecycleStage::Mql => "mql",
            LifecycleStage::Sql => "sql",
            LifecycleStage::Opportunity => "opportunity",
            LifecycleStage::Customer => "customer",
        }
    }

    /// Stage implied by a total score. Used only for upward promotion.
    pub fn for_total_score(total: i32) -> Self {
        if total >= 80 {
            LifecycleStage::Sql
        } else if total >= 40 {
            LifecycleStage::Mql
        } else {
            LifecycleStage::Lead
        }
    }

    /// Promote to `candidate` only if it is further down the funnel
    pub fn promoted_to(self, candidate: LifecycleStage) -> Self {
        self.max(candidate)
    }
}

impl TryFrom<&str> for LifecycleStage {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "lead" => Ok(LifecycleStage::Lead),
            "mql" => Ok(LifecycleStage::Mql),
            "sql" => Ok(LifecycleStage::Sql),
            "opportunity" => Ok(LifecycleStage::Opportunity),
            "customer" => Ok(LifecycleStage::Customer),
            other => Err(format!("unknown lifecycle stage: {other}")),
        }
    }
}

/// Routing state of a lead relative to the Global Pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStatus {
    Unrouted,
    Routed,
    ManualReview,
    Stuck,
}

impl RoutingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStatus::Unrouted => "unrouted",
            RoutingStatus::Routed => "routed",
            RoutingStatus::ManualReview => "manual_review",
            RoutingStatus::Stuck => "stuck",
        }
    }
}

impl TryFrom<&str> for RoutingStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "unrouted" => Ok(RoutingStatus::Unrouted),
            "routed" => Ok(RoutingStatus::Routed),
            "manual_review" => Ok(RoutingStatus::ManualReview),
            "stuck" => Ok(RoutingStatus::Stuck),
            other => Err(format!("unknown routing status: {other}")),
        }
    }
}

/// Product intent classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Academic / research lab sequencing
    Research,
    /// Enterprise lab enablement
    B2b,
    /// Panel co-creation partnerships
    CoCreation,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::B2b, Intent::CoCreation, Intent::Research];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Research => "research",
            Intent::B2b => "b2b",
            Intent::CoCreation => "co_creation",
        }
    }

    /// Pipeline slug a routable lead with this intent lands in
    pub fn pipeline_slug(&self) -> &'static str {
        match self {
            Intent::Research => "research-lab",
            Intent::B2b => "b2b-lab-enablement",
            Intent::CoCreation => "panel-co-creation",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Intent {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "research" => Ok(Intent::Research),
            "b2b" => Ok(Intent::B2b),
            "co_creation" => Ok(Intent::CoCreation),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

/// Accumulated confidence points per intent.
///
/// A BTreeMap keyed by the intent's wire name keeps iteration order
/// deterministic, which the argmax tiebreak relies on (lexicographic).
pub type IntentSummary = BTreeMap<String, i64>;

/// Scoring category for rule configuration and the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Demographic,
    Engagement,
    Behavior,
}

impl ScoreCategory {
    pub const ALL: [ScoreCategory; 3] = [
        ScoreCategory::Demographic,
        ScoreCategory::Engagement,
        ScoreCategory::Behavior,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreCategory::Demographic => "demographic",
            ScoreCategory::Engagement => "engagement",
            ScoreCategory::Behavior => "behavior",
        }
    }
}

impl TryFrom<&str> for ScoreCategory {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "demographic" => Ok(ScoreCategory::Demographic),
            "engagement" => Ok(ScoreCategory::Engagement),
            "behavior" => Ok(ScoreCategory::Behavior),
            other => Err(format!("unknown score category: {other}")),
        }
    }
}

/// Denormalized per-category scores. The score-history ledger is
/// authoritative; these exist to avoid an aggregation query per read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub demographic: i32,
    pub engagement: i32,
    pub behavior: i32,
}

impl Scores {
    pub fn total(&self) -> i32 {
        self.demographic + self.engagement + self.behavior
    }

    pub fn get(&self, category: ScoreCategory) -> i32 {
        match category {
            ScoreCategory::Demographic => self.demographic,
            ScoreCategory::Engagement => self.engagement,
            ScoreCategory::Behavior => self.behavior,
        }
    }

    pub fn set(&mut self, category: ScoreCategory, value: i32) {
        match category {
            ScoreCategory::Demographic => self.demographic = value,
            ScoreCategory::Engagement => self.engagement = value,
            ScoreCategory::Behavior => self.behavior = value,
        }
    }
}

/// Score tier reached when the total crosses a threshold upward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    Warm,
    Hot,
    VeryHot,
}

impl ScoreTier {
    pub fn threshold(&self) -> i32 {
        match self {
            ScoreTier::Warm => 40,
            ScoreTier::Hot => 80,
            ScoreTier::VeryHot => 120,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreTier::Warm => "warm",
            ScoreTier::Hot => "hot",
            ScoreTier::VeryHot => "very_hot",
        }
    }

    /// Highest tier boundary crossed upward between two totals, if any
    pub fn crossed(pre_total: i32, post_total: i32) -> Option<ScoreTier> {
        let mut crossed = None;
        for tier in [ScoreTier::Warm, ScoreTier::Hot, ScoreTier::VeryHot] {
            if pre_total < tier.threshold() && post_total >= tier.threshold() {
                crossed = Some(tier);
            }
        }
        crossed
    }
}

/// First/last touch attribution snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attribution {
    pub first_touch_source: Option<String>,
    pub first_touch_campaign: Option<String>,
    pub first_touch_date: Option<DateTime<Utc>>,
    pub last_touch_source: Option<String>,
    pub last_touch_campaign: Option<String>,
    pub last_touch_date: Option<DateTime<Utc>>,
}

/// The unit of routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub email: String,
    /// Synthesized placeholder email, never used for outbound
    pub placeholder_email: bool,
    pub portal_id: Option<String>,
    pub linkedin_url: Option<String>,
    pub waalaxy_id: Option<String>,
    pub lemlist_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub organization_id: Option<Uuid>,
    pub status: LeadStatus,
    pub lifecycle_stage: LifecycleStage,
    pub scores: Scores,
    pub pipeline_id: Option<Uuid>,
    pub routing_status: RoutingStatus,
    pub routed_at: Option<DateTime<Utc>>,
    pub primary_intent: Option<Intent>,
    pub intent_confidence: i32,
    pub intent_summary: IntentSummary,
    pub attribution: Attribution,
    pub gdpr_consent_at: Option<DateTime<Utc>>,
    pub gdpr_consent_source: Option<String>,
    pub deletion_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn total_score(&self) -> i32 {
        self.scores.total()
    }

    /// A deletion-requested lead is never used as a routing source
    pub fn is_routing_candidate(&self) -> bool {
        self.deletion_requested_at.is_none()
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }

    pub fn in_global_pool(&self) -> bool {
        self.pipeline_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_crossing_boundaries() {
        // Exactly at the boundary counts as crossed
        assert_eq!(ScoreTier::crossed(39, 40), Some(ScoreTier::Warm));
        assert_eq!(ScoreTier::crossed(79, 80), Some(ScoreTier::Hot));
        assert_eq!(ScoreTier::crossed(119, 120), Some(ScoreTier::VeryHot));
        // Already past the boundary does not re-fire
        assert_eq!(ScoreTier::crossed(40, 60), None);
        // Downward movement never crosses
        assert_eq!(ScoreTier::crossed(90, 70), None);
        // One jump over several boundaries reports the highest
        assert_eq!(ScoreTier::crossed(10, 130), Some(ScoreTier::VeryHot));
    }

    #[test]
    fn test_lifecycle_promotion_is_sticky() {
        assert_eq!(LifecycleStage::for_total_score(39), LifecycleStage::Lead);
        assert_eq!(LifecycleStage::for_total_score(40), LifecycleStage::Mql);
        assert_eq!(LifecycleStage::for_total_score(80), LifecycleStage::Sql);

        // Decay below 80 keeps SQL
        let stage = LifecycleStage::Sql;
        assert_eq!(
            stage.promoted_to(LifecycleStage::for_total_score(50)),
            LifecycleStage::Sql
        );
        // Customer never regresses
        assert_eq!(
            LifecycleStage::Customer.promoted_to(LifecycleStage::Mql),
            LifecycleStage::Customer
        );
    }

    #[test]
    fn test_scores_total_invariant() {
        let mut scores = Scores::default();
        scores.set(ScoreCategory::Demographic, 15);
        scores.set(ScoreCategory::Engagement, 20);
        scores.set(ScoreCategory::Behavior, 30);
        assert_eq!(scores.total(), 65);
        assert_eq!(scores.get(ScoreCategory::Engagement), 20);
    }

    #[test]
    fn test_intent_pipeline_mapping() {
        assert_eq!(Intent::Research.pipeline_slug(), "research-lab");
        assert_eq!(Intent::B2b.pipeline_slug(), "b2b-lab-enablement");
        assert_eq!(Intent::CoCreation.pipeline_slug(), "panel-co-creation");
    }

    #[test]
    fn test_intent_round_trip() {
        for intent in Intent::ALL {
            assert_eq!(Intent::try_from(intent.as_str()).unwrap(), intent);
        }
        assert!(Intent::try_from("ml_inferred").is_err());
    }

    #[test]
    fn test_display_name_fallback() {
        let mut lead = sample_lead();
        assert_eq!(lead.display_name(), "Ada Lovelace");
        lead.first_name = None;
        lead.last_name = None;
        assert_eq!(lead.display_name(), "ada@uni-test.edu");
    }

    fn sample_lead() -> Lead {
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
            job_title: None,
            organization_id: None,
            status: LeadStatus::New,
            lifecycle_stage: LifecycleStage::Lead,
            scores: Scores::default(),
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
}
