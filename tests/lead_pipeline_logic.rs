//! Scenario-level tests for the pipeline decision logic: the seed rule
//! catalog against the canonical lead journeys, intent confidence math,
//! the routing ladder and queue coalescing.

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use leadflow::config::RoutingConfig;
use leadflow::domain::lead::Attribution;
use leadflow::domain::{
    EventCategory, Intent, IntentSummary, Lead, LeadStatus, LifecycleStage, MarketingEvent,
    RoutingStatus, RuleType, ScoreCategory, Scores, ScoringRule,
};
use leadflow::intent::compute_confidence;
use leadflow::queue::{Job, JobPayload, JobQueues, QueueName, RoutingTrigger};
use leadflow::routing::{decide, RoutingDecision};
use leadflow::rules::RuleCondition;
use leadflow::scoring::matching_rules;

fn lead(email: &str) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        email: email.to_string(),
        placeholder_email: false,
        portal_id: None,
        linkedin_url: None,
        waalaxy_id: None,
        lemlist_id: None,
        first_name: None,
        last_name: None,
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

fn event(lead_id: Uuid, event_type: &str, metadata: serde_json::Value) -> MarketingEvent {
    MarketingEvent {
        id: Uuid::new_v4(),
        lead_id,
        event_type: event_type.to_string(),
        event_category: EventCategory::Web,
        source: "website".to_string(),
        occurred_at: Utc.with_ymd_and_hms(2026, 1, 21, 12, 10, 0).unwrap(),
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

fn scoring_rule(
    slug: &str,
    category: ScoreCategory,
    rule_type: RuleType,
    conditions: serde_json::Value,
    points: i32,
    max_per_lead: Option<i32>,
) -> ScoringRule {
    ScoringRule {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        name: slug.to_string(),
        category,
        rule_type,
        conditions: serde_json::from_value::<RuleCondition>(conditions).unwrap(),
        points,
        max_per_day: None,
        max_per_lead,
        decay_days: None,
        priority: 50,
        is_active: true,
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// The seeded scoring catalog, as configured in the default migration
fn seed_scoring_rules() -> Vec<ScoringRule> {
    vec![
        scoring_rule(
            "pricing-page-visit",
            ScoreCategory::Behavior,
            RuleType::Event,
            json!({"type": "event", "event_type": "page_visited",
                   "metadata": {"page": {"contains": "/pricing"}}}),
            10,
            None,
        ),
        scoring_rule(
            "partnerships-page-visit",
            ScoreCategory::Behavior,
            RuleType::Event,
            json!({"type": "event", "event_type": "page_visited",
                   "metadata": {"page": {"contains": "/partnerships"}}}),
            10,
            None,
        ),
        scoring_rule(
            "enterprise-page-visit",
            ScoreCategory::Behavior,
            RuleType::Event,
            json!({"type": "event", "event_type": "page_visited",
                   "metadata": {"page": {"contains": "/enterprise"}}}),
            10,
            None,
        ),
        scoring_rule(
            "sample-report-download",
            ScoreCategory::Behavior,
            RuleType::Event,
            json!({"type": "event", "event_type": "sample_report_downloaded"}),
            15,
            None,
        ),
        scoring_rule(
            "roi-calculator-low-volume",
            ScoreCategory::Behavior,
            RuleType::Event,
            json!({"type": "event", "event_type": "roi_calculator_submitted",
                   "metadata": {"samples_per_month": {"lt": 100}}}),
            20,
            None,
        ),
        scoring_rule(
            "roi-calculator-high-volume",
            ScoreCategory::Behavior,
            RuleType::Event,
            json!({"type": "event", "event_type": "roi_calculator_submitted",
                   "metadata": {"samples_per_month": {"gte": 100}}}),
            30,
            None,
        ),
        scoring_rule(
            "demo-requested",
            ScoreCategory::Behavior,
            RuleType::Event,
            json!({"type": "event", "event_type": "demo_requested"}),
            25,
            None,
        ),
        scoring_rule(
            "academic-email-domain",
            ScoreCategory::Demographic,
            RuleType::Field,
            json!({"type": "field", "field": "lead.email", "operator": "pattern",
                   "value": "@(.*\\.)?(edu|uni-[a-z0-9-]+\\.de|ac\\.[a-z]{2})$"}),
            15,
            Some(1),
        ),
    ]
}

/// Intent catalog as seeded; (intent, condition, points)
fn seed_intent_rules() -> Vec<(Intent, RuleCondition, i64)> {
    let raw = vec![
        (
            Intent::Research,
            json!({"type": "field", "field": "lead.email", "operator": "pattern",
                   "value": "@(.*\\.)?(edu|uni-[a-z0-9-]+\\.de|ac\\.[a-z]{2})$"}),
            30,
        ),
        (
            Intent::Research,
            json!({"type": "event", "event_type": "sample_report_downloaded"}),
            20,
        ),
        (
            Intent::Research,
            json!({"type": "event", "event_type": "roi_calculator_submitted",
                   "metadata": {"samples_per_month": {"lt": 100}}}),
            15,
        ),
        (
            Intent::B2b,
            json!({"type": "event", "event_type": "roi_calculator_submitted",
                   "metadata": {"samples_per_month": {"gte": 100}}}),
            25,
        ),
        (
            Intent::B2b,
            json!({"type": "event", "event_type": "roi_calculator_submitted",
                   "metadata": {"samples_per_month": {"gte": 500}}}),
            35,
        ),
        (
            Intent::B2b,
            json!({"type": "event", "event_type": "page_visited",
                   "metadata": {"page": {"contains": "/enterprise"}}}),
            30,
        ),
        (
            Intent::B2b,
            json!({"type": "event", "event_type": "demo_requested"}),
            20,
        ),
        (
            Intent::CoCreation,
            json!({"type": "event", "event_type": "page_visited",
                   "metadata": {"page": {"contains": "/partnerships"}}}),
            40,
        ),
    ];
    raw.into_iter()
        .map(|(intent, condition, points)| {
            (
                intent,
                serde_json::from_value::<RuleCondition>(condition).unwrap(),
                points,
            )
        })
        .collect()
}

/// Replay events over the catalogs the way the engines do: scoring
/// honors `max_per_lead`; intent rules fire once per lead and rule.
fn replay(lead: &Lead, events: &[MarketingEvent]) -> (i32, IntentSummary) {
    let scoring = seed_scoring_rules();
    let intents = seed_intent_rules();

    let mut total = 0i32;
    let mut scoring_hits: std::collections::HashMap<String, i32> = Default::default();
    let mut summary = IntentSummary::new();
    let mut fired: std::collections::HashSet<usize> = Default::default();

    for event in events {
        for rule in matching_rules(&scoring, event, lead, None) {
            let hits = scoring_hits.entry(rule.slug.clone()).or_insert(0);
            if let Some(cap) = rule.max_per_lead {
                if *hits >= cap {
                    continue;
                }
            }
            *hits += 1;
            total += rule.points;
        }
        for (index, (intent, condition, points)) in intents.iter().enumerate() {
            if !condition.matches_event(event, lead, None) {
                continue;
            }
            if !fired.insert(index) {
                continue;
            }
            *summary.entry(intent.as_str().to_string()).or_insert(0) += points;
        }
    }
    (total, summary)
}

#[test]
fn academic_research_path_routes_to_research_lab() {
    let lead = lead("professor@uni-freiburg.de");
    let events = vec![
        event(lead.id, "page_visited", json!({"page": "/pricing/16s"})),
        event(lead.id, "sample_report_downloaded", json!({})),
        event(
            lead.id,
            "roi_calculator_submitted",
            json!({"samples_per_month": 40}),
        ),
    ];
    let (total, summary) = replay(&lead, &events);

    // pricing +10, report +15, roi-low +20, academic domain +15
    assert!(total >= 40, "total {total} should reach the routing gate");
    assert_eq!(total, 60);

    let calc = compute_confidence(&summary, 15, 60);
    assert_eq!(calc.primary, Some(Intent::Research));
    assert!(calc.confidence >= 60);
    assert!(calc.routable);

    let mut scored = lead.clone();
    scored.scores.behavior = total;
    let decision = decide(&scored, &calc, &RoutingConfig::default(), Utc::now());
    assert_eq!(decision, RoutingDecision::Route(Intent::Research));
    assert_eq!(Intent::Research.pipeline_slug(), "research-lab");
}

#[test]
fn b2b_high_volume_path_routes_to_lab_enablement() {
    let lead = lead("director@biotech-corp.com");
    let events = vec![
        event(lead.id, "page_visited", json!({"page": "/enterprise"})),
        event(
            lead.id,
            "roi_calculator_submitted",
            json!({"samples_per_month": 500}),
        ),
        event(lead.id, "demo_requested", json!({})),
    ];
    let (total, summary) = replay(&lead, &events);

    // enterprise +10, roi-high +30, demo +25
    assert_eq!(total, 65);
    let calc = compute_confidence(&summary, 15, 60);
    assert_eq!(calc.primary, Some(Intent::B2b));
    assert!(calc.routable);

    let mut scored = lead.clone();
    scored.scores.behavior = total;
    let decision = decide(&scored, &calc, &RoutingConfig::default(), Utc::now());
    assert_eq!(decision, RoutingDecision::Route(Intent::B2b));
    assert_eq!(Intent::B2b.pipeline_slug(), "b2b-lab-enablement");
}

#[test]
fn intent_conflict_goes_to_manual_review() {
    let lead = lead("head@uni-heidelberg.de");
    let events = vec![
        event(lead.id, "page_visited", json!({"page": "/partnerships"})),
        event(
            lead.id,
            "roi_calculator_submitted",
            json!({"samples_per_month": 200}),
        ),
    ];
    let (total, summary) = replay(&lead, &events);

    // Academic domain fires research +30; partnerships +40 co_creation;
    // roi 200 gives b2b +25. Primary and secondary sit within margin 15.
    assert_eq!(summary.get("research"), Some(&30));
    assert_eq!(summary.get("co_creation"), Some(&40));
    assert_eq!(summary.get("b2b"), Some(&25));

    let calc = compute_confidence(&summary, 15, 60);
    assert!(calc.conflict);
    assert!(!calc.routable);

    let mut scored = lead.clone();
    scored.scores.behavior = total;
    assert!(scored.total_score() >= 40);
    let decision = decide(&scored, &calc, &RoutingConfig::default(), Utc::now());
    assert_eq!(decision, RoutingDecision::Conflict);
}

#[test]
fn stale_pool_lead_escalates_as_stuck() {
    let mut lead = lead("quiet@lab.example");
    lead.created_at = Utc::now() - Duration::days(15);
    lead.scores.behavior = 50;

    // Confidence 45-ish without conflict: research leads, margin met
    let mut summary = IntentSummary::new();
    summary.insert("research".to_string(), 35);
    summary.insert("b2b".to_string(), 20);
    summary.insert("co_creation".to_string(), 20);
    let calc = compute_confidence(&summary, 15, 60);
    assert!(!calc.routable);
    assert!(!calc.conflict);

    let decision = decide(&lead, &calc, &RoutingConfig::default(), Utc::now());
    assert!(matches!(decision, RoutingDecision::Stuck { days_in_pool: 15 }));
}

#[test]
fn routing_jobs_coalesce_per_lead() {
    let queues = JobQueues::new();
    let lead_id = Uuid::new_v4();
    let payload = || JobPayload::EvaluateRouting {
        lead_id,
        trigger: RoutingTrigger::EventProcessed,
    };

    // Two events for the same lead produce one pending routing job
    assert!(queues
        .enqueue(QueueName::Routing, Job::routing_job_id(lead_id), payload())
        .unwrap());
    assert!(!queues
        .enqueue(QueueName::Routing, Job::routing_job_id(lead_id), payload())
        .unwrap());

    // A different lead is unaffected
    let other = Uuid::new_v4();
    assert!(queues
        .enqueue(
            QueueName::Routing,
            Job::routing_job_id(other),
            JobPayload::EvaluateRouting {
                lead_id: other,
                trigger: RoutingTrigger::EventProcessed,
            }
        )
        .unwrap());
    assert_eq!(queues.depth(QueueName::Routing), 2);
}

#[test]
fn scoring_is_commutative_over_event_order() {
    let lead = lead("professor@uni-freiburg.de");
    let forward = vec![
        event(lead.id, "page_visited", json!({"page": "/pricing/16s"})),
        event(lead.id, "sample_report_downloaded", json!({})),
        event(
            lead.id,
            "roi_calculator_submitted",
            json!({"samples_per_month": 40}),
        ),
    ];
    let mut reversed = forward.clone();
    reversed.reverse();

    let (total_forward, summary_forward) = replay(&lead, &forward);
    let (total_reversed, summary_reversed) = replay(&lead, &reversed);
    assert_eq!(total_forward, total_reversed);
    assert_eq!(summary_forward, summary_reversed);
}

#[test]
fn boundary_totals_cross_tiers_exactly() {
    use leadflow::domain::ScoreTier;
    assert_eq!(ScoreTier::crossed(39, 40), Some(ScoreTier::Warm));
    assert_eq!(ScoreTier::crossed(79, 80), Some(ScoreTier::Hot));
    assert_eq!(ScoreTier::crossed(119, 120), Some(ScoreTier::VeryHot));
    assert_eq!(ScoreTier::crossed(40, 41), None);
    assert_eq!(ScoreTier::crossed(120, 119), None);
}
