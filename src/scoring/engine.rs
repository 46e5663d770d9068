use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{
    Lead, LifecycleStage, MarketingEvent, Organization, RuleType, ScoreCategory, ScoreTier, Scores,
    ScoringRule,
};
use crate::error::Result;
use crate::rules::TtlCache;
use crate::store::PostgresStore;

/// Result of applying the scoring rules to one event
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    /// Slugs of the rules that recorded points, in evaluation order
    pub rules_matched: Vec<String>,
    pub points_added: i32,
    pub pre_scores: Scores,
    pub new_scores: Scores,
    pub tier_crossed: Option<ScoreTier>,
    pub lifecycle_promoted_to: Option<LifecycleStage>,
    /// Category receiving the largest delta; stamped on the event row
    pub annotated_category: Option<ScoreCategory>,
}

/// Active rules whose conditions match the event in priority order.
/// Threshold-typed rules never fire here; they belong to automation.
pub fn matching_rules<'a>(
    rules: &'a [ScoringRule],
    event: &MarketingEvent,
    lead: &Lead,
    organization: Option<&Organization>,
) -> Vec<&'a ScoringRule> {
    rules
        .iter()
        .filter(|rule| rule.is_active && rule.rule_type != RuleType::Threshold)
        .filter(|rule| rule.conditions.matches_event(event, lead, organization))
        .collect()
}

/// Applies scoring rules to events and maintains the score ledger
pub struct ScoringEngine {
    store: Arc<PostgresStore>,
    cache: TtlCache<Vec<ScoringRule>>,
}

impl ScoringEngine {
    pub fn new(store: Arc<PostgresStore>, cache_ttl: std::time::Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(cache_ttl),
        }
    }

    async fn rules(&self) -> Result<Arc<Vec<ScoringRule>>> {
        let store = self.store.clone();
        self.cache
            .get_with(|| async move { store.list_active_scoring_rules().await })
            .await
    }

    /// Admin invalidate hook; the next read reloads from the store
    pub async fn invalidate_rules(&self) {
        self.cache.invalidate().await;
    }

    /// Match rules against the event, enforce rate caps, append ledger rows
    /// and recompute the denormalized scores from the ledger.
    pub async fn process_event(
        &self,
        event: &MarketingEvent,
        lead: &Lead,
        organization: Option<&Organization>,
        now: DateTime<Utc>,
    ) -> Result<ScoringOutcome> {
        let rules = self.rules().await?;
        let pre_scores = self.store.live_category_sums(lead.id).await?;
        let mut running = pre_scores;
        let mut rules_matched = Vec::new();
        let mut points_added = 0;
        let mut points_by_category = Scores::default();

        for rule in matching_rules(&rules, event, lead, organization) {
            // Retried jobs resume: never double-apply a rule to one event
            if self.store.rule_applied_for_event(event.id, rule.id).await? {
                continue;
            }
            if !self.within_caps(lead, rule, now).await? {
                continue;
            }

            let expires_at = rule
                .decay_days
                .map(|days| now + Duration::days(days as i64));
            let new_total = running.get(rule.category) + rule.points;
            self.store
                .append_score_history(
                    lead.id,
                    Some(event.id),
                    Some(rule.id),
                    rule.category,
                    rule.points,
                    new_total,
                    expires_at,
                )
                .await?;
            running.set(rule.category, new_total);
            rules_matched.push(rule.slug.clone());
            points_added += rule.points;
            points_by_category.set(
                rule.category,
                points_by_category.get(rule.category) + rule.points,
            );
            debug!(
                rule = %rule.slug,
                points = rule.points,
                lead = %lead.id,
                "scoring rule recorded"
            );
        }

        // The ledger is authoritative; recompute rather than trusting deltas
        let new_scores = self.store.live_category_sums(lead.id).await?;
        if !rules_matched.is_empty() {
            self.store.update_lead_scores(lead.id, &new_scores).await?;
        }

        let tier_crossed = ScoreTier::crossed(pre_scores.total(), new_scores.total());
        let lifecycle_promoted_to = self
            .promote_lifecycle(lead, new_scores.total())
            .await?;

        if let Some(tier) = tier_crossed {
            info!(
                lead = %lead.id,
                tier = tier.as_str(),
                total = new_scores.total(),
                "score tier crossed"
            );
        }

        let annotated_category = ScoreCategory::ALL
            .into_iter()
            .filter(|c| points_by_category.get(*c) != 0)
            .max_by_key(|c| points_by_category.get(*c).abs());

        Ok(ScoringOutcome {
            rules_matched,
            points_added,
            pre_scores,
            new_scores,
            tier_crossed,
            lifecycle_promoted_to,
            annotated_category,
        })
    }

    /// Recompute a lead's scores from the ledger (used after decay)
    pub async fn recompute_lead(&self, lead_id: uuid::Uuid) -> Result<Scores> {
        let scores = self.store.live_category_sums(lead_id).await?;
        self.store.update_lead_scores(lead_id, &scores).await?;
        Ok(scores)
    }

    async fn within_caps(
        &self,
        lead: &Lead,
        rule: &ScoringRule,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if let Some(cap) = rule.max_per_day {
            let hits = self
                .store
                .count_rule_hits_window(lead.id, rule.id, now)
                .await?;
            if hits >= cap as i64 {
                // Capped rules are skipped silently; never surfaced to callers
                warn!(
                    rule = %rule.slug,
                    lead = %lead.id,
                    hits,
                    cap,
                    "scoring rule hit daily cap"
                );
                return Ok(false);
            }
        }
        if let Some(cap) = rule.max_per_lead {
            let hits = self.store.count_rule_hits_total(lead.id, rule.id).await?;
            if hits >= cap as i64 {
                debug!(
                    rule = %rule.slug,
                    lead = %lead.id,
                    "scoring rule at lifetime cap"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Promote the lifecycle stage when the total crossed 40/80. Stages
    /// are sticky: decay never demotes.
    async fn promote_lifecycle(
        &self,
        lead: &Lead,
        new_total: i32,
    ) -> Result<Option<LifecycleStage>> {
        let candidate = LifecycleStage::for_total_score(new_total);
        let promoted = lead.lifecycle_stage.promoted_to(candidate);
        if promoted != lead.lifecycle_stage {
            self.store.update_lifecycle_stage(lead.id, promoted).await?;
            return Ok(Some(promoted));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::Attribution;
    use crate::domain::{
        EventCategory, IntentSummary, LeadStatus, RoutingStatus, RuleType, ScoreCategory,
    };
    use crate::rules::RuleCondition;
    use serde_json::json;
    use uuid::Uuid;

    fn rule(slug: &str, priority: i32, rule_type: RuleType, conditions: serde_json::Value) -> ScoringRule {
        ScoringRule {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: slug.to_string(),
            category: ScoreCategory::Behavior,
            rule_type,
            conditions: serde_json::from_value::<RuleCondition>(conditions).unwrap(),
            points: 10,
            max_per_day: None,
            max_per_lead: None,
            decay_days: None,
            priority,
            is_active: true,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            email: "x@y.com".to_string(),
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

    fn event(event_type: &str, metadata: serde_json::Value) -> MarketingEvent {
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
    fn test_matching_respects_priority_order() {
        let rules = vec![
            rule(
                "high",
                100,
                RuleType::Event,
                json!({"type": "event", "event_type": "page_visited"}),
            ),
            rule(
                "low",
                10,
                RuleType::Event,
                json!({"type": "event", "event_type": "page_visited"}),
            ),
        ];
        let matched = matching_rules(&rules, &event("page_visited", json!({})), &lead(), None);
        let slugs: Vec<&str> = matched.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["high", "low"]);
    }

    #[test]
    fn test_threshold_rules_never_match_events() {
        let rules = vec![rule(
            "tier",
            100,
            RuleType::Threshold,
            json!({"type": "threshold", "metric": "total_score", "operator": "gte", "value": 1}),
        )];
        let matched = matching_rules(&rules, &event("page_visited", json!({})), &lead(), None);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_inactive_rules_skipped() {
        let mut inactive = rule(
            "off",
            50,
            RuleType::Event,
            json!({"type": "event", "event_type": "page_visited"}),
        );
        inactive.is_active = false;
        let rules = vec![inactive];
        let matched = matching_rules(&rules, &event("page_visited", json!({})), &lead(), None);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_field_rules_match_any_event() {
        let rules = vec![rule(
            "title",
            50,
            RuleType::Field,
            json!({"type": "field", "field": "lead.email", "operator": "contains", "value": "@y.com"}),
        )];
        // Fires regardless of the event type; caps bound repetition
        let matched = matching_rules(&rules, &event("anything", json!({})), &lead(), None);
        assert_eq!(matched.len(), 1);
    }
}
