use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{Intent, IntentRule, IntentSummary, Lead, MarketingEvent, Organization};
use crate::error::Result;
use crate::rules::TtlCache;
use crate::store::PostgresStore;

/// Evidence floor; below this the confidence takes a penalty
const LOW_EVIDENCE_TOTAL: i64 = 30;

/// Derived intent classification for one lead
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentCalc {
    pub summary: IntentSummary,
    pub primary: Option<Intent>,
    pub primary_points: i64,
    pub secondary_points: i64,
    /// Calibrated 0-100 dominance score
    pub confidence: i32,
    pub conflict: bool,
    pub routable: bool,
}

/// Compute the confidence summary from accumulated signal points.
///
/// Ties on the argmax break lexicographically on the intent wire name,
/// which the BTreeMap iteration order provides.
pub fn compute_confidence(summary: &IntentSummary, margin: i64, gate: i32) -> IntentCalc {
    let total: i64 = summary.values().sum();

    let mut primary: Option<(&String, i64)> = None;
    let mut secondary_points = 0i64;
    for (intent, &points) in summary.iter() {
        match primary {
            Some((_, best)) if points > best => {
                secondary_points = best;
                primary = Some((intent, points));
            }
            Some((_, best)) => {
                if points > secondary_points && points <= best {
                    secondary_points = points;
                }
            }
            None => primary = Some((intent, points)),
        }
    }

    let (primary, primary_points) = match primary {
        Some((name, points)) if points > 0 => {
            (Intent::try_from(name.as_str()).ok(), points)
        }
        _ => (None, 0),
    };

    let mut confidence: i64 = if total <= 0 {
        0
    } else {
        ((primary_points as f64) * 100.0 / (total as f64)).round() as i64
    };

    if primary_points > 0 && primary_points - secondary_points >= margin {
        confidence = (confidence + 10).min(100);
    }
    if total < LOW_EVIDENCE_TOTAL {
        // May go negative mid-computation; clamped at emission
        confidence -= 20;
    }
    let confidence = confidence.clamp(0, 100) as i32;

    let conflict = secondary_points > 0 && (primary_points - secondary_points) < margin;
    let routable = confidence >= gate && !conflict && primary.is_some();

    IntentCalc {
        summary: summary.clone(),
        primary,
        primary_points,
        secondary_points,
        confidence,
        conflict,
        routable,
    }
}

/// Result of running the intent rules for one event
#[derive(Debug, Clone)]
pub struct IntentOutcome {
    pub signals_added: usize,
    pub calc: IntentCalc,
}

/// Applies intent rules to events and maintains the signal ledger plus
/// the denormalized lead intent fields.
pub struct IntentDetector {
    store: Arc<PostgresStore>,
    cache: TtlCache<Vec<IntentRule>>,
    margin: i64,
    gate: i32,
}

impl IntentDetector {
    pub fn new(
        store: Arc<PostgresStore>,
        cache_ttl: std::time::Duration,
        margin: i64,
        gate: i32,
    ) -> Self {
        Self {
            store,
            cache: TtlCache::new(cache_ttl),
            margin,
            gate,
        }
    }

    async fn rules(&self) -> Result<Arc<Vec<IntentRule>>> {
        let store = self.store.clone();
        self.cache
            .get_with(|| async move { store.list_active_intent_rules().await })
            .await
    }

    pub async fn invalidate_rules(&self) {
        self.cache.invalidate().await;
    }

    /// Evaluate every intent rule against the event; new matches append
    /// monotonic signal rows (once per lead and rule), then the summary
    /// and confidence are recomputed and persisted on the lead.
    pub async fn process_event(
        &self,
        event: &MarketingEvent,
        lead: &Lead,
        organization: Option<&Organization>,
    ) -> Result<IntentOutcome> {
        let rules = self.rules().await?;
        let mut signals_added = 0usize;

        for rule in rules.iter().filter(|r| r.is_active) {
            if !rule.trigger.matches_event(event, lead, organization) {
                continue;
            }
            if self.store.intent_signal_exists(lead.id, rule.id).await? {
                continue;
            }
            self.store
                .insert_intent_signal(
                    lead.id,
                    rule.intent,
                    rule.id,
                    rule.confidence_points,
                    rule.trigger.trigger_type(),
                    Some(event.id),
                )
                .await?;
            signals_added += 1;
            debug!(
                lead = %lead.id,
                intent = rule.intent.as_str(),
                points = rule.confidence_points,
                "intent signal recorded"
            );
        }

        let summary = self.store.intent_summary(lead.id).await?;
        let calc = compute_confidence(&summary, self.margin, self.gate);

        self.store
            .update_lead_intent(lead.id, calc.primary, calc.confidence, &calc.summary)
            .await?;

        if signals_added > 0 {
            info!(
                lead = %lead.id,
                primary = calc.primary.map(|i| i.as_str()).unwrap_or("none"),
                confidence = calc.confidence,
                conflict = calc.conflict,
                "intent summary updated"
            );
        }

        Ok(IntentOutcome {
            signals_added,
            calc,
        })
    }

    /// Recompute from the ledger without processing an event (router path)
    pub async fn recompute_lead(&self, lead_id: uuid::Uuid) -> Result<IntentCalc> {
        let summary = self.store.intent_summary(lead_id).await?;
        let calc = compute_confidence(&summary, self.margin, self.gate);
        self.store
            .update_lead_intent(lead_id, calc.primary, calc.confidence, &calc.summary)
            .await?;
        Ok(calc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(entries: &[(&str, i64)]) -> IntentSummary {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_empty_summary_is_unroutable() {
        let calc = compute_confidence(&IntentSummary::new(), 15, 60);
        assert_eq!(calc.primary, None);
        assert_eq!(calc.confidence, 0);
        assert!(!calc.routable);
        assert!(!calc.conflict);
    }

    #[test]
    fn test_single_intent_dominates() {
        // research 65, no other evidence: 100% + dominance bonus capped
        let calc = compute_confidence(&summary(&[("research", 65)]), 15, 60);
        assert_eq!(calc.primary, Some(Intent::Research));
        assert_eq!(calc.confidence, 100);
        assert!(calc.routable);
        assert!(!calc.conflict);
    }

    #[test]
    fn test_conflict_within_margin() {
        // co_creation 40 vs research 30: diff 10 < 15
        let calc = compute_confidence(
            &summary(&[("co_creation", 40), ("research", 30), ("b2b", 25)]),
            15,
            60,
        );
        assert_eq!(calc.primary, Some(Intent::CoCreation));
        assert!(calc.conflict);
        assert!(!calc.routable);
        // round(40 * 100 / 95) = 42, no bonus, no penalty
        assert_eq!(calc.confidence, 42);
    }

    #[test]
    fn test_margin_exactly_at_boundary() {
        // diff exactly 15: dominance bonus applies, no conflict
        let calc = compute_confidence(&summary(&[("b2b", 45), ("research", 30)]), 15, 60);
        assert!(!calc.conflict);
        // round(45 * 100 / 75) = 60, +10 = 70
        assert_eq!(calc.confidence, 70);
        assert!(calc.routable);
    }

    #[test]
    fn test_confidence_exactly_at_gate() {
        // Construct confidence == 60 precisely: b2b 60 of total 100, secondary 40
        let calc = compute_confidence(&summary(&[("b2b", 60), ("research", 40)]), 15, 60);
        assert_eq!(calc.confidence, 70); // diff 20 >= 15 gives +10
        assert!(calc.routable);

        // Remove the bonus: diff below margin makes it a conflict instead
        let calc = compute_confidence(&summary(&[("b2b", 60), ("research", 50)]), 15, 60);
        assert!(calc.conflict);
        assert!(!calc.routable);
    }

    #[test]
    fn test_confidence_sixty_is_routable() {
        // research 50 of total 100, secondary 35: diff 15 gives the bonus,
        // round(50) + 10 lands exactly on the gate
        let calc = compute_confidence(
            &summary(&[("research", 50), ("b2b", 35), ("co_creation", 15)]),
            15,
            60,
        );
        assert_eq!(calc.confidence, 60);
        assert!(!calc.conflict);
        assert!(calc.routable);
    }

    #[test]
    fn test_low_evidence_penalty() {
        // b2b 25 alone: total 25 < 30 → round(100) + 10 capped, then -20
        let calc = compute_confidence(&summary(&[("b2b", 25)]), 15, 60);
        assert_eq!(calc.confidence, 80);
        assert!(calc.routable);

        // Tiny evidence with competition goes to zero, never negative
        let calc = compute_confidence(&summary(&[("b2b", 5), ("research", 4)]), 15, 60);
        assert_eq!(calc.primary, Some(Intent::B2b));
        // round(5 * 100 / 9) = 56, no bonus (diff 1), -20 = 36
        assert_eq!(calc.confidence, 36);
        assert!(calc.conflict);
    }

    #[test]
    fn test_negative_intermediate_clamps_to_zero() {
        // Equal small split: round(50) - 20 penalty, conflict anyway
        let calc = compute_confidence(&summary(&[("b2b", 3), ("research", 3)]), 15, 60);
        assert!(calc.confidence <= 30);
        assert!(calc.conflict);

        // Zero-sum edge
        let calc = compute_confidence(&summary(&[("b2b", 0)]), 15, 60);
        assert_eq!(calc.confidence, 0);
        assert_eq!(calc.primary, None);
    }

    #[test]
    fn test_lexicographic_tiebreak() {
        // b2b and research tied: "b2b" < "research" lexicographically
        let calc = compute_confidence(&summary(&[("research", 30), ("b2b", 30)]), 15, 60);
        assert_eq!(calc.primary, Some(Intent::B2b));
        assert_eq!(calc.secondary_points, 30);
        assert!(calc.conflict);
    }

    #[test]
    fn test_monotonic_append_never_decreases() {
        let base = summary(&[("research", 30), ("b2b", 20)]);
        let grown = summary(&[("research", 50), ("b2b", 20)]);
        let before = compute_confidence(&base, 15, 60);
        let after = compute_confidence(&grown, 15, 60);
        for (intent, points) in before.summary.iter() {
            assert!(after.summary.get(intent).copied().unwrap_or(0) >= *points);
        }
    }
}
