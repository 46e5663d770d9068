//! Owner assignment strategy resolution

use crate::domain::team::OwnerAssignment;
use crate::domain::{AssignmentStrategy, Role};

/// Who the router should notify after the routing transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentNotify {
    /// Assignment handled automatically; notify only on capacity miss
    None,
    /// A human must pick an owner
    AssignmentNeeded,
    /// Marketing manager channel, no assignment attempted
    MarketingManager,
}

/// Concrete plan derived from the per-intent assignment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentPlan {
    /// Role to auto-assign inside the routing transaction, when any
    pub role: Option<Role>,
    pub region_aware: bool,
    pub notify: AssignmentNotify,
}

/// Translate a policy into what the routing transaction should do.
/// `capacity_based` currently shares the round-robin mechanics: least
/// loaded active member under `max_leads`, ties broken by least recent
/// assignment.
pub fn plan_for(policy: OwnerAssignment) -> AssignmentPlan {
    match policy.strategy {
        AssignmentStrategy::RoundRobin | AssignmentStrategy::CapacityBased => AssignmentPlan {
            role: Some(policy.role),
            region_aware: policy.region_aware,
            notify: AssignmentNotify::None,
        },
        AssignmentStrategy::Manual => AssignmentPlan {
            role: None,
            region_aware: false,
            notify: AssignmentNotify::AssignmentNeeded,
        },
        AssignmentStrategy::NotifyOnly => AssignmentPlan {
            role: None,
            region_aware: false,
            notify: AssignmentNotify::MarketingManager,
        },
    }
}

/// Sales region for an organization country code. Members without a
/// region stay eligible everywhere.
pub fn region_for_country(country: Option<&str>) -> Option<String> {
    let country = country?.to_ascii_uppercase();
    let region = match country.as_str() {
        "DE" | "AT" | "CH" => "dach",
        "US" | "CA" | "MX" => "amer",
        "GB" | "FR" | "NL" | "BE" | "DK" | "SE" | "NO" | "FI" | "ES" | "IT" | "PL" | "IE" => {
            "emea"
        }
        _ => return None,
    };
    Some(region.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Intent;

    #[test]
    fn test_round_robin_assigns_role() {
        let plan = plan_for(OwnerAssignment::for_intent(Intent::Research));
        assert_eq!(plan.role, Some(Role::Bdr));
        assert_eq!(plan.notify, AssignmentNotify::None);
        assert!(plan.region_aware);
    }

    #[test]
    fn test_manual_strategy_defers_to_humans() {
        let plan = plan_for(OwnerAssignment::for_intent(Intent::CoCreation));
        assert_eq!(plan.role, None);
        assert_eq!(plan.notify, AssignmentNotify::AssignmentNeeded);
    }

    #[test]
    fn test_region_mapping() {
        assert_eq!(region_for_country(Some("de")).as_deref(), Some("dach"));
        assert_eq!(region_for_country(Some("US")).as_deref(), Some("amer"));
        assert_eq!(region_for_country(Some("FR")).as_deref(), Some("emea"));
        assert_eq!(region_for_country(Some("JP")), None);
        assert_eq!(region_for_country(None), None);
    }
}
