use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lead::Intent;

/// Sales/marketing role a team member holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Bdr,
    Ae,
    PartnershipManager,
    MarketingManager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Bdr => "bdr",
            Role::Ae => "ae",
            Role::PartnershipManager => "partnership_manager",
            Role::MarketingManager => "marketing_manager",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "bdr" => Ok(Role::Bdr),
            "ae" => Ok(Role::Ae),
            "partnership_manager" => Ok(Role::PartnershipManager),
            "marketing_manager" => Ok(Role::MarketingManager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// How an owner is picked for a routed lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    RoundRobin,
    CapacityBased,
    Manual,
    NotifyOnly,
}

impl AssignmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStrategy::RoundRobin => "round_robin",
            AssignmentStrategy::CapacityBased => "capacity_based",
            AssignmentStrategy::Manual => "manual",
            AssignmentStrategy::NotifyOnly => "notify_only",
        }
    }
}

impl TryFrom<&str> for AssignmentStrategy {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "round_robin" => Ok(AssignmentStrategy::RoundRobin),
            "capacity_based" => Ok(AssignmentStrategy::CapacityBased),
            "manual" => Ok(AssignmentStrategy::Manual),
            "notify_only" => Ok(AssignmentStrategy::NotifyOnly),
            other => Err(format!("unknown assignment strategy: {other}")),
        }
    }
}

/// Owner assignment policy per routed intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerAssignment {
    pub role: Role,
    pub strategy: AssignmentStrategy,
    pub region_aware: bool,
}

impl OwnerAssignment {
    /// Default assignment policy per intent: research leads go to BDRs
    /// round-robin, b2b to AEs by capacity, co-creation to partnership
    /// managers manually.
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::Research => OwnerAssignment {
                role: Role::Bdr,
                strategy: AssignmentStrategy::RoundRobin,
                region_aware: true,
            },
            Intent::B2b => OwnerAssignment {
                role: Role::Ae,
                strategy: AssignmentStrategy::CapacityBased,
                region_aware: true,
            },
            Intent::CoCreation => OwnerAssignment {
                role: Role::PartnershipManager,
                strategy: AssignmentStrategy::Manual,
                region_aware: false,
            },
        }
    }
}

/// A member of the sales/marketing team eligible for lead ownership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub region: Option<String>,
    pub is_active: bool,
    pub max_leads: i32,
    pub current_leads: i32,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TeamMember {
    pub fn has_capacity(&self) -> bool {
        self.is_active && self.current_leads < self.max_leads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_check() {
        let mut member = TeamMember {
            id: Uuid::new_v4(),
            email: "bdr@dna-me.de".to_string(),
            name: "Sam".to_string(),
            role: Role::Bdr,
            region: Some("dach".to_string()),
            is_active: true,
            max_leads: 2,
            current_leads: 1,
            last_assigned_at: None,
            created_at: Utc::now(),
        };
        assert!(member.has_capacity());
        member.current_leads = 2;
        assert!(!member.has_capacity());
        member.current_leads = 0;
        member.is_active = false;
        assert!(!member.has_capacity());
    }

    #[test]
    fn test_assignment_policy_per_intent() {
        let research = OwnerAssignment::for_intent(Intent::Research);
        assert_eq!(research.role, Role::Bdr);
        assert_eq!(research.strategy, AssignmentStrategy::RoundRobin);

        let b2b = OwnerAssignment::for_intent(Intent::B2b);
        assert_eq!(b2b.role, Role::Ae);

        let cc = OwnerAssignment::for_intent(Intent::CoCreation);
        assert_eq!(cc.strategy, AssignmentStrategy::Manual);
    }
}
