use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rules::conditions::{EventCondition, RuleCondition};

use super::lead::{Intent, ScoreCategory};
use super::team::{AssignmentStrategy, Role};

/// How a scoring rule is triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Event,
    Field,
    Threshold,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Event => "event",
            RuleType::Field => "field",
            RuleType::Threshold => "threshold",
        }
    }
}

impl TryFrom<&str> for RuleType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "event" => Ok(RuleType::Event),
            "field" => Ok(RuleType::Field),
            "threshold" => Ok(RuleType::Threshold),
            other => Err(format!("unknown rule type: {other}")),
        }
    }
}

/// Versioned scoring configuration row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRule {
    pub id: Uuid,
    /// Unique handle, stable across versions
    pub slug: String,
    pub name: String,
    pub category: ScoreCategory,
    pub rule_type: RuleType,
    pub conditions: RuleCondition,
    /// May be negative (e.g. unsubscribe)
    pub points: i32,
    /// Cap within a rolling 24h window
    pub max_per_day: Option<i32>,
    /// Lifetime cap per lead
    pub max_per_lead: Option<i32>,
    /// Days until the awarded points expire
    pub decay_days: Option<i32>,
    pub priority: i32,
    pub is_active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Intent detection configuration row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRule {
    pub id: Uuid,
    pub intent: Intent,
    pub trigger: RuleCondition,
    pub confidence_points: i64,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// What fires an automation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Event,
    ScoreThreshold,
    IntentDetected,
    TimeInStage,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Event => "event",
            TriggerType::ScoreThreshold => "score_threshold",
            TriggerType::IntentDetected => "intent_detected",
            TriggerType::TimeInStage => "time_in_stage",
        }
    }
}

impl TryFrom<&str> for TriggerType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "event" => Ok(TriggerType::Event),
            "score_threshold" => Ok(TriggerType::ScoreThreshold),
            "intent_detected" => Ok(TriggerType::IntentDetected),
            "time_in_stage" => Ok(TriggerType::TimeInStage),
            other => Err(format!("unknown trigger type: {other}")),
        }
    }
}

/// Trigger payload stored as JSONB alongside the trigger type column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutomationTrigger {
    /// Same matcher as event-typed scoring rules
    Event { condition: EventCondition },
    /// Fires when the total crosses the threshold upward in one cycle
    ScoreThreshold { threshold: i32 },
    /// Fires once per lead when the primary intent reaches the gate
    IntentDetected { intent: Intent, confidence_gte: i32 },
    /// Evaluated by the daily sweep, not the event path
    TimeInStage { stage_slug: String, days: i64 },
}

impl AutomationTrigger {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            AutomationTrigger::Event { .. } => TriggerType::Event,
            AutomationTrigger::ScoreThreshold { .. } => TriggerType::ScoreThreshold,
            AutomationTrigger::IntentDetected { .. } => TriggerType::IntentDetected,
            AutomationTrigger::TimeInStage { .. } => TriggerType::TimeInStage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    MoveToStage,
    AssignOwner,
    SendNotification,
    CreateTask,
    SyncMoco,
    UpdateField,
    RouteToPipeline,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::MoveToStage => "move_to_stage",
            ActionType::AssignOwner => "assign_owner",
            ActionType::SendNotification => "send_notification",
            ActionType::CreateTask => "create_task",
            ActionType::SyncMoco => "sync_moco",
            ActionType::UpdateField => "update_field",
            ActionType::RouteToPipeline => "route_to_pipeline",
        }
    }
}

/// Moco operations an automation rule may enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MocoAction {
    CreateCustomer,
    CreateOffer,
    CreateInvoice,
}

impl MocoAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MocoAction::CreateCustomer => "create_customer",
            MocoAction::CreateOffer => "create_offer",
            MocoAction::CreateInvoice => "create_invoice",
        }
    }
}

/// Action payload stored as JSONB alongside the action type column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutomationAction {
    MoveToStage {
        stage_slug: String,
    },
    AssignOwner {
        role: Role,
        strategy: AssignmentStrategy,
        #[serde(default)]
        region_aware: bool,
    },
    SendNotification {
        /// Supports {lead.*} and {deal.*} placeholders
        template: String,
        #[serde(default)]
        channel: Option<String>,
    },
    CreateTask {
        title_template: String,
        #[serde(default)]
        description_template: Option<String>,
        task_type: String,
        due_days: i64,
        #[serde(default)]
        assign_role: Option<Role>,
    },
    SyncMoco {
        action: MocoAction,
    },
    UpdateField {
        field: String,
        value: serde_json::Value,
    },
    RouteToPipeline {
        pipeline_slug: String,
        #[serde(default = "default_create_deal")]
        create_deal: bool,
    },
}

fn default_create_deal() -> bool {
    true
}

impl AutomationAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            AutomationAction::MoveToStage { .. } => ActionType::MoveToStage,
            AutomationAction::AssignOwner { .. } => ActionType::AssignOwner,
            AutomationAction::SendNotification { .. } => ActionType::SendNotification,
            AutomationAction::CreateTask { .. } => ActionType::CreateTask,
            AutomationAction::SyncMoco { .. } => ActionType::SyncMoco,
            AutomationAction::UpdateField { .. } => ActionType::UpdateField,
            AutomationAction::RouteToPipeline { .. } => ActionType::RouteToPipeline,
        }
    }

    /// Fields `update_field` may touch. Everything else is rejected at
    /// execution time.
    pub const UPDATABLE_FIELDS: [&'static str; 3] = ["status", "lifecycle_stage", "primary_intent"];
}

/// Configured automation rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub trigger: AutomationTrigger,
    pub action: AutomationAction,
    pub priority: i32,
    /// Optional scoping to one pipeline/stage
    pub pipeline_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub is_active: bool,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub execution_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_round_trip() {
        let trigger: AutomationTrigger = serde_json::from_value(json!({
            "type": "score_threshold",
            "threshold": 80
        }))
        .unwrap();
        assert_eq!(trigger, AutomationTrigger::ScoreThreshold { threshold: 80 });
        assert_eq!(trigger.trigger_type(), TriggerType::ScoreThreshold);

        let intent: AutomationTrigger = serde_json::from_value(json!({
            "type": "intent_detected",
            "intent": "b2b",
            "confidence_gte": 70
        }))
        .unwrap();
        assert_eq!(intent.trigger_type(), TriggerType::IntentDetected);
    }

    #[test]
    fn test_action_round_trip() {
        let action: AutomationAction = serde_json::from_value(json!({
            "type": "create_task",
            "title_template": "Call {lead.first_name} about the demo",
            "task_type": "call",
            "due_days": 2
        }))
        .unwrap();
        assert_eq!(action.action_type(), ActionType::CreateTask);

        let route: AutomationAction = serde_json::from_value(json!({
            "type": "route_to_pipeline",
            "pipeline_slug": "discovery"
        }))
        .unwrap();
        // create_deal defaults to true
        assert_eq!(
            route,
            AutomationAction::RouteToPipeline {
                pipeline_slug: "discovery".to_string(),
                create_deal: true
            }
        );
    }

    #[test]
    fn test_update_field_allow_list() {
        assert!(AutomationAction::UPDATABLE_FIELDS.contains(&"lifecycle_stage"));
        assert!(!AutomationAction::UPDATABLE_FIELDS.contains(&"email"));
    }
}
