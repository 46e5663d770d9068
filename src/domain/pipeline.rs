use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sales-methodology stage classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    Awareness,
    Interest,
    Consideration,
    Evaluation,
    Decision,
    ClosedWon,
    ClosedLost,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Awareness => "awareness",
            StageType::Interest => "interest",
            StageType::Consideration => "consideration",
            StageType::Evaluation => "evaluation",
            StageType::Decision => "decision",
            StageType::ClosedWon => "closed_won",
            StageType::ClosedLost => "closed_lost",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageType::ClosedWon | StageType::ClosedLost)
    }
}

impl TryFrom<&str> for StageType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "awareness" => Ok(StageType::Awareness),
            "interest" => Ok(StageType::Interest),
            "consideration" => Ok(StageType::Consideration),
            "evaluation" => Ok(StageType::Evaluation),
            "decision" => Ok(StageType::Decision),
            "closed_won" => Ok(StageType::ClosedWon),
            "closed_lost" => Ok(StageType::ClosedLost),
            other => Err(format!("unknown stage type: {other}")),
        }
    }
}

/// Sales pipeline a routed lead lives in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub sales_cycle_days: i32,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Ordered stage within a pipeline. Positions are unique and dense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub slug: String,
    pub name: String,
    pub position: i32,
    pub stage_type: StageType,
    /// Automation rule ids to evaluate for deals entering this stage
    #[serde(default)]
    pub automation_rule_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Open,
    Won,
    Lost,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Open => "open",
            DealStatus::Won => "won",
            DealStatus::Lost => "lost",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DealStatus::Open)
    }
}

impl TryFrom<&str> for DealStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "open" => Ok(DealStatus::Open),
            "won" => Ok(DealStatus::Won),
            "lost" => Ok(DealStatus::Lost),
            other => Err(format!("unknown deal status: {other}")),
        }
    }
}

/// Lead x pipeline pair representing an active sales opportunity.
/// Unique per (lead_id, pipeline_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub name: String,
    pub value: Option<Decimal>,
    pub currency: String,
    pub status: DealStatus,
    pub stage_entered_at: DateTime<Utc>,
    pub assigned_to: Option<Uuid>,
    pub assigned_region: Option<String>,
    pub moco_offer_id: Option<String>,
    pub moco_invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deal name shown to sales: "{first} {last} — {pipeline}"
pub fn deal_name(lead_display_name: &str, pipeline_name: &str) -> String {
    format!("{lead_display_name} — {pipeline_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_type_terminality() {
        assert!(StageType::ClosedWon.is_terminal());
        assert!(StageType::ClosedLost.is_terminal());
        assert!(!StageType::Awareness.is_terminal());
    }

    #[test]
    fn test_deal_name_format() {
        assert_eq!(
            deal_name("Ada Lovelace", "Research Lab"),
            "Ada Lovelace — Research Lab"
        );
    }

    #[test]
    fn test_deal_status_round_trip() {
        for status in [DealStatus::Open, DealStatus::Won, DealStatus::Lost] {
            assert_eq!(DealStatus::try_from(status.as_str()).unwrap(), status);
        }
    }
}
