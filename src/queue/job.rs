use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::rules::MocoAction;
use crate::domain::IngestEvent;
use crate::outbound::Notification;

/// The five named queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Events,
    Routing,
    Sync,
    Scheduled,
    Notifications,
}

impl QueueName {
    pub const ALL: [QueueName; 5] = [
        QueueName::Events,
        QueueName::Routing,
        QueueName::Sync,
        QueueName::Scheduled,
        QueueName::Notifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Events => "events",
            QueueName::Routing => "routing",
            QueueName::Sync => "sync",
            QueueName::Scheduled => "scheduled",
            QueueName::Notifications => "notifications",
        }
    }
}

/// What caused a routing evaluation to be enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTrigger {
    EventProcessed,
    ManualEvaluate,
    ScheduledSweep,
}

/// Scheduled sweeps produced by the cron loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledJob {
    ScoreDecay,
    DailyDigest,
    TimeInStageSweep,
}

/// Job payloads carried on the queues
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    ProcessEvent {
        event: IngestEvent,
        /// Shared by all jobs of one bulk import
        batch_id: Option<Uuid>,
    },
    EvaluateRouting {
        lead_id: Uuid,
        trigger: RoutingTrigger,
    },
    SyncMoco {
        lead_id: Uuid,
        deal_id: Option<Uuid>,
        action: MocoAction,
    },
    Notify {
        notification: Notification,
    },
    RunScheduled {
        job: ScheduledJob,
    },
}

/// One unit of queued work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Dedup key within the queue, e.g. `route:{lead_id}`
    pub id: String,
    pub queue: QueueName,
    pub payload: JobPayload,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(queue: QueueName, id: String, payload: JobPayload) -> Self {
        Self {
            id,
            queue,
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Dedup key for routing evaluations: one pending job per lead
    pub fn routing_job_id(lead_id: Uuid) -> String {
        format!("route:{lead_id}")
    }
}

/// Terminal result a handler reports for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    /// Processed but intentionally without effect (duplicates, gates)
    Skipped(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_job_id_is_stable() {
        let lead = Uuid::nil();
        assert_eq!(
            Job::routing_job_id(lead),
            "route:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = JobPayload::EvaluateRouting {
            lead_id: Uuid::nil(),
            trigger: RoutingTrigger::EventProcessed,
        };
        let raw = serde_json::to_string(&payload).unwrap();
        assert!(raw.contains("evaluate_routing"));
        let back: JobPayload = serde_json::from_str(&raw).unwrap();
        match back {
            JobPayload::EvaluateRouting { trigger, .. } => {
                assert_eq!(trigger, RoutingTrigger::EventProcessed);
            }
            _ => panic!("wrong variant"),
        }
    }
}
