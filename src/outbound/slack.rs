//! Slack webhook notifications
//!
//! Builds Block Kit payloads for the pipeline's canonical messages and
//! posts them to the configured incoming webhook.

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::SlackConfig;
use crate::error::Result;
use crate::outbound::retry::{classify_status, with_retries};
use crate::outbound::Notification;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;

/// Slack notification client
#[derive(Clone)]
pub struct SlackNotifier {
    client: Client,
    config: SlackConfig,
}

impl SlackNotifier {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }

    /// Send one notification; disabled transport is a silent no-op
    pub async fn send(&self, notification: &Notification) -> Result<()> {
        if !self.is_enabled() {
            debug!(kind = notification.kind(), "slack disabled, dropping notification");
            return Ok(());
        }

        let payload = build_payload(notification, &self.config);
        with_retries("slack_webhook", MAX_ATTEMPTS, || async {
            let response = self
                .client
                .post(&self.config.webhook_url)
                .json(&payload)
                .send()
                .await?;
            if response.status().is_success() {
                Ok(())
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(kind = notification.kind(), %status, "slack webhook rejected message");
                Err(classify_status("slack", status, body))
            }
        })
        .await
    }
}

fn header(text: &str) -> Value {
    json!({ "type": "header", "text": { "type": "plain_text", "text": text, "emoji": true } })
}

fn section(markdown: String) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": markdown } })
}

fn button(text: &str, action_id: String, style: Option<&str>) -> Value {
    let mut btn = json!({
        "type": "button",
        "text": { "type": "plain_text", "text": text, "emoji": true },
        "action_id": action_id
    });
    if let Some(style) = style {
        btn["style"] = json!(style);
    }
    btn
}

/// Build the Block Kit payload for a notification
pub fn build_payload(notification: &Notification, config: &SlackConfig) -> Value {
    match notification {
        Notification::HotLead {
            lead_id,
            name,
            email,
            total_score,
            primary_intent,
            confidence,
            job_title,
        } => json!({
            "channel": config.hot_leads_channel,
            "blocks": [
                header("🔥 Hot lead"),
                section(format!(
                    "*{name}* ({email})\nScore *{total_score}* · Intent *{}* ({confidence}%)\n{}",
                    primary_intent.as_deref().unwrap_or("unclassified"),
                    job_title.as_deref().unwrap_or("—"),
                )),
                json!({ "type": "actions", "elements": [
                    button("Open lead", format!("open_lead:{lead_id}"), Some("primary")),
                    button("Call now", format!("call_lead:{lead_id}"), None),
                ]})
            ]
        }),
        Notification::RoutingConflict {
            lead_id,
            name,
            email,
            summary,
        } => {
            let points = |intent: &str| summary.get(intent).copied().unwrap_or(0);
            json!({
                "channel": config.routing_channel,
                "blocks": [
                    header("⚖️ Routing conflict"),
                    section(format!(
                        "*{name}* ({email})\nresearch *{}* · b2b *{}* · co_creation *{}*",
                        points("research"), points("b2b"), points("co_creation"),
                    )),
                    json!({ "type": "actions", "elements": [
                        button("Research", format!("route:{lead_id}:research"), None),
                        button("B2B", format!("route:{lead_id}:b2b"), None),
                        button("Co-creation", format!("route:{lead_id}:co_creation"), None),
                    ]})
                ]
            })
        }
        Notification::AssignmentNeeded {
            lead_id,
            name,
            pipeline,
        } => json!({
            "channel": config.routing_channel,
            "blocks": [
                header("👤 Assignment needed"),
                section(format!("*{name}* routed to *{pipeline}* without an owner")),
                json!({ "type": "actions", "elements": [
                    button("Assign", format!("assign_lead:{lead_id}"), Some("primary")),
                ]})
            ]
        }),
        Notification::StuckLead {
            lead_id,
            name,
            email,
            days_in_pool,
            total_score,
            confidence,
        } => json!({
            "channel": config.routing_channel,
            "blocks": [
                header("🕰 Stuck in pool"),
                section(format!(
                    "*{name}* ({email}) waited *{days_in_pool}* days\nScore {total_score} · Confidence {confidence}% — moved to discovery",
                )),
                json!({ "type": "actions", "elements": [
                    button("Open lead", format!("open_lead:{lead_id}"), Some("primary")),
                ]})
            ]
        }),
        Notification::LeadRouted {
            lead_id,
            name,
            email,
            total_score,
            primary_intent,
            confidence,
            job_title,
            pipeline,
            assignee,
        } => json!({
            "channel": config.hot_leads_channel,
            "blocks": [
                header("🎯 Lead routed"),
                section(format!(
                    "*{name}* ({email})\nScore *{total_score}* · Intent *{}* ({confidence}%)\n{}\nPipeline *{pipeline}* → {}",
                    primary_intent.as_deref().unwrap_or("unclassified"),
                    job_title.as_deref().unwrap_or("—"),
                    assignee.as_deref().unwrap_or("unassigned"),
                )),
                json!({ "type": "actions", "elements": [
                    button("Open lead", format!("open_lead:{lead_id}"), Some("primary")),
                    button("Call now", format!("call_lead:{lead_id}"), None),
                ]})
            ]
        }),
        Notification::DailyDigest {
            new_leads,
            hot_leads,
            deals_created,
            deals_won,
            open_pipeline_value,
            top_sources,
        } => {
            let sources = top_sources
                .iter()
                .map(|(source, count)| format!("• {source}: {count}"))
                .collect::<Vec<_>>()
                .join("\n");
            json!({
                "channel": config.routing_channel,
                "blocks": [
                    header("📬 Daily digest"),
                    section(format!(
                        "New leads *{new_leads}* · Hot *{hot_leads}*\nDeals created *{deals_created}* · won *{deals_won}*\nOpen pipeline *{open_pipeline_value} EUR*",
                    )),
                    section(if sources.is_empty() {
                        "No events in the last 24h".to_string()
                    } else {
                        format!("*Top sources*\n{sources}")
                    }),
                ]
            })
        }
        Notification::DecaySummary {
            expired_count,
            leads_updated,
            execution_time_ms,
        } => json!({
            "channel": config.routing_channel,
            "blocks": [
                header("🍂 Score decay"),
                section(format!(
                    "Expired *{expired_count}* ledger rows across *{leads_updated}* leads in {execution_time_ms} ms",
                )),
            ]
        }),
        Notification::JobFailed {
            queue,
            job_id,
            error,
        } => json!({
            "channel": config.routing_channel,
            "blocks": [
                header("🚨 Job failed"),
                section(format!("Queue *{queue}* · job `{job_id}`\n```{error}```")),
            ]
        }),
        Notification::Custom { channel, text } => json!({
            "channel": channel.clone().unwrap_or_else(|| config.routing_channel.clone()),
            "blocks": [section(text.clone())]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IntentSummary;
    use uuid::Uuid;

    fn config() -> SlackConfig {
        SlackConfig {
            enabled: true,
            webhook_url: "https://hooks.slack.invalid/services/T/B/X".to_string(),
            bot_token: String::new(),
            hot_leads_channel: "#hot-leads".to_string(),
            routing_channel: "#lead-routing".to_string(),
        }
    }

    #[test]
    fn test_hot_lead_payload_has_two_buttons() {
        let payload = build_payload(
            &Notification::HotLead {
                lead_id: Uuid::nil(),
                name: "Ada Lovelace".to_string(),
                email: "ada@uni-test.edu".to_string(),
                total_score: 95,
                primary_intent: Some("research".to_string()),
                confidence: 88,
                job_title: Some("PI".to_string()),
            },
            &config(),
        );
        assert_eq!(payload["channel"], "#hot-leads");
        let actions = payload["blocks"][2]["elements"].as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["style"], "primary");
    }

    #[test]
    fn test_conflict_payload_carries_route_actions() {
        let lead_id = Uuid::new_v4();
        let mut summary = IntentSummary::new();
        summary.insert("research".to_string(), 30);
        summary.insert("co_creation".to_string(), 40);
        summary.insert("b2b".to_string(), 25);

        let payload = build_payload(
            &Notification::RoutingConflict {
                lead_id,
                name: "Sam".to_string(),
                email: "sam@biotech-corp.com".to_string(),
                summary,
            },
            &config(),
        );
        let actions = payload["blocks"][2]["elements"].as_array().unwrap();
        assert_eq!(actions.len(), 3);
        let ids: Vec<String> = actions
            .iter()
            .map(|a| a["action_id"].as_str().unwrap().to_string())
            .collect();
        assert!(ids.contains(&format!("route:{lead_id}:research")));
        assert!(ids.contains(&format!("route:{lead_id}:b2b")));
        assert!(ids.contains(&format!("route:{lead_id}:co_creation")));
        // Per-intent points appear in the body
        let text = payload["blocks"][1]["text"]["text"].as_str().unwrap();
        assert!(text.contains("research *30*"));
        assert!(text.contains("co_creation *40*"));
    }

    #[test]
    fn test_digest_payload_lists_sources() {
        let payload = build_payload(
            &Notification::DailyDigest {
                new_leads: 12,
                hot_leads: 3,
                deals_created: 4,
                deals_won: 1,
                open_pipeline_value: "125000.00".to_string(),
                top_sources: vec![("portal".to_string(), 40), ("website".to_string(), 22)],
            },
            &config(),
        );
        let text = payload["blocks"][2]["text"]["text"].as_str().unwrap();
        assert!(text.contains("portal: 40"));
        assert!(text.contains("website: 22"));
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_noop() {
        let notifier = SlackNotifier::new(SlackConfig::default());
        assert!(!notifier.is_enabled());
        notifier
            .send(&Notification::Custom {
                channel: None,
                text: "hello".to_string(),
            })
            .await
            .unwrap();
    }
}
