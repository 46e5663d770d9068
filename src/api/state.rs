use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::automation::AutomationEngine;
use crate::config::AppConfig;
use crate::error::{LeadflowError, Result};
use crate::intent::IntentDetector;
use crate::queue::JobQueues;
use crate::routing::PipelineRouter;
use crate::scoring::ScoringEngine;
use crate::store::PostgresStore;

/// Fixed-window request counter per producer source
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started: Instant,
    count: u32,
}

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PostgresStore>,
    pub queues: JobQueues,
    pub router: Arc<PipelineRouter>,
    pub scoring: Arc<ScoringEngine>,
    pub intent: Arc<IntentDetector>,
    pub automation: Arc<AutomationEngine>,
    pub config: Arc<AppConfig>,
    pub start_time: DateTime<Utc>,
    rate_windows: Arc<DashMap<String, RateWindow>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<PostgresStore>,
        queues: JobQueues,
        router: Arc<PipelineRouter>,
        scoring: Arc<ScoringEngine>,
        intent: Arc<IntentDetector>,
        automation: Arc<AutomationEngine>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            queues,
            router,
            scoring,
            intent,
            automation,
            config,
            start_time: Utc::now(),
            rate_windows: Arc::new(DashMap::new()),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }

    /// Fixed-window inbound rate limit per producer source
    pub fn check_rate_limit(&self, source: &str) -> Result<()> {
        let window = std::time::Duration::from_millis(self.config.rate_limit.time_window_ms);
        let max = self.config.rate_limit.max;
        let now = Instant::now();

        let mut entry = self
            .rate_windows
            .entry(source.to_string())
            .or_insert(RateWindow {
                started: now,
                count: 0,
            });
        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }
        if entry.count >= max {
            return Err(LeadflowError::RateLimited(format!(
                "source {source} exceeded {max} requests per window"
            )));
        }
        entry.count += 1;
        Ok(())
    }
}
