use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub moco: MocoConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP surface
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Runtime environment: development, production or test
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool; defaults to 2x total worker concurrency
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    48
}

/// Per-queue worker tuning. Defaults follow the production sizing:
/// events 10@100/s, routing 5@50/s, sync 3@10/s, scheduled 1, notifications 5.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Reserved for an external queue store; in-process queues ignore it
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_events_worker")]
    pub events: WorkerConfig,
    #[serde(default = "default_routing_worker")]
    pub routing: WorkerConfig,
    #[serde(default = "default_sync_worker")]
    pub sync: WorkerConfig,
    #[serde(default = "default_scheduled_worker")]
    pub scheduled: WorkerConfig,
    #[serde(default = "default_notifications_worker")]
    pub notifications: WorkerConfig,
    /// Max attempts before a job lands in the durable failed set
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            events: default_events_worker(),
            routing: default_routing_worker(),
            sync: default_sync_worker(),
            scheduled: default_scheduled_worker(),
            notifications: default_notifications_worker(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl QueueConfig {
    /// Sum of configured worker concurrency across all queues
    pub fn total_concurrency(&self) -> u32 {
        self.events.concurrency
            + self.routing.concurrency
            + self.sync.concurrency
            + self.scheduled.concurrency
            + self.notifications.concurrency
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: u32,
    /// Rate cap in jobs per second (0 = unlimited)
    #[serde(default)]
    pub jobs_per_sec: u32,
    /// Per-job deadline in seconds
    pub job_timeout_secs: u64,
}

fn default_events_worker() -> WorkerConfig {
    WorkerConfig {
        concurrency: 10,
        jobs_per_sec: 100,
        job_timeout_secs: 30,
    }
}

fn default_routing_worker() -> WorkerConfig {
    WorkerConfig {
        concurrency: 5,
        jobs_per_sec: 50,
        job_timeout_secs: 15,
    }
}

fn default_sync_worker() -> WorkerConfig {
    WorkerConfig {
        concurrency: 3,
        jobs_per_sec: 10,
        job_timeout_secs: 60,
    }
}

fn default_scheduled_worker() -> WorkerConfig {
    WorkerConfig {
        concurrency: 1,
        jobs_per_sec: 0,
        job_timeout_secs: 600,
    }
}

fn default_notifications_worker() -> WorkerConfig {
    WorkerConfig {
        concurrency: 5,
        jobs_per_sec: 0,
        job_timeout_secs: 30,
    }
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Secret for admin JWT issuance (owned by the admin surface)
    pub jwt_secret: String,
    /// Fallback HMAC secret for webhook producers without a per-source key
    pub webhook_secret: String,
    /// Per-source HMAC secrets as "key:source" pairs
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl SecurityConfig {
    /// Resolve the HMAC secret for a producer source.
    /// Falls back to the shared webhook secret when no per-source key is set.
    pub fn secret_for_source(&self, source: &str) -> &str {
        for pair in &self.api_keys {
            if let Some((key, src)) = pair.split_once(':') {
                if src == source {
                    return key;
                }
            }
        }
        &self.webhook_secret
    }

    /// Map of source -> key (used by validation and the admin surface)
    pub fn source_keys(&self) -> HashMap<&str, &str> {
        self.api_keys
            .iter()
            .filter_map(|pair| pair.split_once(':').map(|(k, s)| (s, k)))
            .collect()
    }
}

/// Thresholds driving the router and scoring tier logic
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Minimum total score before routing is considered
    #[serde(default = "default_min_score")]
    pub min_score: i32,
    /// Intent confidence gate for automatic routing
    #[serde(default = "default_confidence_gate")]
    pub confidence_gate: i32,
    /// Margin under which primary/secondary intent counts as a conflict
    #[serde(default = "default_intent_margin")]
    pub intent_margin: i64,
    /// Days in the Global Pool before a lead is escalated as stuck
    #[serde(default = "default_stuck_after_days")]
    pub stuck_after_days: i64,
    /// TTL for the in-process rule caches in seconds
    #[serde(default = "default_rule_cache_ttl")]
    pub rule_cache_ttl_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            confidence_gate: default_confidence_gate(),
            intent_margin: default_intent_margin(),
            stuck_after_days: default_stuck_after_days(),
            rule_cache_ttl_secs: default_rule_cache_ttl(),
        }
    }
}

fn default_min_score() -> i32 {
    40
}

fn default_confidence_gate() -> i32 {
    60
}

fn default_intent_margin() -> i64 {
    15
}

fn default_stuck_after_days() -> i64 {
    14
}

fn default_rule_cache_ttl() -> u64 {
    60
}

/// Daily job times, expressed as local hours (0-23)
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_decay_hour")]
    pub decay_hour: u32,
    #[serde(default = "default_digest_hour")]
    pub digest_hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            decay_hour: default_decay_hour(),
            digest_hour: default_digest_hour(),
        }
    }
}

fn default_decay_hour() -> u32 {
    2
}

fn default_digest_hour() -> u32 {
    8
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MocoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub subdomain: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub bot_token: String,
    /// Channel for hot-lead alerts
    #[serde(default = "default_hot_leads_channel")]
    pub hot_leads_channel: String,
    /// Channel for routing conflicts and manual review
    #[serde(default = "default_routing_channel")]
    pub routing_channel: String,
}

fn default_hot_leads_channel() -> String {
    "#hot-leads".to_string()
}

fn default_routing_channel() -> String {
    "#lead-routing".to_string()
}

/// SMTP transport consumed by the email-sequence surface; carried in
/// config so one deployment artifact serves both services.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub moco_sync: bool,
    #[serde(default = "default_true")]
    pub slack_alerts: bool,
    #[serde(default = "default_true")]
    pub score_decay: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            moco_sync: true,
            slack_alerts: true,
            score_decay: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Inbound HTTP rate limiting (per producer source)
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_max")]
    pub max: u32,
    #[serde(default = "default_rate_limit_window_ms")]
    pub time_window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max: default_rate_limit_max(),
            time_window_ms: default_rate_limit_window_ms(),
        }
    }
}

fn default_rate_limit_max() -> u32 {
    300
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Optional log file path (daily rotation)
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from either a config directory or a single TOML file
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref();

        let mut builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", default_max_connections() as i64)?;

        // Accept either a config directory (`config/`) or a single TOML file
        if config_path.is_file() {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::from(config_path.join("default.toml")).required(false))
                .add_source(
                    File::from(config_path.join(
                        std::env::var("LEADFLOW_ENV").unwrap_or_else(|_| "development".to_string()),
                    ))
                    .required(false),
                );
        }

        builder = builder.add_source(
            // Override with environment variables (LEADFLOW_DATABASE__URL, etc.)
            Environment::with_prefix("LEADFLOW")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("security.api_keys")
                .try_parsing(true),
        );

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Validate configuration values. Refuses to boot on violations.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !["development", "production", "test"].contains(&self.server.environment.as_str()) {
            errors.push(format!(
                "server.environment must be development, production or test, got \"{}\"",
                self.server.environment
            ));
        }

        if self.security.jwt_secret.len() < 32 {
            errors.push("security.jwt_secret must be at least 32 characters".to_string());
        }

        if self.security.webhook_secret.len() < 16 {
            errors.push("security.webhook_secret must be at least 16 characters".to_string());
        }

        for pair in &self.security.api_keys {
            if pair.split_once(':').is_none() {
                errors.push(format!(
                    "security.api_keys entries must be \"key:source\" pairs, got \"{pair}\""
                ));
            }
        }

        if self.schedule.decay_hour > 23 || self.schedule.digest_hour > 23 {
            errors.push("schedule hours must be 0-23".to_string());
        }

        if self.routing.confidence_gate < 0 || self.routing.confidence_gate > 100 {
            errors.push("routing.confidence_gate must be 0-100".to_string());
        }

        if self.queue.total_concurrency() == 0 {
            errors.push("queue concurrency must be non-zero".to_string());
        }

        if self.moco.enabled && self.features.moco_sync {
            if self.moco.api_key.is_empty() || self.moco.subdomain.is_empty() {
                errors.push("moco.api_key and moco.subdomain are required when moco is enabled".to_string());
            }
        }

        if self.slack.enabled && self.features.slack_alerts && self.slack.webhook_url.is_empty() {
            errors.push("slack.webhook_url is required when slack is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_string(&[
            "LEADFLOW_DATABASE__URL",
            "LEADFLOW_DATABASE_URL",
            "DATABASE_URL",
        ]) {
            self.database.url = v;
        }

        if let Some(v) = env_string(&["LEADFLOW_REDIS_URL", "REDIS_URL"]) {
            self.queue.redis_url = Some(v);
        }

        if let Some(v) = env_string(&["LEADFLOW_WEBHOOK_SECRET", "WEBHOOK_SECRET"]) {
            self.security.webhook_secret = v;
        }

        if let Some(v) = env_string(&["LEADFLOW_JWT_SECRET", "JWT_SECRET"]) {
            self.security.jwt_secret = v;
        }

        if let Some(v) = env_string(&["LEADFLOW_PORT", "PORT"]).and_then(|raw| raw.parse().ok()) {
            self.server.port = v;
        }

        if let Some(v) = env_string(&["LEADFLOW_LOG_LEVEL", "LOG_LEVEL"]) {
            self.logging.level = v;
        }
    }
}

fn env_string(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(v) = std::env::var(key) {
            if !v.trim().is_empty() {
                return Some(v);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/leadflow".to_string(),
                max_connections: 48,
            },
            queue: QueueConfig::default(),
            security: SecurityConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                webhook_secret: "0123456789abcdef".to_string(),
                api_keys: vec!["portalkey:portal".to_string(), "waalkey:waalaxy".to_string()],
            },
            routing: RoutingConfig::default(),
            schedule: ScheduleConfig::default(),
            moco: MocoConfig::default(),
            slack: SlackConfig::default(),
            smtp: None,
            features: FeatureFlags::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_short_secrets_rejected() {
        let mut cfg = base_config();
        cfg.security.webhook_secret = "short".to_string();
        cfg.security.jwt_secret = "short".to_string();
        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_secret_for_source() {
        let cfg = base_config();
        assert_eq!(cfg.security.secret_for_source("portal"), "portalkey");
        assert_eq!(cfg.security.secret_for_source("waalaxy"), "waalkey");
        // Unknown source falls back to shared secret
        assert_eq!(
            cfg.security.secret_for_source("lemlist"),
            "0123456789abcdef"
        );
    }

    #[test]
    fn test_malformed_api_key_pair_rejected() {
        let mut cfg = base_config();
        cfg.security.api_keys.push("no-colon-here".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_worker_defaults_match_sizing() {
        let q = QueueConfig::default();
        assert_eq!(q.events.concurrency, 10);
        assert_eq!(q.events.jobs_per_sec, 100);
        assert_eq!(q.routing.concurrency, 5);
        assert_eq!(q.sync.concurrency, 3);
        assert_eq!(q.scheduled.concurrency, 1);
        assert_eq!(q.notifications.concurrency, 5);
        assert_eq!(q.total_concurrency(), 24);
    }

    #[test]
    fn test_enabled_moco_requires_credentials() {
        let mut cfg = base_config();
        cfg.moco.enabled = true;
        assert!(cfg.validate().is_err());
        cfg.moco.api_key = "key".to_string();
        cfg.moco.subdomain = "dna-me".to_string();
        assert!(cfg.validate().is_ok());
    }
}
