use thiserror::Error;

/// Main error type for the lead pipeline
#[derive(Error, Debug)]
pub enum LeadflowError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Request validation
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // Uniqueness violations (email, external ids, deal upsert races)
    #[error("Conflict: {0}")]
    Conflict(String),

    // Inbound producer exceeded its request budget
    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Scoring rule hit its per-day or per-lead cap; logged, never surfaced
    #[error("Rule rate limited: {rule} for lead {lead_id}")]
    RateLimitedRule { rule: String, lead_id: uuid::Uuid },

    // Store/queue/HTTP timeouts and transport failures
    #[error("Transient IO failure: {0}")]
    TransientIo(String),

    // External API returned a permanent error (4xx other than 429)
    #[error("Downstream rejected: {service} - {reason}")]
    DownstreamRejected { service: &'static str, reason: String },

    // Internal assertion failed (e.g. total != sum of categories)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Queue closed: {0}")]
    QueueClosed(String),

    #[error("Job timed out after {elapsed_ms}ms")]
    JobTimeout { elapsed_ms: u64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for LeadflowError
pub type Result<T> = std::result::Result<T, LeadflowError>;

impl LeadflowError {
    /// Machine-readable error code carried in API bodies and job failures
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited(_) => "rate_limited",
            Self::RateLimitedRule { .. } => "rate_limited_rule",
            Self::TransientIo(_) | Self::JobTimeout { .. } => "transient_io",
            Self::DownstreamRejected { .. } => "downstream_rejected",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::Database(_) | Self::Migration(_) => "database",
            Self::Http(_) => "transient_io",
            Self::Json(_) => "validation",
            Self::Config(_) => "config",
            Self::QueueClosed(_) => "queue_closed",
            Self::Cancelled => "cancelled",
            _ => "internal",
        }
    }

    /// Whether a job failing with this error should be re-attempted.
    ///
    /// Conflicts are retried once by the caller that hit them; everything
    /// transient goes through the normal backoff schedule. Validation,
    /// auth, missing references and permanent downstream rejections are
    /// terminal.
    pub fn retryable(&self) -> bool {
        match self {
            Self::TransientIo(_)
            | Self::JobTimeout { .. }
            | Self::Http(_)
            | Self::Conflict(_)
            | Self::Cancelled => true,
            Self::Database(e) => !matches!(e, sqlx::Error::RowNotFound),
            Self::Validation(_)
            | Self::Unauthorized(_)
            | Self::NotFound { .. }
            | Self::RateLimitedRule { .. }
            | Self::DownstreamRejected { .. }
            | Self::InvariantViolation(_) => false,
            _ => false,
        }
    }

    /// True when a unique-constraint violation bubbled up from Postgres
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => db.code().as_deref() == Some("23505"),
            Self::Conflict(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LeadflowError::Validation("bad".into()).code(), "validation");
        assert_eq!(
            LeadflowError::Unauthorized("sig".into()).code(),
            "unauthorized"
        );
        assert_eq!(
            LeadflowError::NotFound {
                entity: "lead",
                id: "x".into()
            }
            .code(),
            "not_found"
        );
        assert_eq!(
            LeadflowError::InvariantViolation("total".into()).code(),
            "invariant_violation"
        );
    }

    #[test]
    fn test_retryability() {
        assert!(LeadflowError::TransientIo("timeout".into()).retryable());
        assert!(LeadflowError::Conflict("email".into()).retryable());
        assert!(!LeadflowError::Validation("shape".into()).retryable());
        assert!(!LeadflowError::DownstreamRejected {
            service: "moco",
            reason: "422".into()
        }
        .retryable());
        assert!(!LeadflowError::RateLimitedRule {
            rule: "pricing_page".into(),
            lead_id: uuid::Uuid::nil()
        }
        .retryable());
    }
}
