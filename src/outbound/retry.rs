use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{LeadflowError, Result};

/// Exponential backoff schedule for outbound calls: 1s, 2s, 4s plus up to
/// 250ms of jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1 << attempt.min(4));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=250));
    base + jitter
}

/// Run an outbound operation with up to `max_attempts` tries. Only
/// retryable errors (transient IO, conflicts) re-run; permanent
/// rejections surface immediately.
pub async fn with_retries<T, F, Fut>(op: &str, max_attempts: u32, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable() && attempt + 1 < max_attempts => {
                let delay = backoff_delay(attempt);
                warn!(
                    operation = op,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Classify an HTTP status from a downstream API per the propagation
/// policy: 429 and 5xx are transient, other 4xx are permanent.
pub fn classify_status(service: &'static str, status: reqwest::StatusCode, body: String) -> LeadflowError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        LeadflowError::TransientIo(format!("{service} returned {status}: {body}"))
    } else {
        LeadflowError::DownstreamRejected {
            service,
            reason: format!("{status}: {body}"),
        }
    }
}
