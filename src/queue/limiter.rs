use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket limiting job starts per second for one queue
pub struct TokenBucket {
    rate_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64) -> Self {
        Self {
            rate_per_sec,
            state: Mutex::new(BucketState {
                tokens: rate_per_sec,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Wait until one token is available, then take it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.refilled_at.elapsed().as_secs_f64();
                state.tokens =
                    (state.tokens + elapsed * self.rate_per_sec).min(self.rate_per_sec);
                state.refilled_at = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_capacity_then_throttled() {
        let bucket = TokenBucket::new(2.0);
        let start = Instant::now();
        // Two tokens available immediately
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
        // Third token needs ~500ms of refill at 2/sec
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(450));
    }
}
