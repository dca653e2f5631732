//! Client-side rate limiting
//!
//! An injectable limiter consulted before every backend request. The default
//! deployment runs without one; operators who share an app registration
//! across agents can enable the token bucket in config.

use crate::api::error::ApiError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Resolves when the next request may proceed.
    async fn check_limit(&self) -> Result<(), ApiError>;
}

/// Token bucket: `requests_per_minute` sustained, `burst_capacity` peak.
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketLimiter {
    pub fn new(requests_per_minute: u32, burst_capacity: u32) -> Self {
        let capacity = burst_capacity.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: f64::from(requests_per_minute.max(1)) / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn check_limit(&self) -> Result<(), ApiError> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };

            tracing::debug!("rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}
