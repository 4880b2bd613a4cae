#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-ratelimit** – a token-bucket gate in front of the
//! advisory LLM client.
//!
//! The bucket starts full and is topped up by a background task rather
//! than computed lazily on each check, the same split this codebase's
//! rate limiter uses between the algorithm (`algorithms.rs`) and its
//! storage sweep (`storage.rs`): one task owns time-based mutation, the
//! data path only ever takes a lock for a bounded instant.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors the rate limiter can surface.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The caller's cancellation token fired while waiting for a token.
    #[error("rate limit wait cancelled")]
    Cancelled,
}

/// A token-bucket limiter. Capacity and refill rate are both derived from
/// a requests-per-minute figure: refill period = 60s / rpm, one token per
/// period, capped at `rpm` tokens banked.
pub struct RateLimiter {
    tokens: Mutex<f64>,
    capacity: f64,
    refill_period: Duration,
    notify: Notify,
}

impl RateLimiter {
    /// Construct a limiter for `rpm` requests per minute. The bucket starts
    /// full.
    pub fn new(rpm: u32) -> Arc<Self> {
        let rpm = rpm.max(1);
        Arc::new(Self {
            tokens: Mutex::new(rpm as f64),
            capacity: rpm as f64,
            refill_period: Duration::from_secs_f64(60.0 / rpm as f64),
            notify: Notify::new(),
        })
    }

    /// Block until a token is available, or return
    /// [`RateLimitError::Cancelled`] if `cancel` fires first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        loop {
            let notified = self.notify.notified();
            {
                let mut tokens = self.tokens.lock().await;
                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    return Ok(());
                }
            }
            tokio::select! {
                _ = notified => continue,
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            }
        }
    }

    /// Number of whole tokens currently banked, for metrics and tests.
    pub async fn available(&self) -> u32 {
        *self.tokens.lock().await as u32
    }

    async fn refill_once(&self) {
        let mut tokens = self.tokens.lock().await;
        if *tokens < self.capacity {
            *tokens = (*tokens + 1.0).min(self.capacity);
            drop(tokens);
            self.notify.notify_waiters();
        }
    }
}

/// Spawn the background refill task. The task deposits one token per
/// refill period until `cancel` fires.
pub fn spawn_refill_task(limiter: Arc<RateLimiter>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let period = limiter.refill_period;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => limiter.refill_once().await,
                _ = cancel.cancelled() => {
                    debug!("rate limiter refill task cancelled");
                    return;
                }
            }
        }
    })
}
