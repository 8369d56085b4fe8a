//! Operation throttling for sync runs.
//!
//! The ceiling is operations per rolling one-second window. The default
//! policy replicates coarse fixed-window pacing: bursts up to the ceiling
//! are admitted instantly, then callers stall until the window rolls over.
//! A token-bucket policy is available for smoother pacing.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default operations-per-second ceiling.
pub const DEFAULT_OPS_PER_SECOND: u32 = 100;

const WINDOW: Duration = Duration::from_secs(1);

/// Operation rate ceiling. Zero means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub ops_per_second: u32,
}

impl RateLimit {
    pub fn new(ops_per_second: u32) -> Self {
        Self { ops_per_second }
    }

    pub fn unlimited() -> Self {
        Self { ops_per_second: 0 }
    }

    pub fn is_limited(&self) -> bool {
        self.ops_per_second > 0
    }

    pub fn display(&self) -> String {
        if self.is_limited() {
            format!("{} ops/s", self.ops_per_second)
        } else {
            "unlimited".to_string()
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(DEFAULT_OPS_PER_SECOND)
    }
}

/// Pacing policy for the rate ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Coarse fixed window: burst to the ceiling, stall to the rollover.
    #[default]
    Window,
    /// Token bucket: admissions spread evenly across the second.
    Smooth,
}

/// Admission gate called before every transfer operation. Suspension is the
/// only observable effect; a stalled caller sees latency, never an error.
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn admit(&self);
}

/// Build the configured throttle.
pub fn build_throttle(limit: RateLimit, pacing: Pacing) -> Arc<dyn Throttle> {
    match pacing {
        Pacing::Window => Arc::new(FixedWindowLimiter::new(limit)),
        Pacing::Smooth => Arc::new(TokenBucketLimiter::new(limit)),
    }
}

struct WindowState {
    window_start: Option<Instant>,
    admitted: u32,
}

/// Fixed-window limiter: a counter and a window start time. Each admission
/// increments the counter; the admission that pushes it past the ceiling
/// sleeps until the window rolls over, then the counter resets to 1.
pub struct FixedWindowLimiter {
    max_per_window: u32,
    state: tokio::sync::Mutex<WindowState>,
}

impl FixedWindowLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            max_per_window: limit.ops_per_second,
            state: tokio::sync::Mutex::new(WindowState {
                window_start: None,
                admitted: 0,
            }),
        }
    }
}

#[async_trait]
impl Throttle for FixedWindowLimiter {
    async fn admit(&self) {
        if self.max_per_window == 0 {
            return;
        }

        let mut state = self.state.lock().await;
        let now = Instant::now();

        match state.window_start {
            Some(start) if now.duration_since(start) < WINDOW => {}
            _ => {
                state.window_start = Some(now);
                state.admitted = 0;
            }
        }

        state.admitted += 1;
        if state.admitted > self.max_per_window {
            // window_start is always Some here
            let wake = state.window_start.unwrap_or(now) + WINDOW;
            tokio::time::sleep_until(wake).await;
            state.window_start = Some(wake);
            state.admitted = 1;
        }
    }
}

/// Token-bucket limiter built on governor. Smoother than the fixed window:
/// no burst-then-stall, admissions pace out across the second.
pub struct TokenBucketLimiter {
    limiter: Option<
        Arc<
            RateLimiter<
                governor::state::NotKeyed,
                governor::state::InMemoryState,
                governor::clock::DefaultClock,
            >,
        >,
    >,
}

impl TokenBucketLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let limiter = if limit.is_limited() {
            let rate = NonZeroU32::new(limit.ops_per_second).unwrap_or(nonzero!(1u32));
            Some(Arc::new(RateLimiter::direct(Quota::per_second(rate))))
        } else {
            None
        };

        Self { limiter }
    }
}

#[async_trait]
impl Throttle for TokenBucketLimiter {
    async fn admit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}
