//! Fixed-window request admission, keyed by client IP or email.
//!
//! Each [`Bucket`] owns its own counter map behind its own mutex, so checking one bucket never waits on another.
//! A counter whose window has elapsed is reset on the next call and evicted by [`RateLimiter::sweep`].
use std::{collections::HashMap, fmt::Display, sync::Arc, time::Duration};

use log::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    IpOrder,
    EmailOrder,
    IpValidate,
    IpSupport,
    EmailSupport,
}

impl Bucket {
    pub const ALL: [Bucket; 5] =
        [Bucket::IpOrder, Bucket::EmailOrder, Bucket::IpValidate, Bucket::IpSupport, Bucket::EmailSupport];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::IpOrder => "ip_order",
            Bucket::EmailOrder => "email_order",
            Bucket::IpValidate => "ip_validate",
            Bucket::IpSupport => "ip_support",
            Bucket::EmailSupport => "email_support",
        }
    }
}

impl Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Too many requests ({0}). Try again later.")]
    LimitExceeded(Bucket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl BucketLimit {
    pub fn per_hour(max_requests: u32) -> Self {
        Self { max_requests, window: Duration::from_secs(3600) }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self { max_requests, window: Duration::from_secs(60) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub ip_order: BucketLimit,
    pub email_order: BucketLimit,
    pub ip_validate: BucketLimit,
    pub ip_support: BucketLimit,
    pub email_support: BucketLimit,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            ip_order: BucketLimit::per_hour(100),
            email_order: BucketLimit::per_hour(100),
            ip_validate: BucketLimit::per_minute(20),
            ip_support: BucketLimit::per_hour(2),
            email_support: BucketLimit::per_hour(1),
        }
    }
}

impl RateLimiterConfig {
    pub fn limit_for(&self, bucket: Bucket) -> BucketLimit {
        match bucket {
            Bucket::IpOrder => self.ip_order,
            Bucket::EmailOrder => self.email_order,
            Bucket::IpValidate => self.ip_validate,
            Bucket::IpSupport => self.ip_support,
            Bucket::EmailSupport => self.email_support,
        }
    }
}

struct Counter {
    count: u32,
    window_start: Instant,
}

struct Window {
    limit: BucketLimit,
    counters: Mutex<HashMap<String, Counter>>,
}

impl Window {
    fn new(limit: BucketLimit) -> Self {
        Self { limit, counters: Mutex::new(HashMap::new()) }
    }

    fn expired(&self, counter: &Counter, now: Instant) -> bool {
        now.duration_since(counter.window_start) >= self.limit.window
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<[Window; 5]>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let windows = Bucket::ALL.map(|b| Window::new(config.limit_for(b)));
        Self { windows: Arc::new(windows) }
    }

    fn window(&self, bucket: Bucket) -> &Window {
        // Windows are laid out in `Bucket::ALL` order
        &self.windows[bucket as usize]
    }

    /// Counts a request for `key` against `bucket`. Returns false, without counting, if the window is full.
    pub async fn allow(&self, bucket: Bucket, key: &str) -> bool {
        let window = self.window(bucket);
        let now = Instant::now();
        let mut counters = window.counters.lock().await;
        match counters.get_mut(key) {
            Some(counter) if !window.expired(counter, now) => {
                if counter.count < window.limit.max_requests {
                    counter.count += 1;
                    true
                } else {
                    trace!("🚦️ {bucket} is full for {key}");
                    false
                }
            },
            _ => {
                counters.insert(key.to_string(), Counter { count: 1, window_start: now });
                window.limit.max_requests > 0
            },
        }
    }

    /// The number of requests `key` may still make in its current window.
    pub async fn remaining(&self, bucket: Bucket, key: &str) -> u32 {
        let window = self.window(bucket);
        let now = Instant::now();
        let counters = window.counters.lock().await;
        match counters.get(key) {
            Some(counter) if !window.expired(counter, now) => window.limit.max_requests.saturating_sub(counter.count),
            _ => window.limit.max_requests,
        }
    }

    async fn check(&self, bucket: Bucket, key: &str) -> Result<(), RateLimitError> {
        if self.allow(bucket, key).await {
            Ok(())
        } else {
            Err(RateLimitError::LimitExceeded(bucket))
        }
    }

    /// Gates order submission on the client IP, then the buyer's email. An empty email is not checked.
    pub async fn check_order_creation(&self, ip: &str, email: &str) -> Result<(), RateLimitError> {
        self.check(Bucket::IpOrder, ip).await?;
        if !email.is_empty() {
            self.check(Bucket::EmailOrder, email).await?;
        }
        Ok(())
    }

    pub async fn check_validation(&self, ip: &str) -> Result<(), RateLimitError> {
        self.check(Bucket::IpValidate, ip).await
    }

    /// Gates support tickets on the client IP, then the sender's email. An empty email is not checked.
    pub async fn check_support_ticket(&self, ip: &str, email: &str) -> Result<(), RateLimitError> {
        self.check(Bucket::IpSupport, ip).await?;
        if !email.is_empty() {
            self.check(Bucket::EmailSupport, email).await?;
        }
        Ok(())
    }

    /// Evicts every counter whose window has elapsed. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        for bucket in Bucket::ALL {
            let window = self.window(bucket);
            let mut counters = window.counters.lock().await;
            let before = counters.len();
            counters.retain(|_, c| !window.expired(c, now));
            evicted += before - counters.len();
        }
        evicted
    }

    /// Sweeps every `interval` until `shutdown` is cancelled.
    pub async fn run_sweeper(self, interval: Duration, shutdown: CancellationToken) {
        info!("🚦️ Rate limiter sweeper started");
        let mut timer = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("🚦️ Rate limiter sweeper shutting down");
                    break;
                }
                _ = timer.tick() => {
                    let evicted = self.sweep().await;
                    if evicted > 0 {
                        debug!("🚦️ Evicted {evicted} expired rate limit counters");
                    }
                }
            }
        }
    }
}
