//! Per-client token bucket admission gate.
//!
//! Each client key gets its own bucket on first sight, holding up to
//! `burst` tokens and refilling at `rate` tokens per second.  A janitor
//! task drops buckets that have been idle longer than the TTL so the map
//! stays bounded when many distinct clients pass through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::RateLimiterSettings;
use crate::errors::{EmberdropError, Result};

pub const DEFAULT_RATE: f64 = 1.0;
pub const DEFAULT_BURST: u32 = 3;
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Token bucket rate limiter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    rate: f64,
    burst: u32,
    ttl: Duration,
}

impl RateLimiter {
    /// `rate` is tokens per second, `burst` the bucket capacity.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate,
            burst,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn from_settings(settings: &RateLimiterSettings) -> Self {
        Self::new(settings.rate, settings.burst).with_ttl(settings.ttl)
    }

    /// Idle time after which a bucket is evicted.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Admit or reject one request for `key`. Never waits.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_ok()
    }

    /// Like [`allow`](Self::allow), but a rejection carries how long until
    /// the next token is available.
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        let mut buckets = self.lock();
        let burst = self.burst as f64;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: burst,
                last_refill: now,
                last_seen: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.rate).min(burst);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - bucket.tokens;
        let retry_after_secs = if self.rate > 0.0 {
            (missing / self.rate).ceil().max(1.0) as u64
        } else {
            u64::MAX
        };
        tracing::warn!(client = key, retry_after_secs, "rate limit exceeded");
        Err(EmberdropError::TooManyRequests { retry_after_secs })
    }

    /// Drop buckets idle for longer than the TTL; returns how many went.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub(crate) fn evict_idle_at(&self, now: Instant) -> usize {
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) <= self.ttl);
        before - buckets.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Buckets hold plain counters; a poisoned map is reused as-is.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE, DEFAULT_BURST)
    }
}

/// Background task evicting idle buckets on a fixed interval.
pub struct Janitor {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Janitor {
    pub fn start(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }

                    _ = tokio::time::sleep(interval) => {
                        let evicted = limiter.evict_idle();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = limiter.len(), "evicted idle rate limit buckets");
                        }
                    }
                }
            }
            tracing::debug!("rate limiter janitor stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "rate limiter janitor panicked");
        }
    }
}
