//! Per-client fixed-window rate limiting.
//!
//! # Data Flow
//! ```text
//! Request
//!     → client_identity (X-Forwarded-For[0] | X-Real-IP | peer IP)
//!     → bucket lookup (insert on first sight)
//!     → lock bucket: reset window if expired, count += 1
//!     → count > max? 429 + abort : next()
//!
//! Sweeper task (every sweep interval):
//!     → evict buckets whose window started before the retention horizon
//! ```
//!
//! # Design Decisions
//! - One limiter per middleware instance; no process-wide state
//! - The map shard lock is never held while a bucket is locked on the
//!   request path
//! - Sweeper stops on the shutdown broadcast

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;
use crate::http::response::HttpError;
use crate::observability::metrics;

/// Idle buckets older than this are evicted.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the sweeper runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Counter for one client identity.
#[derive(Debug)]
pub struct RateBucket {
    window_start: Instant,
    count: u64,
}

impl RateBucket {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// Count one request at `now` and return the count within the current window.
    fn hit(&mut self, now: Instant, window: Duration) -> u64 {
        if now.duration_since(self.window_start) > window {
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;
        self.count
    }
}

/// Shared bucket store and limits.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u64,
    window: Duration,
    retention: Duration,
    buckets: DashMap<String, Arc<Mutex<RateBucket>>>,
}

impl RateLimiter {
    /// Allow `max_requests` per `window` for each client.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            retention: DEFAULT_RETENTION,
            buckets: DashMap::new(),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request for `key`. Returns `false` once the window's budget is spent.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let existing = self.buckets.get(key).map(|entry| entry.value().clone());
        let bucket = match existing {
            Some(bucket) => bucket,
            None => self
                .buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RateBucket::new(now))))
                .value()
                .clone(),
        };

        let count = bucket.lock().hit(now, self.window);
        count <= self.max_requests
    }

    /// Evict buckets idle beyond the retention horizon. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let bucket = bucket.lock();
            now.duration_since(bucket.window_start) <= self.retention
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `every` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        tracing::debug!(evicted, remaining = limiter.len(), "Rate limit sweep");
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limit sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Client identity for limiting: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the peer IP.
pub fn client_identity(ctx: &Context) -> String {
    if let Some(forwarded) = ctx.header(X_FORWARDED_FOR) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = ctx.header(X_REAL_IP) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    ctx.remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

/// Rate limit middleware.
#[derive(Debug, Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Handler for RateLimit {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let client = client_identity(ctx);
            if self.limiter.check(&client) {
                ctx.next().await;
                return;
            }

            tracing::warn!(client = %client, path = %ctx.path(), "Rate limit exceeded");
            metrics::record_rate_limited();
            ctx.abort_with_error(&HttpError::too_many_requests("rate limit exceeded"));
        })
    }
}

pub fn rate_limit(limiter: Arc<RateLimiter>) -> HandlerFn {
    Arc::new(RateLimit::new(limiter))
}
