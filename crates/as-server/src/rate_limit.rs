//! Per-key token-bucket rate limiting and the brute-force auth lockout
//! counter. Neither has direct teacher precedent (the gateway wires
//! `tower_governor` for IP rate limiting but has no lockout counter at
//! all); built by hand against the concurrency model's stated policy —
//! "token buckets and auth-failure buckets guarded by separate mutexes;
//! eviction runs opportunistically when the map grows beyond a
//! threshold."

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::state::AppState;

/// Axum middleware: one token-bucket per client IP. 429 with
/// `Retry-After` when depleted.
pub async fn rate_limit_mw(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();
    match state.rate_limiter.check(&key) {
        Ok(()) => next.run(req).await,
        Err(retry_after_secs) => {
            let mut resp = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limited",
                    "message": "rate limit exceeded",
                })),
            )
                .into_response();
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                resp.headers_mut().insert("retry-after", v);
            }
            resp
        }
    }
}

/// Above this many tracked keys, the next write sweeps entries idle for
/// more than ten minutes before inserting.
const EVICTION_THRESHOLD: usize = 10_000;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    rate: f64,
    burst: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(rate: u32, burst: u32) -> Self {
        Self {
            rate: rate.max(1) as f64,
            burst: burst.max(1) as f64,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Ok(())` if a token was available, or `Err(retry_after_secs)`
    /// if the bucket is depleted.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let mut buckets = self.buckets.lock();
        if buckets.len() > EVICTION_THRESHOLD {
            let now = Instant::now();
            buckets.retain(|_, b| now.duration_since(b.last_refill) < Duration::from_secs(600));
        }

        let now = Instant::now();
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            Err((deficit / self.rate).ceil() as u64)
        }
    }
}

struct LockoutEntry {
    failures: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

pub struct AuthLockout {
    max_failures: u32,
    window: Duration,
    lockout_duration: Duration,
    entries: Mutex<HashMap<String, LockoutEntry>>,
}

impl AuthLockout {
    pub fn new(max_failures: u32, window_secs: u64, lockout_duration_secs: u64) -> Self {
        Self {
            max_failures: max_failures.max(1),
            window: Duration::from_secs(window_secs.max(1)),
            lockout_duration: Duration::from_secs(lockout_duration_secs.max(1)),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// `true` when this IP is currently blocked regardless of whether it
    /// now presents a correct key.
    pub fn is_locked(&self, ip: &str) -> bool {
        let entries = self.entries.lock();
        entries
            .get(ip)
            .and_then(|e| e.locked_until)
            .is_some_and(|until| Instant::now() < until)
    }

    pub fn record_failure(&self, ip: &str) {
        let mut entries = self.entries.lock();
        if entries.len() > EVICTION_THRESHOLD {
            let now = Instant::now();
            entries.retain(|_, e| now.duration_since(e.window_start) < self.window * 10);
        }

        let now = Instant::now();
        let entry = entries.entry(ip.to_string()).or_insert_with(|| LockoutEntry {
            failures: 0,
            window_start: now,
            locked_until: None,
        });

        if now.duration_since(entry.window_start) > self.window {
            entry.failures = 0;
            entry.window_start = now;
        }
        entry.failures += 1;
        if entry.failures >= self.max_failures {
            entry.locked_until = Some(now + self.lockout_duration);
        }
    }

    /// A successful auth clears the failure counter (but not an active
    /// lockout already in force).
    pub fn record_success(&self, ip: &str) {
        if let Some(entry) = self.entries.lock().get_mut(ip) {
            entry.failures = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_allows_burst_then_depletes() {
        let rl = RateLimiter::new(1, 2);
        assert!(rl.check("k").is_ok());
        assert!(rl.check("k").is_ok());
        assert!(rl.check("k").is_err());
    }

    #[test]
    fn distinct_keys_have_independent_buckets() {
        let rl = RateLimiter::new(1, 1);
        assert!(rl.check("a").is_ok());
        assert!(rl.check("b").is_ok());
    }

    #[test]
    fn lockout_triggers_after_max_failures() {
        let lockout = AuthLockout::new(3, 60, 300);
        assert!(!lockout.is_locked("1.2.3.4"));
        for _ in 0..3 {
            lockout.record_failure("1.2.3.4");
        }
        assert!(lockout.is_locked("1.2.3.4"));
    }

    #[test]
    fn other_ips_unaffected_by_lockout() {
        let lockout = AuthLockout::new(2, 60, 300);
        lockout.record_failure("1.1.1.1");
        lockout.record_failure("1.1.1.1");
        assert!(lockout.is_locked("1.1.1.1"));
        assert!(!lockout.is_locked("9.9.9.9"));
    }

    #[test]
    fn success_clears_failure_counter() {
        let lockout = AuthLockout::new(3, 60, 300);
        lockout.record_failure("5.5.5.5");
        lockout.record_failure("5.5.5.5");
        lockout.record_success("5.5.5.5");
        lockout.record_failure("5.5.5.5");
        assert!(!lockout.is_locked("5.5.5.5"));
    }
}
