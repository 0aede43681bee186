use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::{Error, Result};

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Process-wide requests-per-second cap for a router group.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    window: Arc<Mutex<WindowState>>,
}

impl RateLimiter {
    fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            window: Arc::new(Mutex::new(WindowState {
                start: Instant::now(),
                count: 0,
            })),
        }
    }

    fn allow(&self) -> bool {
        let mut guard = match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        if now.duration_since(guard.start) >= Duration::from_secs(1) {
            guard.start = now;
            guard.count = 0;
        }
        if guard.count < self.rps {
            guard.count += 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.allow() {
        return Error::RateLimited { retry_after_secs: 1 }.into_response();
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32) -> RateLimiter {
    RateLimiter::new(rps)
}

/// Fixed-window counter per key (user id, client IP). State is in-process only,
/// so separate server processes each keep their own windows.
#[derive(Clone, Debug)]
pub struct KeyedRateLimiter {
    name: &'static str,
    limit: u32,
    window: Duration,
    buckets: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl KeyedRateLimiter {
    pub fn new(name: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            name,
            limit: limit.max(1),
            window,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn per_hour(name: &'static str, limit: u32) -> Self {
        Self::new(name, limit, Duration::from_secs(60 * 60))
    }

    pub fn per_day(name: &'static str, limit: u32) -> Self {
        Self::new(name, limit, Duration::from_secs(24 * 60 * 60))
    }

    /// Counts one hit against `key`, failing once the window is exhausted.
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Expired windows are dropped so the map doesn't grow with every IP seen.
        if buckets.len() > 10_000 {
            let window = self.window;
            buckets.retain(|_, state| now.duration_since(state.start) < window);
        }

        let state = buckets.entry(key.to_string()).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if now.duration_since(state.start) >= self.window {
            state.start = now;
            state.count = 0;
        }
        if state.count >= self.limit {
            let elapsed = now.duration_since(state.start);
            let retry_after_secs = self.window.saturating_sub(elapsed).as_secs().max(1);
            tracing::warn!(limiter = self.name, key, retry_after_secs, "Rate limit exceeded");
            return Err(Error::RateLimited { retry_after_secs });
        }
        state.count += 1;
        Ok(())
    }
}

/// Resolves the submitter address, preferring the first `X-Forwarded-For` hop
/// when the service runs behind a proxy.
pub fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .and_then(|v| v.parse::<IpAddr>().ok());
    match (forwarded, connect_info) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_limiter_blocks_after_limit_per_key() {
        let limiter = KeyedRateLimiter::per_hour("applications", 3);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", now).is_ok());
        }
        match limiter.check_at("10.0.0.1", now) {
            Err(Error::RateLimited { retry_after_secs }) => assert!(retry_after_secs > 3500),
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert!(limiter.check_at("10.0.0.2", now).is_ok());
    }

    #[test]
    fn keyed_limiter_resets_after_window() {
        let limiter = KeyedRateLimiter::new("jobs", 1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at("user:1", start).is_ok());
        assert!(limiter.check_at("user:1", start + Duration::from_secs(5)).is_err());
        assert!(limiter.check_at("user:1", start + Duration::from_secs(11)).is_ok());
    }

    #[test]
    fn rps_limiter_caps_a_single_second() {
        let limiter = new_rps_state(2);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(&ConnectInfo(addr))), "203.0.113.9");
        assert_eq!(client_ip(&HeaderMap::new(), Some(&ConnectInfo(addr))), "127.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }
}
