//! Fixed-window request budgets per client IP.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::RequestError;

/// Clients are forgotten lazily; expired windows are swept once the table
/// reaches this size.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        RateLimitConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_after: Duration,
}

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    message: &'static str,
    trust_forwarded: bool,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, message: &'static str, trust_forwarded: bool) -> Self {
        RateLimiter {
            config,
            message,
            trust_forwarded,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one request from `ip` against its current window.
    pub fn check(&self, ip: IpAddr) -> RateLimitResult {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> RateLimitResult {
        let window = self.config.window;
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }

        let allowed = entry.count < self.config.max_requests;
        if allowed {
            entry.count += 1;
        }
        RateLimitResult {
            allowed,
            remaining: self.config.max_requests - entry.count,
            reset_after: window.saturating_sub(now.duration_since(entry.started)),
        }
    }

    /// The forwarded-for address when behind a trusted proxy, else the peer.
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
        if self.trust_forwarded {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok());
            if forwarded.is_some() {
                return forwarded;
            }
        }
        peer
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`. Requests whose
/// client address cannot be told pass through uncounted.
pub async fn limit_by_ip(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let Some(ip) = limiter.client_ip(request.headers(), peer) else {
        return next.run(request).await;
    };

    let result = limiter.check(ip);
    let mut response = if result.allowed {
        next.run(request).await
    } else {
        tracing::warn!(%ip, limit = limiter.config.max_requests, "rate limit exceeded");
        let mut response = RequestError::TooManyRequests(limiter.message).into_response();
        response
            .headers_mut()
            .insert("retry-after", seconds(result.reset_after));
        response
    };

    // the innermost limiter's numbers win
    let headers = response.headers_mut();
    headers
        .entry("ratelimit-limit")
        .or_insert_with(|| HeaderValue::from(limiter.config.max_requests));
    headers
        .entry("ratelimit-remaining")
        .or_insert_with(|| HeaderValue::from(result.remaining));
    headers
        .entry("ratelimit-reset")
        .or_insert_with(|| seconds(result.reset_after));
    response
}

fn seconds(duration: Duration) -> HeaderValue {
    let mut secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs += 1;
    }
    HeaderValue::from(secs)
}
