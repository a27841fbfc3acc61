use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::{config::RateLimitConfig, errors::AuthError, middleware::client::client_ip, AppState};

const MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

/// Fixed-window request counter keyed by an arbitrary string.
///
/// The first hit on a key opens a window of `window` length; hits past
/// `max_requests` inside that window are refused until it rolls over.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    max_requests: u64,
    window: Duration,
    max_keys: usize,
}

impl RateLimiter {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self::with_capacity(max_requests, window, MAX_TRACKED_KEYS)
    }

    pub fn with_capacity(max_requests: u64, window: Duration, max_keys: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            max_keys: max_keys.max(1),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.auth_requests, Duration::from_secs(config.window_seconds))
    }

    /// Count one hit for `key`. Over the limit, returns how long until the
    /// key's window rolls over.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        if !self.windows.contains_key(key) && self.windows.len() >= self.max_keys {
            self.evict(now);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }
        entry.count += 1;
        if entry.count <= self.max_requests {
            Ok(())
        } else {
            Err(self.window.saturating_sub(now.duration_since(entry.started)))
        }
    }

    /// Drop expired windows; if the map is still full, drop the oldest one.
    fn evict(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);

        if self.windows.len() >= self.max_keys {
            let oldest = self
                .windows
                .iter()
                .min_by_key(|e| e.value().started)
                .map(|e| e.key().clone());
            if let Some(key) = oldest {
                self.windows.remove(&key);
            }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// Whole seconds to wait, rounded up and never zero.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Per-client-IP limit for the unauthenticated auth endpoints.
pub async fn limit_auth_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Some(limiter) = state.rate_limiter.as_deref() {
        let ip = client_ip(request.headers(), request.extensions());
        let key = format!("auth:{ip}");
        if let Err(wait) = limiter.check(&key) {
            tracing::warn!(%ip, path = %request.uri().path(), "auth rate limit exceeded");
            return Err(AuthError::TooManyRequests {
                retry_after_secs: retry_after_secs(wait),
            });
        }
    }
    Ok(next.run(request).await)
}
