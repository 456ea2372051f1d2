//! Fixed-window request throttling.
//!
//! Windows live in an in-process map, which is sufficient for a
//! single-process deployment; running multiple processes requires moving the
//! counters to a shared store.

use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::AppState;
use crate::error::AppError;
use crate::extract::RequestMeta;
use crate::middleware::auth::AuthenticatedUser;

/// Requests allowed per window on the refresh endpoint.
pub const REFRESH_MAX_PER_WINDOW: u32 = 10;

/// Window length.
pub const WINDOW: Duration = Duration::from_secs(60);

struct WindowEntry {
    count: u32,
    start: Instant,
}

/// Fixed-window counter keyed by caller + route.
pub struct RateLimiter {
    hits: DashMap<String, WindowEntry>,
    window: Duration,
    max: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            hits: DashMap::new(),
            window,
            max,
        }
    }

    /// Count a hit for `key`. Returns `false` once the window is exhausted.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entry = self.hits.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            start: now,
        });
        if now.duration_since(entry.start) > self.window {
            entry.count = 0;
            entry.start = now;
        }
        entry.count += 1;
        entry.count <= self.max
    }
}

/// Axum middleware guarding the refresh endpoint.
///
/// Keyed by the authenticated user when present, otherwise the caller
/// address, plus the request path.
pub async fn limit_refresh(
    State(state): State<AppState>,
    meta: RequestMeta,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.sub.clone())
        .unwrap_or_else(|| meta.ip.clone());
    let key = format!("{caller}:{}", request.uri().path());

    if !state.refresh_limiter.check(&key) {
        return Err(AppError::TooManyRequests);
    }
    Ok(next.run(request).await)
}
