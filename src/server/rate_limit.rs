//! Fixed-window request limiting per client address (`api.rateLimit`).
//!
//! Rejections are ordinary operational [`ApiError`]s (429) so they are logged
//! and shaped by the error middleware like any other failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use super::error::ApiError;
use super::middleware::client_ip;
use crate::config::RateLimitConfig;

pub const LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
struct Table {
    clients: HashMap<String, Window>,
    last_sweep: Instant,
}

impl Table {
    fn sweep(&mut self, now: Instant, window: Duration) {
        self.clients
            .retain(|_, entry| now.duration_since(entry.started) < window);
        self.last_sweep = now;
    }
}

/// Per-client request counter. `max_requests == 0` disables limiting.
///
/// Expired clients are swept at most once per window, on the request path.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    entries: Mutex<Table>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: config.window,
            max_requests: config.max_requests,
            entries: Mutex::new(Table {
                clients: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0 && !self.window.is_zero()
    }

    /// Count a request from `client`. `Err` carries the time until the
    /// client's window resets.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        if !self.is_enabled() {
            return Ok(());
        }
        let Ok(mut entries) = self.entries.lock() else {
            warn!("rate limiter lock poisoned, allowing request");
            return Ok(());
        };

        let now = Instant::now();
        if now.duration_since(entries.last_sweep) >= self.window {
            entries.sweep(now, self.window);
        }

        let entry = entries.clients.entry(client.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.count = 0;
            entry.started = now;
        }

        if entry.count >= self.max_requests {
            return Err(self.window.saturating_sub(now.duration_since(entry.started)));
        }

        entry.count += 1;
        Ok(())
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.lock().map(|e| e.clients.len()).unwrap_or(0)
    }
}

/// Middleware: reject with 429 and `Retry-After` once a client exceeds its
/// window.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(&request);
    match limiter.check(&client) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            let mut response =
                ApiError::with_status(StatusCode::TOO_MANY_REQUESTS, LIMIT_MESSAGE).into_response();
            let secs = retry_after.as_secs().max(1);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            response
        }
    }
}
