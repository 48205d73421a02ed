// src/services/rate_limit.rs

//! Rate-limit tracking and backoff.
//!
//! One `RateLimiter` exists per API host and is the single synchronization
//! point that keeps concurrent download workers within the external
//! throttling policy. Every response updates the state; every request waits
//! on it first.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

use crate::models::RateLimitConfig;

/// Structured view over rate-limit response headers.
///
/// The API reports quota through `X-RateLimit-Limit`, `-Remaining` and
/// `-Reset` (epoch seconds). All fields are optional; malformed values are
/// treated as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitSnapshot {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_epoch: Option<f64>,
}

impl RateLimitSnapshot {
    /// Collect rate-limit header information from a response.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: header_value(headers, "X-RateLimit-Limit").and_then(|v| v.parse().ok()),
            remaining: header_value(headers, "X-RateLimit-Remaining").and_then(|v| v.parse().ok()),
            reset_epoch: header_value(headers, "X-RateLimit-Reset").and_then(|v| v.parse().ok()),
        }
    }

    /// Seconds remaining until quota reset, if known.
    pub fn seconds_until_reset(&self) -> Option<f64> {
        let reset = self.reset_epoch?;
        let now = Utc::now().timestamp() as f64;
        Some((reset - now).max(0.0))
    }

    /// Record snapshot fields into article provenance metadata.
    pub fn record_into(&self, metadata: &mut BTreeMap<String, String>) {
        if let Some(limit) = self.limit {
            metadata.insert("rate_limit_limit".into(), limit.to_string());
        }
        if let Some(remaining) = self.remaining {
            metadata.insert("rate_limit_remaining".into(), remaining.to_string());
        }
        if let Some(reset) = self.reset_epoch {
            metadata.insert("rate_limit_reset_epoch".into(), reset.to_string());
        }
    }
}

/// What one response told us about throttling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResponseSignal {
    /// Whether the response was a throttling signal (429)
    pub throttled: bool,

    /// Server-advertised delay before the next request, when present
    pub server_delay: Option<Duration>,
}

impl ResponseSignal {
    /// Signal for an ordinary successful response.
    pub fn success() -> Self {
        Self::default()
    }

    /// Derive a signal from a response status and headers.
    ///
    /// Delay guidance is only read off throttling and server-error
    /// responses. Ordinary responses carry the quota-reset epoch too, but
    /// that header points at the reset instant (potentially hours away) and
    /// must not pace successful traffic.
    pub fn from_response(status: u16, headers: &HeaderMap) -> Self {
        let retriable = status == 429 || status >= 500;
        Self {
            throttled: status == 429,
            server_delay: retriable
                .then(|| retry_delay_from_headers(headers))
                .flatten(),
        }
    }
}

/// Suggested delay before retrying a request.
///
/// `Retry-After` may be a number of seconds or an HTTP-date. With no explicit
/// header the delay is derived from `X-RateLimit-Reset` when present.
pub fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
    if let Some(raw) = header_value(headers, "Retry-After") {
        if let Ok(secs) = raw.parse::<f64>() {
            return Some(Duration::from_secs_f64(secs.max(0.0)));
        }
        if let Ok(date) = DateTime::parse_from_rfc2822(&raw) {
            let delta = (date.with_timezone(&Utc) - Utc::now()).num_milliseconds();
            return Some(Duration::from_millis(delta.max(0) as u64));
        }
        return None;
    }

    let snapshot = RateLimitSnapshot::from_headers(headers);
    match snapshot.seconds_until_reset() {
        Some(secs) if secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        _ => None,
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug)]
struct RateLimitState {
    next_allowed: Instant,
    last_server_delay: Option<Duration>,
}

/// Process-wide throttle state for one API scope.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
    min_interval: Duration,
    fallback_ceiling: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(
            Duration::from_millis(config.min_interval_ms),
            Duration::from_secs(config.fallback_ceiling_secs),
        )
    }

    pub fn with_limits(min_interval: Duration, fallback_ceiling: Duration) -> Self {
        Self {
            state: Mutex::new(RateLimitState {
                next_allowed: Instant::now(),
                last_server_delay: None,
            }),
            min_interval,
            fallback_ceiling,
        }
    }

    /// Delay to apply after the given response.
    ///
    /// A server-advertised interval is honored as-is and never rounded down;
    /// a throttle with no guidance costs the static fallback ceiling; an
    /// ordinary response shrinks back to the minimum inter-request spacing.
    pub fn next_delay(&self, signal: &ResponseSignal) -> Duration {
        if signal.throttled {
            signal
                .server_delay
                .unwrap_or(self.fallback_ceiling)
                .max(self.min_interval)
        } else {
            match signal.server_delay {
                Some(delay) => delay.max(self.min_interval),
                None => self.min_interval,
            }
        }
    }

    /// Update throttle state from a response. Called on every outcome that
    /// carries header information, including failures.
    pub fn observe(&self, signal: &ResponseSignal) {
        let delay = self.next_delay(signal);
        let mut state = self.state.lock().expect("rate limit state poisoned");
        if signal.throttled {
            state.last_server_delay = signal.server_delay;
        }
        let candidate = Instant::now() + delay;
        if candidate > state.next_allowed {
            state.next_allowed = candidate;
        }
    }

    /// Suspend the caller until the next permitted request instant, then
    /// reserve minimum spacing for the worker behind it.
    pub async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock().expect("rate limit state poisoned");
            let now = Instant::now();
            let wait = state.next_allowed.saturating_duration_since(now);
            let slot = state.next_allowed.max(now);
            state.next_allowed = slot + self.min_interval;
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Last server-advertised delay, for error messages.
    pub fn last_server_delay(&self) -> Option<Duration> {
        self.state
            .lock()
            .expect("rate limit state poisoned")
            .last_server_delay
    }
}
