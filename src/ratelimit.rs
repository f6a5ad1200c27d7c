use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{extract::Request, middleware::Next, response::{IntoResponse, Response}};
use tracing::warn;

use crate::error::ApiError;

/// Fixed-window counter keyed by client IP. State is in-process only, which
/// matches the single-instance deployment this backend targets.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    message: String,
    enabled: bool,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration, message: impl Into<String>, enabled: bool) -> Self {
        Self {
            max,
            window,
            message: message.into(),
            enabled,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one hit for `key` and reports whether it is still under the
    /// limit for the current window.
    pub fn allow(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limit lock");
        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.max
    }
}

fn client_key(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn enforce(limiter: Arc<RateLimiter>, req: Request, next: Next) -> Response {
    let key = client_key(&req);
    if limiter.allow(&key) {
        next.run(req).await
    } else {
        warn!(%key, path = %req.uri().path(), "rate limit exceeded");
        ApiError::TooManyRequests(limiter.message.clone()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_hits_in_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), "slow down", true);
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
    }

    #[test]
    fn keys_are_counted_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), "slow down", true);
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
        assert!(limiter.allow("5.6.7.8"));
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20), "slow down", true);
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.allow("1.2.3.4"));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60), "slow down", false);
        for _ in 0..10 {
            assert!(limiter.allow("1.2.3.4"));
        }
    }
}
