//! Sliding-window rate limiter.

use std::time::Duration;

use chrono::Utc;

use super::Store;

/// Events recorded for one key, with the window they were counted against.
#[derive(Debug, Default)]
pub(super) struct RateBucket {
    window_ms: i64,
    events: Vec<i64>,
}

impl RateBucket {
    fn expire(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.window_ms;
        self.events.retain(|&ts| ts >= cutoff);
    }
}

impl Store {
    /// Record an event for `key` if fewer than `max` events happened within
    /// the trailing `window`. Refused events are not recorded.
    pub fn allow(&self, key: &str, window: Duration, max: usize) -> bool {
        self.allow_at(key, window, max, Utc::now().timestamp_millis())
    }

    pub(crate) fn allow_at(&self, key: &str, window: Duration, max: usize, now_ms: i64) -> bool {
        let window_ms = window.as_millis() as i64;

        let mut inner = self.lock();
        // Keys whose events have all aged out are dropped so the map only
        // holds callers seen within their window.
        inner.rate_buckets.retain(|_, bucket| {
            bucket.expire(now_ms);
            !bucket.events.is_empty()
        });

        let bucket = inner.rate_buckets.entry(key.to_string()).or_default();
        bucket.window_ms = bucket.window_ms.max(window_ms);
        let cutoff = now_ms - window_ms;
        let recent = bucket.events.iter().filter(|&&ts| ts >= cutoff).count();

        if recent >= max {
            if bucket.events.is_empty() {
                inner.rate_buckets.remove(key);
            }
            return false;
        }
        bucket.events.push(now_ms);
        true
    }

    #[cfg(test)]
    fn rate_key_count(&self) -> usize {
        self.lock().rate_buckets.len()
    }
}
