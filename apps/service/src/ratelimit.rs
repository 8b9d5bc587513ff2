//! Fixed-window rate limiting for the admin boundary.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{AppError, AppResult};

/// Backing store for window counters. The in-memory store is enough for a
/// single process; a shared store slots in behind the same trait.
pub trait CounterStore: Send + Sync {
    /// Bump and return the counter for `(key, window_start)`.
    fn increment(&self, key: &str, window_start: i64) -> u32;

    /// Forget every window for `key`.
    fn reset(&self, key: &str);
}

pub struct InMemoryCounterStore {
    buckets: Mutex<HashMap<(String, i64), u32>>,
}

/// Stale buckets are evicted once the map grows past this.
const MAX_BUCKETS: usize = 5_000;

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self { buckets: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &str, window_start: i64) -> u32 {
        let mut buckets = self.buckets.lock().unwrap();
        if buckets.len() >= MAX_BUCKETS {
            buckets.retain(|(_, start), _| *start >= window_start);
        }
        let count = buckets.entry((key.to_string(), window_start)).or_insert(0);
        *count += 1;
        *count
    }

    fn reset(&self, key: &str) {
        self.buckets.lock().unwrap().retain(|(k, _), _| k != key);
    }
}

pub struct RateLimiter<S: CounterStore> {
    store: S,
    max_requests: u32,
    window_secs: i64,
}

impl<S: CounterStore> RateLimiter<S> {
    pub fn new(store: S, max_requests: u32, window_secs: i64) -> Self {
        Self { store, max_requests, window_secs }
    }

    /// Count one request against `key`. Over the limit this returns
    /// [`AppError::RateLimited`] carrying the seconds until the window rolls.
    pub fn check(&self, key: &str, now: i64) -> AppResult<()> {
        let window_start = now - now.rem_euclid(self.window_secs);
        let count = self.store.increment(key, window_start);
        if count <= self.max_requests {
            return Ok(());
        }
        let retry_after_secs = (window_start + self.window_secs - now).max(1) as u64;
        Err(AppError::RateLimited { retry_after_secs })
    }

    /// Clear the counters for `key`, lifting any active limit on it.
    pub fn reset(&self, key: &str) {
        self.store.reset(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window: i64) -> RateLimiter<InMemoryCounterStore> {
        RateLimiter::new(InMemoryCounterStore::new(), max, window)
    }

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = limiter(3, 60);
        assert!(limiter.check("10.0.0.1", 100).is_ok());
        assert!(limiter.check("10.0.0.1", 110).is_ok());
        assert!(limiter.check("10.0.0.1", 119).is_ok());

        match limiter.check("10.0.0.1", 119) {
            Err(AppError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 1),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn keys_are_counted_independently() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("10.0.0.1", 100).is_ok());
        assert!(limiter.check("10.0.0.2", 100).is_ok());
        assert!(limiter.check("10.0.0.1", 100).is_err());
    }

    #[test]
    fn window_roll_resets_the_count() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("10.0.0.1", 100).is_ok());
        assert!(limiter.check("10.0.0.1", 119).is_err());
        assert!(limiter.check("10.0.0.1", 120).is_ok());
    }

    #[test]
    fn reset_lifts_the_limit_for_one_key() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("10.0.0.1", 100).is_ok());
        assert!(limiter.check("10.0.0.2", 100).is_ok());
        assert!(limiter.check("10.0.0.1", 101).is_err());

        limiter.reset("10.0.0.1");
        assert!(limiter.check("10.0.0.1", 102).is_ok());
        assert!(limiter.check("10.0.0.2", 102).is_err());
    }

    #[test]
    fn retry_after_counts_down_to_the_window_edge() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("10.0.0.1", 60).is_ok());
        match limiter.check("10.0.0.1", 75) {
            Err(AppError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 45),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn store_evicts_stale_buckets() {
        let store = InMemoryCounterStore::new();
        for i in 0..MAX_BUCKETS {
            store.increment(&format!("k{i}"), 0);
        }
        assert_eq!(store.buckets.lock().unwrap().len(), MAX_BUCKETS);

        // A later window flushes everything from the older one.
        store.increment("fresh", 60);
        assert_eq!(store.buckets.lock().unwrap().len(), 1);
    }
}
