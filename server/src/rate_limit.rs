//! Sliding-window request limiter keyed by client address.
//!
//! State is per process. Several instances behind a load balancer each keep
//! their own windows, so the effective limit scales with the instance count.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub struct RateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { limit, window, hits: Mutex::new(HashMap::new()) }
    }

    /// Record a request for `key`; `false` when the window is already full.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut hits = self.hits.lock();
        // drop idle clients so the map does not grow without bound
        hits.retain(|_, q| q.back().is_some_and(|t| now.saturating_duration_since(*t) < self.window));
        let q = hits.entry(key.to_string()).or_default();
        while q.front().is_some_and(|t| now.saturating_duration_since(*t) >= self.window) {
            q.pop_front();
        }
        if q.len() >= self.limit {
            return false;
        }
        q.push_back(now);
        true
    }
}
