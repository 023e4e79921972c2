//! Per-user flood control (token bucket).
//!
//! Applied at submission-flow entry points before any draft state exists. The
//! bucket map is a hot, frequently-written structure; a race letting one extra
//! action through under contention is acceptable, so callers just wrap the
//! limiter in a mutex rather than anything fancier.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

#[derive(Clone, Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Clone, Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_tokens: f64,
    refill_per_sec: f64,
    buckets: HashMap<UserId, Bucket>,
}

impl RateLimiter {
    /// `max_requests` actions per `window`, per user.
    pub fn new(enabled: bool, max_requests: u32, window: Duration) -> Self {
        let max_tokens = max_requests as f64;
        let window_secs = window.as_secs_f64().max(1e-9);

        Self {
            enabled,
            max_tokens,
            refill_per_sec: max_tokens / window_secs,
            buckets: HashMap::new(),
        }
    }

    /// Returns whether the action is allowed, and if not, how long until the
    /// next token becomes available.
    pub fn check(&mut self, user: UserId) -> (bool, Option<Duration>) {
        self.check_at(user, Instant::now())
    }

    pub fn check_at(&mut self, user: UserId, now: Instant) -> (bool, Option<Duration>) {
        if !self.enabled {
            return (true, None);
        }

        let bucket = self.buckets.entry(user).or_insert_with(|| Bucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return (true, None);
        }

        let secs = (1.0 - bucket.tokens) / self.refill_per_sec;
        (false, Some(Duration::from_secs_f64(secs.max(0.0))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_capped_then_refills() {
        let mut rl = RateLimiter::new(true, 2, Duration::from_secs(10));
        let t0 = Instant::now();
        let u = UserId(1);

        assert!(rl.check_at(u, t0).0);
        assert!(rl.check_at(u, t0).0);

        let (ok, retry) = rl.check_at(u, t0);
        assert!(!ok);
        assert!(retry.unwrap() > Duration::from_secs(0));

        // One token refills every 5s at 2 per 10s.
        assert!(rl.check_at(u, t0 + Duration::from_secs(6)).0);
    }

    #[test]
    fn users_are_throttled_independently() {
        let mut rl = RateLimiter::new(true, 1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(rl.check_at(UserId(1), t0).0);
        assert!(!rl.check_at(UserId(1), t0).0);
        assert!(rl.check_at(UserId(2), t0).0);
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let mut rl = RateLimiter::new(false, 1, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..10 {
            assert!(rl.check_at(UserId(7), t0).0);
        }
    }
}
