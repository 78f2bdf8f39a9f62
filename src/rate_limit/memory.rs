//! In-process fixed-window limiter.
//!
//! Counters live in a `DashMap`, so the read-modify-write for one key happens
//! under that key's shard lock. Counters are lost on restart and are not shared
//! between instances; this limiter only stands in when the table-backed one
//! is unavailable.

use super::{Clock, RateLimitDecision, RateLimitPolicy, RateLimiter, SystemClock};
use crate::BoxFuture;
use anyhow::Result;
use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    sync::{Arc, Weak},
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tracing::debug;

/// How often expired entries are removed.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    reset_at: Instant,
}

impl RateLimitEntry {
    fn open(now: Instant, policy: RateLimitPolicy) -> Self {
        let window = policy.effective_window();
        // Halve until the deadline fits the platform's Instant range.
        let mut reset_at = now.checked_add(window);
        let mut shorter = window;
        while reset_at.is_none() && !shorter.is_zero() {
            shorter /= 2;
            reset_at = now.checked_add(shorter);
        }
        Self {
            count: 1,
            reset_at: reset_at.unwrap_or(now),
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.reset_at <= now
    }
}

pub struct MemoryRateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Count one request for `key` and decide whether it may proceed.
    pub fn allow(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision {
        let now = self.clock.now();

        match self.entries.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateLimitEntry::open(now, policy));
                RateLimitDecision::Allowed
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.expired(now) {
                    *entry = RateLimitEntry::open(now, policy);
                    RateLimitDecision::Allowed
                } else if entry.count >= policy.max_requests {
                    RateLimitDecision::Limited
                } else {
                    entry.count += 1;
                    RateLimitDecision::Allowed
                }
            }
        }
    }

    /// `true` while `key` sits in an open window that reached `max_requests`.
    #[must_use]
    pub fn limited(&self, key: &str, policy: RateLimitPolicy) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.expired(now) && entry.count >= policy.max_requests)
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Current count for `key`, if an entry exists (expired or not).
    #[must_use]
    pub fn count(&self, key: &str) -> Option<u32> {
        self.entries.get(key).map(|entry| entry.count)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry whose window already passed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Sweep on a fixed cadence until the limiter is dropped.
    #[must_use]
    pub fn spawn_sweeper(limiter: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(limiter);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately; skip it so sweeps start after one period.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    debug!("rate limit sweeper stopped: limiter dropped");
                    break;
                };
                let removed = limiter.sweep_expired();
                if removed > 0 {
                    debug!(removed, remaining = limiter.len(), "swept expired rate limit entries");
                }
            }
        })
    }
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRateLimiter")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn check<'a>(
        &'a self,
        key: &'a str,
        policy: RateLimitPolicy,
    ) -> BoxFuture<'a, Result<RateLimitDecision>> {
        Box::pin(async move { Ok(self.allow(key, policy)) })
    }

    fn is_limited<'a>(
        &'a self,
        key: &'a str,
        policy: RateLimitPolicy,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.limited(key, policy)) })
    }

    fn reset<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::ManualClock;

    const POLICY: RateLimitPolicy = RateLimitPolicy::new(3, Duration::from_secs(60));

    fn limiter() -> (MemoryRateLimiter, ManualClock) {
        let clock = ManualClock::default();
        (MemoryRateLimiter::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn denies_after_max_requests() {
        let (limiter, _clock) = limiter();
        for _ in 0..3 {
            assert_eq!(limiter.allow("k", POLICY), RateLimitDecision::Allowed);
        }
        assert_eq!(limiter.allow("k", POLICY), RateLimitDecision::Limited);
    }

    #[test]
    fn denial_does_not_increment() {
        let (limiter, _clock) = limiter();
        for _ in 0..10 {
            let _ = limiter.allow("k", POLICY);
        }
        assert_eq!(limiter.count("k"), Some(3));
    }

    #[test]
    fn oversized_window_is_clamped_instead_of_overflowing() {
        let (limiter, clock) = limiter();
        let policy = RateLimitPolicy::new(1, Duration::MAX);

        assert_eq!(limiter.allow("k", policy), RateLimitDecision::Allowed);
        assert_eq!(limiter.allow("k", policy), RateLimitDecision::Limited);

        clock.advance(Duration::from_secs(24 * 60 * 60));
        assert_eq!(limiter.allow("k", policy), RateLimitDecision::Limited);
    }

    #[test]
    fn limited_does_not_count() {
        let (limiter, clock) = limiter();
        assert!(!limiter.limited("k", POLICY));
        assert!(limiter.is_empty());

        for _ in 0..3 {
            let _ = limiter.allow("k", POLICY);
        }
        assert!(limiter.limited("k", POLICY));
        assert!(limiter.limited("k", POLICY));
        assert_eq!(limiter.count("k"), Some(3));

        clock.advance(Duration::from_secs(60));
        assert!(!limiter.limited("k", POLICY));
    }

    #[test]
    fn window_rollover_resets_count() {
        let (limiter, clock) = limiter();
        for _ in 0..4 {
            let _ = limiter.allow("k", POLICY);
        }
        clock.advance(Duration::from_secs(60));

        assert_eq!(limiter.allow("k", POLICY), RateLimitDecision::Allowed);
        assert_eq!(limiter.count("k"), Some(1));
    }

    #[test]
    fn still_limited_just_before_window_ends() {
        let (limiter, clock) = limiter();
        for _ in 0..3 {
            let _ = limiter.allow("k", POLICY);
        }
        clock.advance(Duration::from_secs(59));
        assert_eq!(limiter.allow("k", POLICY), RateLimitDecision::Limited);
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _clock) = limiter();
        for _ in 0..3 {
            let _ = limiter.allow("a", POLICY);
        }
        assert_eq!(limiter.allow("a", POLICY), RateLimitDecision::Limited);
        assert_eq!(limiter.allow("b", POLICY), RateLimitDecision::Allowed);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let (limiter, clock) = limiter();
        let short = RateLimitPolicy::new(3, Duration::from_secs(10));
        let _ = limiter.allow("short", short);
        let _ = limiter.allow("long", POLICY);

        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.count("short"), None);
        assert_eq!(limiter.count("long"), Some(1));
    }

    #[test]
    fn concurrent_callers_never_exceed_limit() {
        let limiter = Arc::new(MemoryRateLimiter::new());
        let policy = RateLimitPolicy::new(5, Duration::from_secs(60));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.allow("shared", policy).is_allowed())
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(false))
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(allowed, 5);
        assert_eq!(limiter.count("shared"), Some(5));
    }

    #[tokio::test]
    async fn trait_reset_clears_key() -> Result<()> {
        let (limiter, _clock) = limiter();
        for _ in 0..3 {
            limiter.check("k", POLICY).await?;
        }
        assert_eq!(limiter.check("k", POLICY).await?, RateLimitDecision::Limited);

        limiter.reset("k").await?;
        assert_eq!(limiter.check("k", POLICY).await?, RateLimitDecision::Allowed);
        Ok(())
    }

    #[tokio::test]
    async fn sweeper_stops_when_limiter_dropped() {
        let limiter = Arc::new(MemoryRateLimiter::new());
        let handle = MemoryRateLimiter::spawn_sweeper(&limiter, Duration::from_millis(5));
        drop(limiter);
        let finished = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(finished.is_ok());
    }
}
