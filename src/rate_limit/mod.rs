//! Fixed-window rate limiting.
//!
//! A window opens on the first request for a key and lasts `window`; up to
//! `max_requests` requests are allowed inside it. Once the window passes the
//! next request opens a fresh window with a count of 1. Denied requests never
//! increment the counter.
//!
//! Two backends implement [`RateLimiter`]:
//!
//! - [`PgRateLimiter`]: shared `rate_limits` table, consistent across instances.
//! - [`MemoryRateLimiter`]: per-process map, swept once per minute.
//!
//! [`FallbackRateLimiter`] composes them: the persistent limiter decides, and
//! the in-memory limiter takes over only when the persistent check errors.

mod clock;
mod fallback;
mod memory;
mod persistent;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback::FallbackRateLimiter;
pub use memory::{MemoryRateLimiter, SWEEP_INTERVAL};
pub use persistent::PgRateLimiter;

use crate::BoxFuture;
use anyhow::Result;
use std::time::Duration;

/// Longest window a policy may use (one year); longer windows are clamped.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// `window` capped at [`MAX_WINDOW`].
    #[must_use]
    pub fn effective_window(self) -> Duration {
        self.window.min(MAX_WINDOW)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

impl RateLimitDecision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

pub trait RateLimiter: Send + Sync {
    /// Count one request for `key` and decide whether it may proceed.
    ///
    /// # Errors
    /// Returns an error when the backing store cannot be consulted.
    fn check<'a>(
        &'a self,
        key: &'a str,
        policy: RateLimitPolicy,
    ) -> BoxFuture<'a, Result<RateLimitDecision>>;

    /// Whether `key` has used up its current window, without counting a request.
    ///
    /// # Errors
    /// Returns an error when the backing store cannot be consulted.
    fn is_limited<'a>(
        &'a self,
        key: &'a str,
        policy: RateLimitPolicy,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Drop the window for `key` so the next request starts from zero.
    ///
    /// # Errors
    /// Returns an error when the backing store cannot be updated.
    fn reset<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Key for per-IP registration limits.
#[must_use]
pub fn ip_key(ip: &str) -> String {
    format!("ip:{ip}")
}

/// Key for per-email registration limits; `email` must already be normalized.
#[must_use]
pub fn email_key(email: &str) -> String {
    format!("email:{email}")
}

/// Key for admin authentication attempts.
#[must_use]
pub fn admin_login_key(ip: &str) -> String {
    format!("admin_login:{ip}")
}
