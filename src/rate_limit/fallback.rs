use super::{MemoryRateLimiter, RateLimitDecision, RateLimitPolicy, RateLimiter};
use crate::BoxFuture;
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// Primary limiter with an in-memory stand-in for when the primary errors.
///
/// A deliberate denial from the primary is final. Only backend failures
/// route the request to the fallback, so an outage degrades to per-process
/// limits instead of rejecting every request.
pub struct FallbackRateLimiter {
    primary: Arc<dyn RateLimiter>,
    fallback: Arc<MemoryRateLimiter>,
}

impl FallbackRateLimiter {
    #[must_use]
    pub fn new(primary: Arc<dyn RateLimiter>, fallback: Arc<MemoryRateLimiter>) -> Self {
        Self { primary, fallback }
    }

    #[must_use]
    pub fn fallback(&self) -> &Arc<MemoryRateLimiter> {
        &self.fallback
    }
}

impl RateLimiter for FallbackRateLimiter {
    fn check<'a>(
        &'a self,
        key: &'a str,
        policy: RateLimitPolicy,
    ) -> BoxFuture<'a, Result<RateLimitDecision>> {
        Box::pin(async move {
            match self.primary.check(key, policy).await {
                Ok(decision) => Ok(decision),
                Err(err) => {
                    warn!(key, error = %err, "persistent rate limit failed; using in-memory limiter");
                    Ok(self.fallback.allow(key, policy))
                }
            }
        })
    }

    fn is_limited<'a>(
        &'a self,
        key: &'a str,
        policy: RateLimitPolicy,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            match self.primary.is_limited(key, policy).await {
                Ok(limited) => Ok(limited),
                Err(err) => {
                    warn!(key, error = %err, "persistent rate limit failed; using in-memory limiter");
                    Ok(self.fallback.limited(key, policy))
                }
            }
        })
    }

    fn reset<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.fallback.remove(key);
            if let Err(err) = self.primary.reset(key).await {
                warn!(key, error = %err, "failed to reset persistent rate limit");
            }
            Ok(())
        })
    }
}
