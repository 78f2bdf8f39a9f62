//! Table-backed fixed-window limiter shared by every instance.
//!
//! The whole decision is one statement: the conditional `ON CONFLICT` update
//! only fires when the window rolled over or the counter is below the limit,
//! and Postgres serialises conflicting upserts on the same key. No row
//! returned means the request is denied and nothing was written.

use super::{RateLimitDecision, RateLimitPolicy, RateLimiter};
use crate::BoxFuture;
use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info_span, Instrument};

const CHECK_QUERY: &str = r"
    INSERT INTO rate_limits (key, count, reset_time)
    VALUES ($1, 1, NOW() + make_interval(secs => $2))
    ON CONFLICT (key) DO UPDATE
    SET count = CASE
            WHEN rate_limits.reset_time <= NOW() THEN 1
            ELSE rate_limits.count + 1
        END,
        reset_time = CASE
            WHEN rate_limits.reset_time <= NOW() THEN EXCLUDED.reset_time
            ELSE rate_limits.reset_time
        END
    WHERE rate_limits.reset_time <= NOW() OR rate_limits.count < $3
    RETURNING count
";

const LIMITED_QUERY: &str = r"
    SELECT EXISTS (
        SELECT 1 FROM rate_limits
        WHERE key = $1 AND reset_time > NOW() AND count >= $2
    )
";

const RESET_QUERY: &str = "DELETE FROM rate_limits WHERE key = $1";

#[derive(Debug, Clone)]
pub struct PgRateLimiter {
    pool: PgPool,
}

impl PgRateLimiter {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Count one request for `key` in the shared table.
    ///
    /// # Errors
    /// Returns an error if the database round trip fails.
    pub async fn allow_persistent(
        &self,
        key: &str,
        policy: RateLimitPolicy,
    ) -> Result<RateLimitDecision> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.table = "rate_limits"
        );
        let max_requests = i32::try_from(policy.max_requests).unwrap_or(i32::MAX);
        let row: Option<(i32,)> = sqlx::query_as(CHECK_QUERY)
            .bind(key)
            .bind(policy.effective_window().as_secs_f64())
            .bind(max_requests)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to update rate limit counter")?;

        Ok(match row {
            Some(_) => RateLimitDecision::Allowed,
            None => RateLimitDecision::Limited,
        })
    }

    /// Read the counter for `key` without touching it.
    ///
    /// # Errors
    /// Returns an error if the database round trip fails.
    pub async fn limited_persistent(&self, key: &str, policy: RateLimitPolicy) -> Result<bool> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.table = "rate_limits"
        );
        let max_requests = i32::try_from(policy.max_requests).unwrap_or(i32::MAX);
        sqlx::query_scalar::<_, bool>(LIMITED_QUERY)
            .bind(key)
            .bind(max_requests)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to read rate limit counter")
    }

    /// # Errors
    /// Returns an error if the row cannot be deleted.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.table = "rate_limits"
        );
        sqlx::query(RESET_QUERY)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reset rate limit counter")?;
        Ok(())
    }
}

impl RateLimiter for PgRateLimiter {
    fn check<'a>(
        &'a self,
        key: &'a str,
        policy: RateLimitPolicy,
    ) -> BoxFuture<'a, Result<RateLimitDecision>> {
        Box::pin(self.allow_persistent(key, policy))
    }

    fn is_limited<'a>(
        &'a self,
        key: &'a str,
        policy: RateLimitPolicy,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.limited_persistent(key, policy))
    }

    fn reset<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.delete(key))
    }
}
