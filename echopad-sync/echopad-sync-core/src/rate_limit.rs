//! Rate Limiter — fixed-window counters per `(action, identifier)` (spec §4.3).
//!
//! Grounded on `auth::distributed::RateLimiter` in the teacher repo, which
//! runs an atomic Lua script against Redis to avoid lost updates under
//! concurrent callers. The spec keeps `RateBucket` as part of the
//! relational Metadata Store rather than a cache tier, so the same
//! "read-or-create, then increment-or-reset" step here is one
//! row-level-locked transaction against `rate_buckets` instead of a Lua
//! script — see DESIGN.md for why the Redis dependency was dropped.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub action: &'static str,
    pub max: i32,
    pub window_secs: i64,
}

/// Limits from spec §4.3's table.
pub const LIMITS: &[RateLimit] = &[
    RateLimit { action: "login", max: 5, window_secs: 60 },
    RateLimit { action: "register", max: 3, window_secs: 3600 },
    RateLimit { action: "password_reset", max: 3, window_secs: 3600 },
    RateLimit { action: "sync_pull", max: 60, window_secs: 60 },
    RateLimit { action: "sync_push", max: 30, window_secs: 60 },
    RateLimit { action: "file_upload", max: 100, window_secs: 60 },
];

fn limit_for(action: &str) -> RateLimit {
    LIMITS
        .iter()
        .find(|l| l.action == action)
        .copied()
        .unwrap_or(RateLimit { action: "default", max: 60, window_secs: 60 })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Allowed,
    Limited { retry_after_secs: u64 },
}

pub struct RateLimiter {
    pool: PgPool,
}

impl RateLimiter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn check(&self, action: &str, identifier: &str) -> anyhow::Result<RateLimitOutcome> {
        let limit = limit_for(action);
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let existing: Option<(i32, DateTime<Utc>)> = sqlx::query_as(
            "SELECT count, expires_at FROM rate_buckets \
             WHERE action_name = $1 AND identifier = $2 FOR UPDATE",
        )
        .bind(action)
        .bind(identifier)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            None => {
                let expires_at = now + ChronoDuration::seconds(limit.window_secs);
                sqlx::query(
                    "INSERT INTO rate_buckets (action_name, identifier, count, window_start, expires_at) \
                     VALUES ($1, $2, 1, $3, $4)",
                )
                .bind(action)
                .bind(identifier)
                .bind(now)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;
                RateLimitOutcome::Allowed
            }
            Some((_count, expires_at)) if now > expires_at => {
                let new_expires = now + ChronoDuration::seconds(limit.window_secs);
                sqlx::query(
                    "UPDATE rate_buckets SET count = 1, window_start = $3, expires_at = $4 \
                     WHERE action_name = $1 AND identifier = $2",
                )
                .bind(action)
                .bind(identifier)
                .bind(now)
                .bind(new_expires)
                .execute(&mut *tx)
                .await?;
                RateLimitOutcome::Allowed
            }
            Some((count, expires_at)) if count < limit.max => {
                sqlx::query(
                    "UPDATE rate_buckets SET count = count + 1 \
                     WHERE action_name = $1 AND identifier = $2",
                )
                .bind(action)
                .bind(identifier)
                .execute(&mut *tx)
                .await?;
                let _ = expires_at;
                RateLimitOutcome::Allowed
            }
            Some((_count, expires_at)) => {
                let retry_after_secs = (expires_at - now).num_seconds().max(0) as u64;
                // round up to the next whole second
                let retry_after_secs = if (expires_at - now).num_milliseconds() % 1000 != 0 {
                    retry_after_secs + 1
                } else {
                    retry_after_secs
                };
                RateLimitOutcome::Limited { retry_after_secs }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Periodic sweep removing expired buckets, per spec §4.3.
    pub async fn sweep_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM rate_buckets WHERE expires_at < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
