//! Database-backed failure counters and temporary lockouts.
//!
//! Flow Overview:
//! 1) Verify failures count against a per-session key, send-code requests
//!    against a per-user key, with independently configured thresholds.
//! 2) Reaching a threshold inside the rolling window locks the key for the
//!    configured duration; locked keys are rejected without further
//!    counting, so lockouts do not compound.
//! 3) Counters reset on success; `clear_keys` is the audited override used
//!    by the administrator bypass.
//!
//! Counters mutate through single-statement upserts so concurrent failures
//! never race a read-modify-write cycle. `PostgreSQL` synchronizes state
//! across service instances.

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{info, Instrument};
use uuid::Uuid;

use super::clock::TimeSource;

const DEFAULT_VERIFY_THRESHOLD: i64 = 5;
const DEFAULT_SEND_THRESHOLD: i64 = 3;
const DEFAULT_WINDOW_SECONDS: i64 = 10 * 60;
const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockoutDecision {
    Allowed,
    Locked { retry_after_seconds: u64 },
}

/// Threshold and window configuration for one key kind.
#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    threshold: i64,
    window_seconds: i64,
    lockout_seconds: i64,
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(threshold: i64, window_seconds: i64, lockout_seconds: i64) -> Self {
        Self {
            threshold: threshold.max(1),
            window_seconds: window_seconds.max(1),
            lockout_seconds: lockout_seconds.max(1),
        }
    }

    #[must_use]
    pub fn verify_default() -> Self {
        Self::new(
            DEFAULT_VERIFY_THRESHOLD,
            DEFAULT_WINDOW_SECONDS,
            DEFAULT_LOCKOUT_SECONDS,
        )
    }

    #[must_use]
    pub fn send_default() -> Self {
        Self::new(
            DEFAULT_SEND_THRESHOLD,
            DEFAULT_WINDOW_SECONDS,
            DEFAULT_LOCKOUT_SECONDS,
        )
    }

    #[must_use]
    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

/// Lockout key for code-verification attempts, scoped to one session.
pub(super) fn verify_key(session_hash: &[u8]) -> String {
    let digest = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(session_hash);
    format!("verify:{digest}")
}

/// Lockout key for send-code requests, scoped to one user.
pub(super) fn send_key(user_id: Uuid) -> String {
    format!("send:{user_id}")
}

#[derive(Clone)]
pub struct LockoutManager {
    pool: PgPool,
    clock: Arc<dyn TimeSource>,
    verify_policy: LockoutPolicy,
    send_policy: LockoutPolicy,
}

impl LockoutManager {
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            pool,
            clock,
            verify_policy: LockoutPolicy::verify_default(),
            send_policy: LockoutPolicy::send_default(),
        }
    }

    #[must_use]
    pub fn with_verify_policy(mut self, policy: LockoutPolicy) -> Self {
        self.verify_policy = policy;
        self
    }

    #[must_use]
    pub fn with_send_policy(mut self, policy: LockoutPolicy) -> Self {
        self.send_policy = policy;
        self
    }

    /// Read-only gate consulted before a verify attempt.
    pub(super) async fn check_verify(&self, session_hash: &[u8]) -> Result<LockoutDecision> {
        self.check(&verify_key(session_hash)).await
    }

    /// Count a failed verify attempt; must run before the error returns so
    /// retries are throttled.
    pub(super) async fn record_verify_failure(&self, session_hash: &[u8]) -> Result<()> {
        self.record(&verify_key(session_hash), self.verify_policy)
            .await
            .map(|_| ())
    }

    /// Reset the verify counter after a successful verification.
    pub(super) async fn reset_verify(&self, session_hash: &[u8]) -> Result<()> {
        self.reset(&verify_key(session_hash)).await
    }

    /// Gate and count a send-code request in one atomic statement.
    ///
    /// While locked the attempt is rejected without counting; otherwise the
    /// counter advances and the lock engages for later calls once the
    /// threshold is reached.
    pub(super) async fn check_and_record_send(&self, user_id: Uuid) -> Result<LockoutDecision> {
        self.record(&send_key(user_id), self.send_policy).await
    }

    /// Audited override used only by the administrator bypass; clearing
    /// keys with no lockout row is a no-op.
    pub(super) async fn clear_keys(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let query = "DELETE FROM auth_lockouts WHERE key = ANY($1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(keys)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear lockout keys")?;
        if result.rows_affected() > 0 {
            info!(
                cleared = result.rows_affected(),
                "lockout state cleared by bypass override"
            );
        }
        Ok(())
    }

    async fn check(&self, key: &str) -> Result<LockoutDecision> {
        let now = self.clock.now();
        let query = "SELECT locked_until FROM auth_lockouts WHERE key = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to check lockout state")?;

        let locked_until: Option<DateTime<Utc>> = match row {
            Some(row) => row.get("locked_until"),
            None => None,
        };

        Ok(decision_for(locked_until, now))
    }

    /// Atomic counter advance: a data-modifying CTE captures the prior lock
    /// state and applies the windowed increment in the same statement, so
    /// concurrent failures cannot interleave between read and write.
    async fn record(&self, key: &str, policy: LockoutPolicy) -> Result<LockoutDecision> {
        let now = self.clock.now();
        let window_cutoff = now - Duration::seconds(policy.window_seconds);
        let lock_expiry = now + Duration::seconds(policy.lockout_seconds);

        let query = r"
            WITH prior AS (
                SELECT locked_until FROM auth_lockouts WHERE key = $1
            ), attempt AS (
                INSERT INTO auth_lockouts (key, failed_attempts, window_start, locked_until)
                VALUES ($1, 1, $2, CASE WHEN $3 <= 1 THEN $4 END)
                ON CONFLICT (key) DO UPDATE SET
                    failed_attempts = CASE
                        WHEN auth_lockouts.locked_until IS NOT NULL
                             AND auth_lockouts.locked_until > $2
                            THEN auth_lockouts.failed_attempts
                        WHEN auth_lockouts.window_start <= $5
                            THEN 1
                        ELSE auth_lockouts.failed_attempts + 1
                    END,
                    window_start = CASE
                        WHEN auth_lockouts.locked_until IS NOT NULL
                             AND auth_lockouts.locked_until > $2
                            THEN auth_lockouts.window_start
                        WHEN auth_lockouts.window_start <= $5
                            THEN $2
                        ELSE auth_lockouts.window_start
                    END,
                    locked_until = CASE
                        WHEN auth_lockouts.locked_until IS NOT NULL
                             AND auth_lockouts.locked_until > $2
                            THEN auth_lockouts.locked_until
                        WHEN (CASE
                                WHEN auth_lockouts.window_start <= $5 THEN 1
                                ELSE auth_lockouts.failed_attempts + 1
                              END) >= $3
                            THEN $4
                        ELSE NULL
                    END
                RETURNING locked_until
            )
            SELECT (SELECT locked_until FROM prior) AS prior_locked_until
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = "auth_lockouts windowed upsert"
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(now)
            .bind(policy.threshold)
            .bind(lock_expiry)
            .bind(window_cutoff)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to record lockout attempt")?;

        let prior_locked_until: Option<DateTime<Utc>> = row.get("prior_locked_until");
        Ok(decision_for(prior_locked_until, now))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let query = "DELETE FROM auth_lockouts WHERE key = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reset lockout state")?;
        Ok(())
    }
}

fn decision_for(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> LockoutDecision {
    match locked_until {
        Some(until) if until > now => {
            let remaining = (until - now).num_seconds();
            LockoutDecision::Locked {
                retry_after_seconds: u64::try_from(remaining.max(1)).unwrap_or(1),
            }
        }
        _ => LockoutDecision::Allowed,
    }
}
