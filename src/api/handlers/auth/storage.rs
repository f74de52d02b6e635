//! Database helpers for credentials, sessions, and one-time email codes.
//!
//! All timestamps that feed expiry math are bound from the shared
//! `TimeSource` rather than computed with `NOW()`, so every comparison in
//! the crate happens between `DateTime<Utc>` values produced by one clock.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{generate_session_token, hash_session_token, is_unique_violation};

/// Credential row matched by PIN digest.
pub(super) struct CredentialRecord {
    pub(super) user_id: Uuid,
    pub(super) email: String,
    pub(super) is_admin: bool,
    pub(super) two_fa_enabled: bool,
}

/// Session row as stored; expiry is evaluated by the caller against the
/// shared clock so `Expired` stays distinguishable from `NotFound`.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) two_fa_required: bool,
    pub(crate) two_fa_satisfied: bool,
    pub(crate) expires_at: DateTime<Utc>,
}

/// The live (unconsumed, unsuperseded) code for a session.
pub(super) struct CodeRecord {
    pub(super) id: Uuid,
    pub(super) code: String,
    pub(super) expires_at: DateTime<Utc>,
}

/// Contact, 2FA flags, and the opaque permission map for a user.
///
/// Permissions are carried through untouched; this subsystem never
/// interprets them.
pub(super) struct UserContact {
    pub(super) email: String,
    pub(super) email_verified: bool,
    pub(super) is_admin: bool,
    pub(super) permissions: serde_json::Value,
}

/// Outcome of a first-time 2FA email update.
#[derive(Debug)]
pub(super) enum SetEmailOutcome {
    Updated,
    AlreadyVerified,
    NotFound,
}

pub(super) async fn lookup_credential(
    pool: &PgPool,
    pin_hash: &[u8],
) -> Result<Option<CredentialRecord>> {
    let query = r"
        SELECT id, email, is_admin, two_fa_enabled
        FROM users
        WHERE pin_hash = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(pin_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credential by pin digest")?;

    Ok(row.map(|row| CredentialRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        is_admin: row.get("is_admin"),
        two_fa_enabled: row.get("two_fa_enabled"),
    }))
}

/// Insert a fresh session and return the raw token.
///
/// Retries on the (astronomically unlikely) token-hash collision the same
/// way new tokens are minted, instead of surfacing a conflict.
pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    two_fa_required: bool,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<String> {
    let expires_at = now + Duration::seconds(ttl_seconds);
    let query = r"
        INSERT INTO auth_sessions
            (user_id, session_hash, two_fa_required, two_fa_satisfied, created_at, expires_at)
        VALUES ($1, $2, $3, FALSE, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(two_fa_required)
            .bind(now)
            .bind(expires_at)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(super) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
    now: DateTime<Utc>,
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT user_id, two_fa_required, two_fa_satisfied, expires_at
        FROM auth_sessions
        WHERE session_hash = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    if row.is_none() {
        return Ok(None);
    }

    // Record activity for audit/visibility without extending the TTL.
    let query = r"
        UPDATE auth_sessions
        SET last_seen_at = $2
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .bind(now)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("user_id"),
        two_fa_required: row.get("two_fa_required"),
        two_fa_satisfied: row.get("two_fa_satisfied"),
        expires_at: row.get("expires_at"),
    }))
}

/// Promote a session after a successful code verification.
///
/// Idempotent and monotonic: the flag only ever goes false -> true.
pub(super) async fn mark_two_fa_satisfied(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = r"
        UPDATE auth_sessions
        SET two_fa_satisfied = TRUE
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark session two_fa_satisfied")?;
    Ok(())
}

/// Persist a new one-time code, superseding any live code for the session.
///
/// Both steps share a transaction so "at most one live code per session"
/// holds even under concurrent sends; the last writer wins.
pub(super) async fn issue_email_code(
    pool: &PgPool,
    token_hash: &[u8],
    code: &str,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<()> {
    let expires_at = now + Duration::seconds(ttl_seconds);
    let mut tx = pool.begin().await.context("begin issue-code transaction")?;

    let query = r"
        UPDATE email_codes
        SET superseded_at = $2
        WHERE session_hash = $1
          AND consumed_at IS NULL
          AND superseded_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .bind(now)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to supersede previous email code")?;

    let query = r"
        INSERT INTO email_codes (session_hash, code, created_at, expires_at)
        VALUES ($1, $2, $3, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .bind(code)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert email code")?;

    tx.commit().await.context("commit issue-code transaction")?;
    Ok(())
}

pub(super) async fn current_email_code(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<CodeRecord>> {
    let query = r"
        SELECT id, code, expires_at
        FROM email_codes
        WHERE session_hash = $1
          AND consumed_at IS NULL
          AND superseded_at IS NULL
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load current email code")?;

    Ok(row.map(|row| CodeRecord {
        id: row.get("id"),
        code: row.get("code"),
        expires_at: row.get("expires_at"),
    }))
}

/// Atomically claim a code. Exactly one concurrent caller observes `true`;
/// the rest see the row already consumed.
pub(super) async fn consume_email_code(
    pool: &PgPool,
    code_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let query = r"
        UPDATE email_codes
        SET consumed_at = $2
        WHERE id = $1
          AND consumed_at IS NULL
          AND superseded_at IS NULL
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(code_id)
        .bind(now)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume email code")?;

    Ok(row.is_some())
}

pub(super) async fn lookup_contact(pool: &PgPool, user_id: Uuid) -> Result<Option<UserContact>> {
    let query = r"
        SELECT email, email_verified, is_admin, permissions
        FROM users
        WHERE id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user contact")?;

    Ok(row.map(|row| UserContact {
        email: row.get("email"),
        email_verified: row.get("email_verified"),
        is_admin: row.get("is_admin"),
        permissions: row.get("permissions"),
    }))
}

/// First-time setup only: update the 2FA destination email.
pub(super) async fn set_two_fa_email(
    pool: &PgPool,
    user_id: Uuid,
    email: &str,
    now: DateTime<Utc>,
) -> Result<SetEmailOutcome> {
    let query = r"
        UPDATE users
        SET email = $2, updated_at = $3
        WHERE id = $1
          AND email_verified = FALSE
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(email)
        .bind(now)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to set 2fa email")?;

    if row.is_some() {
        return Ok(SetEmailOutcome::Updated);
    }

    match lookup_contact(pool, user_id).await? {
        Some(contact) if contact.email_verified => Ok(SetEmailOutcome::AlreadyVerified),
        Some(_) => Ok(SetEmailOutcome::Updated),
        None => Ok(SetEmailOutcome::NotFound),
    }
}

/// Collaborator entry point for the first-time-setup flow: flag the email
/// as verified and enable 2FA for subsequent logins.
pub(crate) async fn mark_email_verified(
    pool: &PgPool,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET email_verified = TRUE,
            two_fa_enabled = TRUE,
            updated_at = $2
        WHERE id = $1
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(now)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;

    Ok(row.is_some())
}

/// Disable 2FA for a user; the next PIN login re-enters first-time setup.
pub(super) async fn reset_two_fa(pool: &PgPool, user_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    let query = r"
        UPDATE users
        SET two_fa_enabled = FALSE,
            email_verified = FALSE,
            updated_at = $2
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to reset two_fa flags")?;
    Ok(())
}

/// Session digests for a user, used to build per-session lockout keys.
pub(super) async fn session_hashes_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Vec<u8>>> {
    let query = r"
        SELECT session_hash
        FROM auth_sessions
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list session hashes for user")?;

    Ok(rows.into_iter().map(|row| row.get("session_hash")).collect())
}

#[cfg(test)]
mod tests {
    use super::{SetEmailOutcome, SessionRecord, UserContact};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn set_email_outcome_debug_names() {
        assert_eq!(format!("{:?}", SetEmailOutcome::Updated), "Updated");
        assert_eq!(
            format!("{:?}", SetEmailOutcome::AlreadyVerified),
            "AlreadyVerified"
        );
        assert_eq!(format!("{:?}", SetEmailOutcome::NotFound), "NotFound");
    }

    #[test]
    fn session_record_holds_values() {
        let expires_at = Utc::now() + Duration::hours(1);
        let record = SessionRecord {
            user_id: Uuid::nil(),
            two_fa_required: true,
            two_fa_satisfied: false,
            expires_at,
        };
        assert_eq!(record.user_id, Uuid::nil());
        assert!(record.two_fa_required);
        assert!(!record.two_fa_satisfied);
        assert_eq!(record.expires_at, expires_at);
    }

    #[test]
    fn user_contact_holds_values() {
        let contact = UserContact {
            email: "desk@clinic.org".to_string(),
            email_verified: true,
            is_admin: false,
            permissions: serde_json::json!({"registrations": "read"}),
        };
        assert_eq!(contact.email, "desk@clinic.org");
        assert!(contact.email_verified);
        assert!(!contact.is_admin);
        assert_eq!(contact.permissions["registrations"], "read");
    }
}
