//! Session resolution and the authentication context handed to handlers.
//!
//! Expiry is evaluated here against the shared `TimeSource`, never inside
//! SQL, so an expired-but-known token resolves to `Expired` rather than
//! vanishing, and both sides of the comparison are `DateTime<Utc>`.

use axum::http::HeaderMap;
use sqlx::PgPool;

use super::clock::TimeSource;
use super::error::AuthError;
use super::storage::{lookup_contact, lookup_session, SessionRecord};
use super::utils::{extract_bearer_token, hash_session_token};

/// Outcome of resolving a session token.
pub(super) enum SessionResolution {
    Active(SessionRecord),
    Expired,
    NotFound,
}

/// Authentication context for a request, classified from a resolved
/// session instead of ad hoc boolean checks at call sites.
pub(crate) enum AuthContext {
    Unauthenticated,
    /// PIN accepted, second factor still outstanding.
    PinVerified {
        session: SessionRecord,
        session_hash: Vec<u8>,
    },
    /// PIN accepted and the second factor satisfied (or not required).
    /// Carries the user's opaque permission map, untouched.
    FullyAuthenticated {
        session: SessionRecord,
        session_hash: Vec<u8>,
        permissions: serde_json::Value,
    },
}

pub(super) async fn resolve_session(
    pool: &PgPool,
    clock: &dyn TimeSource,
    token: &str,
) -> anyhow::Result<SessionResolution> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(SessionResolution::NotFound);
    }

    let now = clock.now();
    let token_hash = hash_session_token(token);
    match lookup_session(pool, &token_hash, now).await? {
        Some(record) => {
            if now >= record.expires_at {
                Ok(SessionResolution::Expired)
            } else {
                Ok(SessionResolution::Active(record))
            }
        }
        None => Ok(SessionResolution::NotFound),
    }
}

/// Resolve a session token or fail with `SessionInvalid`.
///
/// Returns the record together with the token digest used for storage and
/// lockout keys.
pub(super) async fn require_session(
    pool: &PgPool,
    clock: &dyn TimeSource,
    token: &str,
) -> Result<(SessionRecord, Vec<u8>), AuthError> {
    match resolve_session(pool, clock, token).await {
        Ok(SessionResolution::Active(record)) => Ok((record, hash_session_token(token.trim()))),
        Ok(SessionResolution::Expired | SessionResolution::NotFound) => {
            Err(AuthError::SessionInvalid)
        }
        Err(err) => Err(AuthError::storage("failed to resolve session", &err)),
    }
}

/// Classify the caller from the `Authorization` bearer token.
pub(crate) async fn resolve_context(
    headers: &HeaderMap,
    pool: &PgPool,
    clock: &dyn TimeSource,
) -> Result<AuthContext, AuthError> {
    let Some(token) = extract_bearer_token(headers) else {
        return Ok(AuthContext::Unauthenticated);
    };

    let (session, session_hash) = require_session(pool, clock, &token).await?;

    let permissions = if session.two_fa_required && !session.two_fa_satisfied {
        None
    } else {
        // Fully authenticated callers carry their permission map through.
        let contact = lookup_contact(pool, session.user_id)
            .await
            .map_err(|err| AuthError::storage("failed to load user permissions", &err))?
            .ok_or(AuthError::SessionInvalid)?;
        Some(contact.permissions)
    };

    Ok(classify(session, session_hash, permissions))
}

fn classify(
    session: SessionRecord,
    session_hash: Vec<u8>,
    permissions: Option<serde_json::Value>,
) -> AuthContext {
    if session.two_fa_required && !session.two_fa_satisfied {
        AuthContext::PinVerified {
            session,
            session_hash,
        }
    } else {
        AuthContext::FullyAuthenticated {
            session,
            session_hash,
            permissions: permissions.unwrap_or_default(),
        }
    }
}
