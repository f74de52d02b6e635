//! Email one-time-code endpoints: setup, send, verify, disable.
//!
//! Per-session code lifecycle: `NoCode -> CodeIssued -> (Consumed |
//! Expired | Superseded)`. Expiry is always checked before the value, so
//! an expired-but-correct code reports `CodeExpired`, never `InvalidCode`.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

use super::error::AuthError;
use super::lockout::LockoutDecision;
use super::session::{require_session, resolve_context, AuthContext};
use super::state::AuthState;
use super::storage::{
    consume_email_code, current_email_code, issue_email_code, lookup_contact,
    mark_two_fa_satisfied, reset_two_fa, set_two_fa_email, CodeRecord, SetEmailOutcome,
};
use super::types::{
    DisableTwoFaRequest, MessageResponse, SendCodeRequest, SendCodeResponse, SetTwoFaEmailRequest,
    TwoFaSetupRequest, TwoFaSetupResponse, VerifyCodeRequest, VerifyCodeResponse,
};
use super::utils::{generate_email_code, normalize_email, valid_email};
use crate::api::email::EmailMessage;

#[utoipa::path(
    post,
    path = "/v1/2fa/setup",
    request_body = TwoFaSetupRequest,
    responses(
        (status = 200, description = "Setup state for the session's user", body = TwoFaSetupResponse),
        (status = 401, description = "Session invalid", body = String),
        (status = 503, description = "Store unavailable", body = String)
    ),
    tag = "2fa"
)]
pub async fn setup(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFaSetupRequest>>,
) -> impl IntoResponse {
    let request: TwoFaSetupRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let (session, _session_hash) =
        match require_session(&pool, auth_state.clock(), &request.session_token).await {
            Ok(resolved) => resolved,
            Err(err) => return err.into_response(),
        };

    let contact = match lookup_contact(&pool, session.user_id).await {
        Ok(Some(contact)) => contact,
        Ok(None) => return AuthError::SessionInvalid.into_response(),
        Err(err) => return AuthError::storage("failed to load user contact", &err).into_response(),
    };

    let setup_required = !contact.email_verified;
    let response = TwoFaSetupResponse {
        setup_required,
        email_address: contact.email,
        message: if setup_required {
            "Confirm the email address to finish two-factor setup".to_string()
        } else {
            "Two-factor authentication is already configured".to_string()
        },
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/2fa/set-email",
    request_body = SetTwoFaEmailRequest,
    responses(
        (status = 200, description = "Email updated for first-time setup", body = MessageResponse),
        (status = 400, description = "Invalid email", body = String),
        (status = 401, description = "Session invalid", body = String),
        (status = 409, description = "Email already verified", body = String)
    ),
    tag = "2fa"
)]
pub async fn set_email(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SetTwoFaEmailRequest>>,
) -> impl IntoResponse {
    let request: SetTwoFaEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let (session, _session_hash) =
        match require_session(&pool, auth_state.clock(), &request.session_token).await {
            Ok(resolved) => resolved,
            Err(err) => return err.into_response(),
        };

    let now = auth_state.clock().now();
    match set_two_fa_email(&pool, session.user_id, &email, now).await {
        Ok(SetEmailOutcome::Updated) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("Two-factor email updated to {email}"),
            }),
        )
            .into_response(),
        Ok(SetEmailOutcome::AlreadyVerified) => AuthError::Conflict.into_response(),
        Ok(SetEmailOutcome::NotFound) => AuthError::SessionInvalid.into_response(),
        Err(err) => AuthError::storage("failed to update 2fa email", &err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/2fa/send-code",
    request_body = SendCodeRequest,
    responses(
        (status = 200, description = "Code generated and dispatched", body = SendCodeResponse),
        (status = 401, description = "Session invalid", body = String),
        (status = 429, description = "Rate limited", body = String),
        (status = 502, description = "Email delivery failed", body = String)
    ),
    tag = "2fa"
)]
pub async fn send_code(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SendCodeRequest>>,
) -> impl IntoResponse {
    let request: SendCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let (session, session_hash) =
        match require_session(&pool, auth_state.clock(), &request.session_token).await {
            Ok(resolved) => resolved,
            Err(err) => return err.into_response(),
        };

    match dispatch_code(&pool, &auth_state, session.user_id, &session_hash).await {
        Ok(email) => (
            StatusCode::OK,
            Json(SendCodeResponse {
                message: format!("Verification code sent to {email}"),
                email,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn dispatch_code(
    pool: &PgPool,
    auth_state: &AuthState,
    user_id: Uuid,
    session_hash: &[u8],
) -> Result<String, AuthError> {
    // The exempt identity skips the gate entirely: no counter is ever
    // incremented for it.
    if !auth_state.bypass().is_exempt(user_id) {
        match auth_state.lockouts().check_and_record_send(user_id).await {
            Ok(LockoutDecision::Allowed) => {}
            Ok(LockoutDecision::Locked {
                retry_after_seconds,
            }) => {
                return Err(AuthError::RateLimited {
                    retry_after_seconds,
                })
            }
            Err(err) => return Err(AuthError::storage("send-code lockout check failed", &err)),
        }
    }

    let contact = lookup_contact(pool, user_id)
        .await
        .map_err(|err| AuthError::storage("failed to load user contact", &err))?
        .ok_or(AuthError::SessionInvalid)?;

    let destination = if contact.is_admin {
        auth_state
            .config()
            .admin_two_fa_email()
            .map(str::to_string)
            .unwrap_or(contact.email)
    } else {
        contact.email
    };

    let code = generate_email_code()
        .map_err(|err| AuthError::storage("failed to generate code", &err))?;
    let now = auth_state.clock().now();

    // Persist before sending: a delivery failure must leave the row in
    // place so a client retry stays consistent.
    issue_email_code(
        pool,
        session_hash,
        &code,
        now,
        auth_state.config().code_ttl_seconds(),
    )
    .await
    .map_err(|err| AuthError::storage("failed to persist email code", &err))?;

    let message = EmailMessage {
        to_email: destination.clone(),
        template: "two_fa_code".to_string(),
        payload_json: json!({ "email": destination, "code": code }).to_string(),
    };

    let timeout = Duration::from_secs(auth_state.config().email_timeout_seconds());
    match tokio::time::timeout(timeout, auth_state.email_sender().send(&message)).await {
        Ok(Ok(())) => Ok(destination),
        Ok(Err(err)) => {
            error!("email transport reported hard failure: {err}");
            Err(AuthError::EmailDeliveryFailed)
        }
        Err(_elapsed) => {
            error!("email send timed out after {}s", timeout.as_secs());
            Err(AuthError::EmailDeliveryFailed)
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/2fa/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Code accepted, session promoted", body = VerifyCodeResponse),
        (status = 400, description = "No code issued or code expired", body = String),
        (status = 401, description = "Invalid code or session", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "2fa"
)]
pub async fn verify(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> impl IntoResponse {
    let request: VerifyCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let (session, session_hash) =
        match require_session(&pool, auth_state.clock(), &request.session_token).await {
            Ok(resolved) => resolved,
            Err(err) => return err.into_response(),
        };

    match verify_code_for_session(
        &pool,
        &auth_state,
        session.user_id,
        &session_hash,
        &request.email_code,
    )
    .await
    {
        Ok(()) => (StatusCode::OK, Json(VerifyCodeResponse { success: true })).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Expiry always wins over value comparison: an expired code reports
/// `CodeExpired` without the submitted value being inspected.
pub(super) fn evaluate_code(
    record: &CodeRecord,
    submitted: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), AuthError> {
    if now >= record.expires_at {
        return Err(AuthError::CodeExpired);
    }
    if record.code != submitted.trim() {
        return Err(AuthError::InvalidCode);
    }
    Ok(())
}

/// Shared verification core for `verify` and `disable`.
///
/// Ordering guarantee: lockout gate, then code presence, then expiry, then
/// value comparison, then the atomic consume.
async fn verify_code_for_session(
    pool: &PgPool,
    auth_state: &AuthState,
    user_id: Uuid,
    session_hash: &[u8],
    submitted_code: &str,
) -> Result<(), AuthError> {
    let exempt = auth_state.bypass().is_exempt(user_id);
    if !exempt {
        match auth_state.lockouts().check_verify(session_hash).await {
            Ok(LockoutDecision::Allowed) => {}
            Ok(LockoutDecision::Locked {
                retry_after_seconds,
            }) => {
                return Err(AuthError::RateLimited {
                    retry_after_seconds,
                })
            }
            Err(err) => return Err(AuthError::storage("verify lockout check failed", &err)),
        }
    }

    let record = current_email_code(pool, session_hash)
        .await
        .map_err(|err| AuthError::storage("failed to load email code", &err))?
        .ok_or(AuthError::NoCodeIssued)?;

    let now = auth_state.clock().now();
    if let Err(err) = evaluate_code(&record, submitted_code, now) {
        if matches!(err, AuthError::InvalidCode) && !exempt {
            // Count the failure before returning so retries are throttled.
            if let Err(err) = auth_state
                .lockouts()
                .record_verify_failure(session_hash)
                .await
            {
                return Err(AuthError::storage("failed to record verify failure", &err));
            }
        }
        return Err(err);
    }

    let consumed = consume_email_code(pool, record.id, now)
        .await
        .map_err(|err| AuthError::storage("failed to consume email code", &err))?;
    if !consumed {
        // A concurrent verify won the claim; this caller observes the code
        // as already spent.
        return Err(AuthError::InvalidCode);
    }

    if !exempt {
        if let Err(err) = auth_state.lockouts().reset_verify(session_hash).await {
            return Err(AuthError::storage("failed to reset verify counter", &err));
        }
    }

    mark_two_fa_satisfied(pool, session_hash)
        .await
        .map_err(|err| AuthError::storage("failed to promote session", &err))?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/2fa/disable",
    request_body = DisableTwoFaRequest,
    responses(
        (status = 200, description = "Two-factor disabled", body = VerifyCodeResponse),
        (status = 400, description = "No code issued or code expired", body = String),
        (status = 401, description = "Invalid code or session", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "2fa"
)]
pub async fn disable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<DisableTwoFaRequest>>,
) -> impl IntoResponse {
    let request: DisableTwoFaRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Operates on the currently-authenticated identity from the bearer
    // token; handlers pattern-match the context instead of flag-checking.
    let context = match resolve_context(&headers, &pool, auth_state.clock()).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    let (session, session_hash) = match context {
        AuthContext::PinVerified {
            session,
            session_hash,
        }
        | AuthContext::FullyAuthenticated {
            session,
            session_hash,
            ..
        } => (session, session_hash),
        AuthContext::Unauthenticated => return AuthError::SessionInvalid.into_response(),
    };

    match verify_code_for_session(
        &pool,
        &auth_state,
        session.user_id,
        &session_hash,
        &request.email_code,
    )
    .await
    {
        Ok(()) => {}
        Err(err) => return err.into_response(),
    }

    let now = auth_state.clock().now();
    match reset_two_fa(&pool, session.user_id, now).await {
        Ok(()) => (StatusCode::OK, Json(VerifyCodeResponse { success: true })).into_response(),
        Err(err) => AuthError::storage("failed to disable two-factor", &err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_auth_state;
    use super::super::types::{
        SendCodeRequest, SetTwoFaEmailRequest, TwoFaSetupRequest, VerifyCodeRequest,
    };
    use super::{send_code, set_email, setup, verify};
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::Json;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn setup_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = setup(Extension(pool), Extension(state), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn set_email_rejects_invalid_address() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = set_email(
            Extension(pool),
            Extension(state),
            Some(Json(SetTwoFaEmailRequest {
                session_token: "token".to_string(),
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn send_code_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = send_code(Extension(pool), Extension(state), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = verify(Extension(pool), Extension(state), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn setup_empty_token_is_unauthorized() -> Result<()> {
        // An empty token resolves to NotFound before any database work.
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = setup(
            Extension(pool),
            Extension(state),
            Some(Json(TwoFaSetupRequest {
                session_token: "  ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn send_code_empty_token_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = send_code(
            Extension(pool),
            Extension(state),
            Some(Json(SendCodeRequest {
                session_token: String::new(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn verify_empty_token_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = verify(
            Extension(pool),
            Extension(state),
            Some(Json(VerifyCodeRequest {
                session_token: String::new(),
                email_code: "000000".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
