//! PIN verification endpoint.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::error::AuthError;
use super::state::AuthState;
use super::storage::{insert_session, lookup_credential, CredentialRecord};
use super::types::{PinVerifyRequest, PinVerifyResponse};
use super::utils::hash_pin;

#[utoipa::path(
    post,
    path = "/v1/auth/pin-verify",
    request_body = PinVerifyRequest,
    responses(
        (status = 200, description = "PIN accepted, session issued", body = PinVerifyResponse),
        (status = 400, description = "Missing or empty PIN", body = String),
        (status = 401, description = "Invalid credential", body = String),
        (status = 503, description = "Credential store unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn pin_verify(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PinVerifyRequest>>,
) -> impl IntoResponse {
    let request: PinVerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let pin = request.pin.trim();
    if pin.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing pin".to_string()).into_response();
    }

    // No format validation here: an unmatched PIN is indistinguishable from
    // a malformed one.
    let pin_hash = hash_pin(pin);
    let credential = match lookup_credential(&pool, &pin_hash).await {
        Ok(Some(credential)) => credential,
        Ok(None) => return AuthError::InvalidCredential.into_response(),
        Err(err) => return AuthError::storage("credential lookup failed", &err).into_response(),
    };

    match build_login_response(&pool, &auth_state, credential).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn build_login_response(
    pool: &PgPool,
    auth_state: &AuthState,
    credential: CredentialRecord,
) -> Result<PinVerifyResponse, AuthError> {
    let is_admin = credential.is_admin;
    // First successful login: surface the on-file email for setup, do not
    // send a code, and leave the session usable without a second factor.
    let needs_email_verification = !is_admin && !credential.two_fa_enabled;
    let two_fa_required = is_admin || credential.two_fa_enabled;

    let now = auth_state.clock().now();
    let session_token = insert_session(
        pool,
        credential.user_id,
        two_fa_required,
        now,
        auth_state.config().session_ttl_seconds(),
    )
    .await
    .map_err(|err| AuthError::storage("failed to create session", &err))?;

    if is_admin {
        // Unconditional on every successful admin PIN match, even when no
        // lockout is currently active.
        if let Err(err) = auth_state
            .bypass()
            .on_admin_login(pool, auth_state.lockouts(), credential.user_id)
            .await
        {
            error!("failed to clear administrator lockout state: {err}");
            return Err(AuthError::StoreUnavailable);
        }
    }

    let two_fa_email = if is_admin {
        auth_state
            .config()
            .admin_two_fa_email()
            .map(str::to_string)
            .or_else(|| Some(credential.email.clone()))
    } else {
        None
    };

    Ok(PinVerifyResponse {
        pin_valid: true,
        user_type: if is_admin { "admin" } else { "user" }.to_string(),
        user_id: credential.user_id.to_string(),
        session_token,
        two_fa_enabled: credential.two_fa_enabled,
        two_fa_required,
        needs_email_verification,
        email: credential.email,
        two_fa_email,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_auth_state;
    use super::pin_verify;
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::Json;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn pin_verify_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = pin_verify(Extension(pool), Extension(state), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn pin_verify_empty_pin() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = test_auth_state(pool.clone());
        let response = pin_verify(
            Extension(pool),
            Extension(state),
            Some(Json(super::PinVerifyRequest {
                pin: "  ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
