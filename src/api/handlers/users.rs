//! User-facing collaborator endpoints consumed by the first-time-setup flow.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::storage::mark_email_verified;
use super::auth::types::MarkEmailVerifiedResponse;
use super::auth::{AuthError, AuthState};

#[utoipa::path(
    post,
    path = "/v1/users/{user_id}/mark-email-verified",
    params(
        ("user_id" = Uuid, Path, description = "User whose email was confirmed")
    ),
    responses(
        (status = 200, description = "Email verified, 2FA enabled for subsequent logins", body = MarkEmailVerifiedResponse),
        (status = 404, description = "Unknown user", body = String),
        (status = 503, description = "Store unavailable", body = String)
    ),
    tag = "users"
)]
pub async fn mark_verified(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let now = auth_state.clock().now();
    match mark_email_verified(&pool, user_id, now).await {
        Ok(true) => (
            StatusCode::OK,
            Json(MarkEmailVerifiedResponse {
                message: "Email verified; two-factor authentication enabled".to_string(),
                user_id: user_id.to_string(),
            }),
        )
            .into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "Unknown user".to_string()).into_response(),
        Err(err) => AuthError::storage("failed to mark email verified", &err).into_response(),
    }
}
