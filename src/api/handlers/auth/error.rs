//! Typed error taxonomy shared by the PIN login and 2FA endpoints.
//!
//! Every failure is terminal to the request and mapped to exactly one
//! status code, so clients can tell a lockout from a wrong code and an
//! expired code from an invalid one. `StoreUnavailable` is the only
//! variant for which retrying the identical request is meaningful.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// PIN did not match any credential. Never distinguishes "unknown PIN"
    /// from "malformed PIN".
    #[error("Invalid credential")]
    InvalidCredential,
    /// Session token is missing, unknown, or expired.
    #[error("Session invalid")]
    SessionInvalid,
    /// Verify was called with no live code for the session.
    #[error("No code issued")]
    NoCodeIssued,
    /// The live code exists but its expiry window has passed.
    #[error("Code expired")]
    CodeExpired,
    /// The submitted code does not match the live code.
    #[error("Invalid code")]
    InvalidCode,
    /// Too many failed attempts; wait out the lockout.
    #[error("Rate limited: retry in {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
    /// The email transport reported a hard failure or timed out.
    #[error("Email delivery failed")]
    EmailDeliveryFailed,
    /// The credential store could not be reached; retryable.
    #[error("Credential store unavailable")]
    StoreUnavailable,
    /// Write conflicted with existing state (duplicate PIN, already
    /// verified email).
    #[error("Conflict")]
    Conflict,
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredential | Self::SessionInvalid | Self::InvalidCode => {
                StatusCode::UNAUTHORIZED
            }
            Self::NoCodeIssued | Self::CodeExpired => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::EmailDeliveryFailed => StatusCode::BAD_GATEWAY,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Conflict => StatusCode::CONFLICT,
        }
    }

    /// Map a storage failure to `StoreUnavailable`, logging the cause.
    ///
    /// Storage errors must never be folded into "no match".
    pub(crate) fn storage(context: &str, err: &anyhow::Error) -> Self {
        error!("{context}: {err}");
        Self::StoreUnavailable
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(
            AuthError::InvalidCredential.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::SessionInvalid.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InvalidCode.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::NoCodeIssued.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::CodeExpired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::RateLimited {
                retry_after_seconds: 60
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::EmailDeliveryFailed.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AuthError::StoreUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AuthError::Conflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn rate_limited_message_names_retry_window() {
        let err = AuthError::RateLimited {
            retry_after_seconds: 120,
        };
        assert_eq!(err.to_string(), "Rate limited: retry in 120s");
    }

    #[test]
    fn response_body_comes_from_display() {
        let response = AuthError::CodeExpired.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
