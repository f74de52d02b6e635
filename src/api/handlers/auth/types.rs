//! Request/response types for the PIN login and 2FA endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PinVerifyRequest {
    pub pin: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PinVerifyResponse {
    pub pin_valid: bool,
    /// `"admin"` for the designated administrator, `"user"` otherwise.
    pub user_type: String,
    pub user_id: String,
    pub session_token: String,
    pub two_fa_enabled: bool,
    pub two_fa_required: bool,
    /// True on the first successful login, before the email is verified.
    pub needs_email_verification: bool,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_fa_email: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFaSetupRequest {
    pub session_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFaSetupResponse {
    pub setup_required: bool,
    pub email_address: String,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetTwoFaEmailRequest {
    pub session_token: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendCodeRequest {
    pub session_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendCodeResponse {
    pub message: String,
    /// Destination the code was sent to.
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyCodeRequest {
    pub session_token: String,
    pub email_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyCodeResponse {
    pub success: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DisableTwoFaRequest {
    pub email_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MarkEmailVerifiedResponse {
    pub message: String,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn pin_verify_response_round_trips() -> Result<()> {
        let response = PinVerifyResponse {
            pin_valid: true,
            user_type: "admin".to_string(),
            user_id: "3e7c".to_string(),
            session_token: "tok".to_string(),
            two_fa_enabled: true,
            two_fa_required: true,
            needs_email_verification: false,
            email: "admin@clinic.org".to_string(),
            two_fa_email: Some("sec@clinic.org".to_string()),
        };
        let value = serde_json::to_value(&response)?;
        let user_type = value
            .get("user_type")
            .and_then(serde_json::Value::as_str)
            .context("missing user_type")?;
        assert_eq!(user_type, "admin");
        let decoded: PinVerifyResponse = serde_json::from_value(value)?;
        assert!(decoded.two_fa_required);
        Ok(())
    }

    #[test]
    fn two_fa_email_omitted_when_absent() -> Result<()> {
        let response = PinVerifyResponse {
            pin_valid: true,
            user_type: "user".to_string(),
            user_id: "id".to_string(),
            session_token: "tok".to_string(),
            two_fa_enabled: false,
            two_fa_required: false,
            needs_email_verification: true,
            email: "nurse@clinic.org".to_string(),
            two_fa_email: None,
        };
        let value = serde_json::to_value(&response)?;
        assert!(value.get("two_fa_email").is_none());
        Ok(())
    }

    #[test]
    fn verify_code_request_round_trips() -> Result<()> {
        let request = VerifyCodeRequest {
            session_token: "tok".to_string(),
            email_code: "042042".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: VerifyCodeRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.email_code, "042042");
        Ok(())
    }
}
