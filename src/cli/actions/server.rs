use crate::api::{
    self,
    handlers::auth::{AuthConfig, LockoutPolicy},
    EmailSender, HttpEmailSender, LogEmailSender,
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;
use url::Url;
use uuid::Uuid;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub code_ttl_seconds: i64,
    pub verify_lockout_threshold: i64,
    pub send_lockout_threshold: i64,
    pub attempt_window_seconds: i64,
    pub lockout_seconds: i64,
    pub admin_user_id: Option<Uuid>,
    pub admin_two_fa_email: Option<String>,
    pub email_endpoint: Option<Url>,
    pub email_api_key: Option<SecretString>,
    pub email_timeout_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the email sender cannot be built or the server
/// fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_code_ttl_seconds(args.code_ttl_seconds)
        .with_admin_user_id(args.admin_user_id)
        .with_admin_two_fa_email(args.admin_two_fa_email)
        .with_email_timeout_seconds(args.email_timeout_seconds);

    let verify_policy = LockoutPolicy::new(
        args.verify_lockout_threshold,
        args.attempt_window_seconds,
        args.lockout_seconds,
    );
    let send_policy = LockoutPolicy::new(
        args.send_lockout_threshold,
        args.attempt_window_seconds,
        args.lockout_seconds,
    );

    let email_sender: Arc<dyn EmailSender> = match args.email_endpoint {
        Some(endpoint) => Arc::new(HttpEmailSender::new(endpoint, args.email_api_key)?),
        None => {
            info!("no email endpoint configured; codes will be logged");
            Arc::new(LogEmailSender)
        }
    };

    api::new(
        args.port,
        args.dsn,
        auth_config,
        verify_policy,
        send_policy,
        email_sender,
    )
    .await
}
