//! Auth configuration and shared per-process state.

use std::sync::Arc;
use uuid::Uuid;

use super::bypass::BypassPolicy;
use super::clock::TimeSource;
use super::lockout::LockoutManager;
use crate::api::email::EmailSender;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_CODE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_EMAIL_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    code_ttl_seconds: i64,
    admin_user_id: Option<Uuid>,
    admin_two_fa_email: Option<String>,
    email_timeout_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            admin_user_id: None,
            admin_two_fa_email: None,
            email_timeout_seconds: DEFAULT_EMAIL_TIMEOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_admin_user_id(mut self, admin_user_id: Option<Uuid>) -> Self {
        self.admin_user_id = admin_user_id;
        self
    }

    #[must_use]
    pub fn with_admin_two_fa_email(mut self, email: Option<String>) -> Self {
        self.admin_two_fa_email = email;
        self
    }

    #[must_use]
    pub fn with_email_timeout_seconds(mut self, seconds: u64) -> Self {
        self.email_timeout_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn code_ttl_seconds(&self) -> i64 {
        self.code_ttl_seconds
    }

    #[must_use]
    pub fn admin_user_id(&self) -> Option<Uuid> {
        self.admin_user_id
    }

    pub(super) fn admin_two_fa_email(&self) -> Option<&str> {
        self.admin_two_fa_email.as_deref()
    }

    pub(super) fn email_timeout_seconds(&self) -> u64 {
        self.email_timeout_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    lockouts: LockoutManager,
    bypass: BypassPolicy,
    clock: Arc<dyn TimeSource>,
    email_sender: Arc<dyn EmailSender>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        lockouts: LockoutManager,
        clock: Arc<dyn TimeSource>,
        email_sender: Arc<dyn EmailSender>,
    ) -> Self {
        let bypass = BypassPolicy::new(config.admin_user_id());
        Self {
            config,
            lockouts,
            bypass,
            clock,
            email_sender,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn lockouts(&self) -> &LockoutManager {
        &self.lockouts
    }

    pub(super) fn bypass(&self) -> &BypassPolicy {
        &self.bypass
    }

    pub(crate) fn clock(&self) -> &dyn TimeSource {
        self.clock.as_ref()
    }

    pub(super) fn email_sender(&self) -> &dyn EmailSender {
        self.email_sender.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, DEFAULT_CODE_TTL_SECONDS, DEFAULT_SESSION_TTL_SECONDS};
    use uuid::Uuid;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://portal.clinic.org".to_string());

        assert_eq!(config.frontend_base_url(), "https://portal.clinic.org");
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(config.code_ttl_seconds(), DEFAULT_CODE_TTL_SECONDS);
        assert_eq!(config.admin_user_id(), None);
        assert_eq!(config.admin_two_fa_email(), None);

        let admin = Uuid::new_v4();
        let config = config
            .with_session_ttl_seconds(1800)
            .with_code_ttl_seconds(300)
            .with_admin_user_id(Some(admin))
            .with_admin_two_fa_email(Some("sec@clinic.org".to_string()))
            .with_email_timeout_seconds(5);

        assert_eq!(config.session_ttl_seconds(), 1800);
        assert_eq!(config.code_ttl_seconds(), 300);
        assert_eq!(config.admin_user_id(), Some(admin));
        assert_eq!(config.admin_two_fa_email(), Some("sec@clinic.org"));
        assert_eq!(config.email_timeout_seconds(), 5);
    }

    #[test]
    fn code_ttl_defaults_to_ten_minutes() {
        assert_eq!(DEFAULT_CODE_TTL_SECONDS, 600);
    }
}
