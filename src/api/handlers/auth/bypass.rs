//! Exemption of the designated administrator from lockout enforcement.
//!
//! The exempt identity is fixed at startup from configuration; it is never
//! user-settable and never derived from request data. Exemption skips the
//! lockout gates entirely, so no counter accumulates for the identity, and
//! it never weakens code expiry or value comparison.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::lockout::{send_key, verify_key, LockoutManager};
use super::storage::session_hashes_for_user;

pub struct BypassPolicy {
    admin_user_id: Option<Uuid>,
}

impl BypassPolicy {
    #[must_use]
    pub fn new(admin_user_id: Option<Uuid>) -> Self {
        Self { admin_user_id }
    }

    /// Policy that exempts nobody (no administrator configured).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            admin_user_id: None,
        }
    }

    /// True only for the single designated administrator identity.
    #[must_use]
    pub fn is_exempt(&self, user_id: Uuid) -> bool {
        self.admin_user_id == Some(user_id)
    }

    /// Invoked on every successful PIN match for the exempt identity.
    ///
    /// Clears the send-code key and every per-session verify key belonging
    /// to the identity, whether or not a lockout is currently active.
    pub(super) async fn on_admin_login(
        &self,
        pool: &PgPool,
        lockouts: &LockoutManager,
        user_id: Uuid,
    ) -> Result<()> {
        if !self.is_exempt(user_id) {
            return Ok(());
        }

        let mut keys = vec![send_key(user_id)];
        for session_hash in session_hashes_for_user(pool, user_id).await? {
            keys.push(verify_key(&session_hash));
        }

        lockouts.clear_keys(&keys).await?;
        info!(%user_id, "administrator login cleared lockout state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::BypassPolicy;
    use uuid::Uuid;

    #[test]
    fn exempts_only_the_configured_identity() {
        let admin = Uuid::new_v4();
        let other = Uuid::new_v4();
        let policy = BypassPolicy::new(Some(admin));
        assert!(policy.is_exempt(admin));
        assert!(!policy.is_exempt(other));
    }

    #[test]
    fn disabled_policy_exempts_nobody() {
        let policy = BypassPolicy::disabled();
        assert!(!policy.is_exempt(Uuid::new_v4()));
        assert!(!policy.is_exempt(Uuid::nil()));
    }
}
