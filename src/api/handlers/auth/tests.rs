//! Auth module tests and shared test fixtures.

use sqlx::PgPool;
use std::sync::Arc;

use super::clock::{normalize_naive, FixedClock, SystemClock, TimeSource};
use super::storage::CodeRecord;
use super::two_fa::evaluate_code;
use super::{AuthConfig, AuthError, AuthState, LockoutManager};
use crate::api::email::LogEmailSender;
use chrono::{Duration, Utc};
use uuid::Uuid;

/// State wired the way handler tests need it: system clock, log sender,
/// default lockout policies.
pub(crate) fn test_auth_state(pool: PgPool) -> Arc<AuthState> {
    let clock: Arc<dyn TimeSource> = Arc::new(SystemClock);
    let config = AuthConfig::new("https://portal.clinic.org".to_string());
    let lockouts = LockoutManager::new(pool, clock.clone());
    Arc::new(AuthState::new(
        config,
        lockouts,
        clock,
        Arc::new(LogEmailSender),
    ))
}

fn code_record(code: &str, expires_in: Duration, now: chrono::DateTime<Utc>) -> CodeRecord {
    CodeRecord {
        id: Uuid::new_v4(),
        code: code.to_string(),
        expires_at: now + expires_in,
    }
}

#[test]
fn expired_code_wins_over_correct_value() {
    let clock = FixedClock::new(Utc::now());
    let now = clock.now();
    let record = code_record("123456", Duration::minutes(10), now);

    clock.advance(Duration::minutes(10));
    let later = clock.now();

    // Correct value, but expiry is checked first.
    assert!(matches!(
        evaluate_code(&record, "123456", later),
        Err(AuthError::CodeExpired)
    ));
    // Wrong value reports the same thing once expired.
    assert!(matches!(
        evaluate_code(&record, "000000", later),
        Err(AuthError::CodeExpired)
    ));
}

#[test]
fn live_code_compares_by_value() {
    let now = Utc::now();
    let record = code_record("123456", Duration::minutes(10), now);

    assert!(evaluate_code(&record, "123456", now).is_ok());
    assert!(evaluate_code(&record, " 123456 ", now).is_ok());
    assert!(matches!(
        evaluate_code(&record, "654321", now),
        Err(AuthError::InvalidCode)
    ));
}

#[test]
fn expiry_boundary_is_inclusive() {
    let now = Utc::now();
    let record = code_record("123456", Duration::minutes(10), now);

    // At exactly expires_at the code is already expired.
    assert!(matches!(
        evaluate_code(&record, "123456", record.expires_at),
        Err(AuthError::CodeExpired)
    ));
    assert!(evaluate_code(&record, "123456", record.expires_at - Duration::seconds(1)).is_ok());
}

#[test]
fn naive_timestamps_normalize_before_comparison() {
    // Deliberately naive input: normalized values compare cleanly against
    // clock output instead of raising a naive/aware mismatch.
    let now = Utc::now();
    let record = code_record("123456", Duration::minutes(10), now);

    let naive_future = (now + Duration::minutes(11)).naive_utc();
    let normalized = normalize_naive(naive_future);
    assert!(matches!(
        evaluate_code(&record, "123456", normalized),
        Err(AuthError::CodeExpired)
    ));

    let naive_past = (now + Duration::minutes(1)).naive_utc();
    assert!(evaluate_code(&record, "123456", normalize_naive(naive_past)).is_ok());
}

#[tokio::test]
async fn auth_state_wires_bypass_from_config() -> anyhow::Result<()> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://postgres@localhost/postgres")?;
    let admin = Uuid::new_v4();
    let clock: Arc<dyn TimeSource> = Arc::new(SystemClock);
    let config =
        AuthConfig::new("https://portal.clinic.org".to_string()).with_admin_user_id(Some(admin));
    let lockouts = LockoutManager::new(pool, clock.clone());
    let state = AuthState::new(config, lockouts, clock, Arc::new(LogEmailSender));

    assert!(state.bypass().is_exempt(admin));
    assert!(!state.bypass().is_exempt(Uuid::new_v4()));
    Ok(())
}
