//! # Clinigate (PIN Login & Email 2FA)
//!
//! `clinigate` is the authentication authority for the clinic-registration
//! portal. Staff log in with a short numeric PIN; sensitive operations
//! additionally require a one-time code emailed to the staff member.
//!
//! ## Login flow
//!
//! - A PIN match issues an opaque session token (only its digest is
//!   stored). First-time users are routed through email setup before 2FA
//!   is enforced; returning users must verify an emailed code to promote
//!   the session.
//! - One-time codes are fixed-width numeric, valid for ten minutes, and
//!   single-use. Re-sending supersedes the previous code.
//!
//! ## Lockout & bypass
//!
//! Failed verify attempts (per session) and send-code requests (per user)
//! count inside a rolling window; crossing a threshold locks the key for a
//! fixed duration. The single designated administrator identity, fixed at
//! startup, is exempt from both gates, and each successful administrator
//! PIN login clears any lockout state left on that identity.
//!
//! ## Time discipline
//!
//! All expiry and window math flows through one `TimeSource` producing
//! `DateTime<Utc>`, so stored timestamps and "now" are always compared
//! with matching timezone awareness.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
