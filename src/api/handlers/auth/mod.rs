//! PIN login and email 2FA handlers and supporting modules.
//!
//! This module coordinates PIN verification, session issuance, one-time
//! email codes, and failed-attempt lockouts.
//!
//! ## Lockout rules
//!
//! - Verify failures count per session, send-code requests per user, each
//!   with its own threshold inside a rolling window.
//! - Reaching a threshold locks the key for the configured duration; a
//!   locked key is rejected without further counting.
//! - The single designated administrator identity (fixed at startup) skips
//!   both gates, and every successful admin PIN login clears any lockout
//!   state left on that identity.
//!
//! ## Time
//!
//! All expiry and window math flows through one [`clock::TimeSource`];
//! stored timestamps and "now" are both `DateTime<Utc>` before any
//! comparison.

mod bypass;
pub(crate) mod clock;
mod error;
mod lockout;
pub(crate) mod pin_login;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod two_fa;
pub(crate) mod types;
mod utils;

pub use bypass::BypassPolicy;
pub use clock::{normalize_naive, SystemClock, TimeSource};
pub use error::AuthError;
pub use lockout::{LockoutManager, LockoutPolicy};
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
mod tests;
