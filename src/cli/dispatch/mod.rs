//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, email};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        code_ttl_seconds: auth_opts.code_ttl_seconds,
        verify_lockout_threshold: auth_opts.verify_lockout_threshold,
        send_lockout_threshold: auth_opts.send_lockout_threshold,
        attempt_window_seconds: auth_opts.attempt_window_seconds,
        lockout_seconds: auth_opts.lockout_seconds,
        admin_user_id: auth_opts.admin_user_id,
        admin_two_fa_email: auth_opts.admin_two_fa_email,
        email_endpoint: email_opts.endpoint,
        email_api_key: email_opts.api_key,
        email_timeout_seconds: email_opts.timeout_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        temp_env::with_vars([("CLINIGATE_ADMIN_USER_ID", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec![
                "clinigate",
                "--port",
                "9090",
                "--dsn",
                "postgres://user@localhost:5432/clinigate",
            ]);
            let Action::Server(args) = handler(&matches)?;
            assert_eq!(args.port, 9090);
            assert_eq!(args.dsn, "postgres://user@localhost:5432/clinigate");
            assert_eq!(args.session_ttl_seconds, 3600);
            assert!(args.email_endpoint.is_none());
            Ok(())
        })
    }
}
