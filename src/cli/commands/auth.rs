use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use uuid::Uuid;

pub const ARG_ADMIN_USER_ID: &str = "admin-user-id";
pub const ARG_ADMIN_TWO_FA_EMAIL: &str = "admin-2fa-email";

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_lockout_args(command);
    with_admin_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used as the allowed CORS origin")
                .env("CLINIGATE_FRONTEND_BASE_URL")
                .default_value("https://portal.clinic.org"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session token TTL in seconds")
                .env("CLINIGATE_SESSION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("code-ttl-seconds")
                .long("code-ttl-seconds")
                .help("One-time email code TTL in seconds")
                .env("CLINIGATE_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("verify-lockout-threshold")
                .long("verify-lockout-threshold")
                .help("Failed verify attempts per session before lockout")
                .env("CLINIGATE_VERIFY_LOCKOUT_THRESHOLD")
                .default_value("5")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("send-lockout-threshold")
                .long("send-lockout-threshold")
                .help("Send-code requests per user before lockout")
                .env("CLINIGATE_SEND_LOCKOUT_THRESHOLD")
                .default_value("3")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("attempt-window-seconds")
                .long("attempt-window-seconds")
                .help("Rolling window for counting failed attempts")
                .env("CLINIGATE_ATTEMPT_WINDOW_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("lockout-seconds")
                .long("lockout-seconds")
                .help("Lockout duration once a threshold is reached")
                .env("CLINIGATE_LOCKOUT_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_admin_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_USER_ID)
                .long(ARG_ADMIN_USER_ID)
                .help("User id of the designated administrator identity")
                .env("CLINIGATE_ADMIN_USER_ID"),
        )
        .arg(
            Arg::new(ARG_ADMIN_TWO_FA_EMAIL)
                .long(ARG_ADMIN_TWO_FA_EMAIL)
                .help("Destination email for the administrator's 2FA codes")
                .env("CLINIGATE_ADMIN_2FA_EMAIL"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub code_ttl_seconds: i64,
    pub verify_lockout_threshold: i64,
    pub send_lockout_threshold: i64,
    pub attempt_window_seconds: i64,
    pub lockout_seconds: i64,
    pub admin_user_id: Option<Uuid>,
    pub admin_two_fa_email: Option<String>,
}

impl Options {
    /// # Errors
    /// Returns an error if required arguments are missing or malformed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let admin_user_id = matches
            .get_one::<String>(ARG_ADMIN_USER_ID)
            .map(|value| Uuid::parse_str(value.trim()))
            .transpose()
            .context("invalid --admin-user-id, expected a UUID")?;

        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .unwrap_or(3600),
            code_ttl_seconds: matches
                .get_one::<i64>("code-ttl-seconds")
                .copied()
                .unwrap_or(600),
            verify_lockout_threshold: matches
                .get_one::<i64>("verify-lockout-threshold")
                .copied()
                .unwrap_or(5),
            send_lockout_threshold: matches
                .get_one::<i64>("send-lockout-threshold")
                .copied()
                .unwrap_or(3),
            attempt_window_seconds: matches
                .get_one::<i64>("attempt-window-seconds")
                .copied()
                .unwrap_or(600),
            lockout_seconds: matches
                .get_one::<i64>("lockout-seconds")
                .copied()
                .unwrap_or(900),
            admin_user_id,
            admin_two_fa_email: matches.get_one::<String>(ARG_ADMIN_TWO_FA_EMAIL).cloned(),
        })
    }
}
