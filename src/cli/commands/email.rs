use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-endpoint")
                .long("email-endpoint")
                .help("HTTP email provider endpoint; codes are logged when unset")
                .env("CLINIGATE_EMAIL_ENDPOINT"),
        )
        .arg(
            Arg::new("email-api-key")
                .long("email-api-key")
                .help("Bearer token for the email provider")
                .env("CLINIGATE_EMAIL_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("email-timeout-seconds")
                .long("email-timeout-seconds")
                .help("Upper bound on a single email send")
                .env("CLINIGATE_EMAIL_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

pub struct Options {
    pub endpoint: Option<Url>,
    pub api_key: Option<SecretString>,
    pub timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let endpoint = matches
            .get_one::<String>("email-endpoint")
            .map(|value| Url::parse(value.trim()))
            .transpose()
            .context("invalid --email-endpoint, expected a URL")?;

        Ok(Self {
            endpoint,
            api_key: matches
                .get_one::<String>("email-api-key")
                .cloned()
                .map(SecretString::from),
            timeout_seconds: matches
                .get_one::<u64>("email-timeout-seconds")
                .copied()
                .unwrap_or(10),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Options;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn options_parse_endpoint_and_key() -> anyhow::Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "clinigate",
            "--dsn",
            "postgres://localhost:5432/clinigate",
            "--email-endpoint",
            "https://mail.clinic.org/v1/send",
            "--email-api-key",
            "sekrit",
            "--email-timeout-seconds",
            "3",
        ]);
        let options = Options::parse(&matches)?;
        assert_eq!(
            options.endpoint.map(|url| url.to_string()),
            Some("https://mail.clinic.org/v1/send".to_string())
        );
        assert_eq!(
            options.api_key.map(|key| key.expose_secret().to_string()),
            Some("sekrit".to_string())
        );
        assert_eq!(options.timeout_seconds, 3);
        Ok(())
    }

    #[test]
    fn options_parse_rejects_bad_endpoint() {
        let matches = commands::new().get_matches_from(vec![
            "clinigate",
            "--dsn",
            "postgres://localhost:5432/clinigate",
            "--email-endpoint",
            "not a url",
        ]);
        assert!(Options::parse(&matches).is_err());
    }
}
