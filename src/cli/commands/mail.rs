use crate::email::{DEFAULT_MAIL_FROM, DEFAULT_SMTP_PORT};
use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_INSECURE: &str = "smtp-insecure";
pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_MAIL_TIMEOUT_SECONDS: &str = "mail-timeout-seconds";

#[derive(Debug)]
pub struct Options {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<SecretString>,
    pub smtp_starttls: bool,
    pub mail_from: String,
    pub mail_timeout_seconds: u64,
}

impl Options {
    /// Parse outgoing mail arguments from matches.
    ///
    /// # Errors
    /// Returns an error if only one half of the SMTP credentials is given.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_optional = |id: &str| -> Option<String> {
            matches
                .get_one::<String>(id)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let smtp_username = read_optional(ARG_SMTP_USERNAME);
        let smtp_password = read_optional(ARG_SMTP_PASSWORD).map(SecretString::from);
        if smtp_username.is_some() != smtp_password.is_some() {
            return Err(anyhow!(
                "--{ARG_SMTP_USERNAME} and --{ARG_SMTP_PASSWORD} must be given together"
            ));
        }

        Ok(Self {
            smtp_host: read_optional(ARG_SMTP_HOST),
            smtp_port: matches
                .get_one::<u16>(ARG_SMTP_PORT)
                .copied()
                .unwrap_or(DEFAULT_SMTP_PORT),
            smtp_username,
            smtp_password,
            smtp_starttls: !matches.get_flag(ARG_SMTP_INSECURE),
            mail_from: read_optional(ARG_MAIL_FROM)
                .unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            mail_timeout_seconds: matches
                .get_one::<u64>(ARG_MAIL_TIMEOUT_SECONDS)
                .copied()
                .ok_or_else(|| anyhow!("missing required argument: --{ARG_MAIL_TIMEOUT_SECONDS}"))?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; without it e-mails are only logged")
                .env("HOAXIFY_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .env("HOAXIFY_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("HOAXIFY_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("HOAXIFY_SMTP_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SMTP_INSECURE)
                .long(ARG_SMTP_INSECURE)
                .help("Talk plain SMTP without STARTTLS (local mail catchers)")
                .env("HOAXIFY_SMTP_INSECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address of outgoing e-mails")
                .env("HOAXIFY_MAIL_FROM")
                .default_value(DEFAULT_MAIL_FROM),
        )
        .arg(
            Arg::new(ARG_MAIL_TIMEOUT_SECONDS)
                .long(ARG_MAIL_TIMEOUT_SECONDS)
                .help("Give up on a single e-mail delivery after this many seconds")
                .env("HOAXIFY_MAIL_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
