use crate::api::DEFAULT_FRONTEND_BASE_URL;
use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_STALE_WINDOW_SECONDS: &str = "session-stale-window-seconds";
pub const ARG_TOKEN_REAP_INTERVAL_SECONDS: &str = "token-reap-interval-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_stale_window_seconds: u64,
    pub token_reap_interval_seconds: u64,
}

impl Options {
    /// Parse session and link arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the frontend URL is not an absolute http(s) URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_FRONTEND_BASE_URL}"))?;

        let parsed = Url::parse(&frontend_base_url)
            .with_context(|| format!("invalid --{ARG_FRONTEND_BASE_URL}: {frontend_base_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "--{ARG_FRONTEND_BASE_URL} must use http or https: {frontend_base_url}"
            ));
        }

        let read_seconds = |id: &str| -> Result<u64> {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            frontend_base_url,
            session_stale_window_seconds: read_seconds(ARG_SESSION_STALE_WINDOW_SECONDS)?,
            token_reap_interval_seconds: read_seconds(ARG_TOKEN_REAP_INTERVAL_SECONDS)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for e-mail links and CORS")
                .env("HOAXIFY_FRONTEND_BASE_URL")
                .default_value(DEFAULT_FRONTEND_BASE_URL),
        )
        .arg(
            Arg::new(ARG_SESSION_STALE_WINDOW_SECONDS)
                .long(ARG_SESSION_STALE_WINDOW_SECONDS)
                .help("Idle time after which a session token stops being accepted")
                .env("HOAXIFY_SESSION_STALE_WINDOW_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TOKEN_REAP_INTERVAL_SECONDS)
                .long(ARG_TOKEN_REAP_INTERVAL_SECONDS)
                .help("How often stale session tokens are deleted")
                .env("HOAXIFY_TOKEN_REAP_INTERVAL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("HOAXIFY_FRONTEND_BASE_URL", None::<&str>),
                ("HOAXIFY_SESSION_STALE_WINDOW_SECONDS", None::<&str>),
                ("HOAXIFY_TOKEN_REAP_INTERVAL_SECONDS", None::<&str>),
            ],
            f,
        );
    }

    #[test]
    fn defaults() {
        clear_env(|| {
            let matches = with_args(Command::new("hoaxify")).get_matches_from(vec!["hoaxify"]);
            let options = Options::parse(&matches);
            assert!(options.is_ok());
            if let Ok(options) = options {
                assert_eq!(options.frontend_base_url, DEFAULT_FRONTEND_BASE_URL);
                assert_eq!(options.session_stale_window_seconds, 604_800);
                assert_eq!(options.token_reap_interval_seconds, 3600);
            }
        });
    }

    #[test]
    fn zero_stale_window_is_rejected() {
        clear_env(|| {
            let result = with_args(Command::new("hoaxify")).try_get_matches_from(vec![
                "hoaxify",
                "--session-stale-window-seconds",
                "0",
            ]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn frontend_url_must_be_http() {
        clear_env(|| {
            let matches = with_args(Command::new("hoaxify")).get_matches_from(vec![
                "hoaxify",
                "--frontend-base-url",
                "ftp://hoaxify.com",
            ]);
            assert!(Options::parse(&matches).is_err());

            let matches = with_args(Command::new("hoaxify")).get_matches_from(vec![
                "hoaxify",
                "--frontend-base-url",
                "not a url",
            ]);
            assert!(Options::parse(&matches).is_err());
        });
    }
}
