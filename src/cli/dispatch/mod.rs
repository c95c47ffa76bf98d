//! Maps validated CLI matches to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, mail, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        session_stale_window_seconds: auth_opts.session_stale_window_seconds,
        token_reap_interval_seconds: auth_opts.token_reap_interval_seconds,
        smtp_host: mail_opts.smtp_host,
        smtp_port: mail_opts.smtp_port,
        smtp_username: mail_opts.smtp_username,
        smtp_password: mail_opts.smtp_password,
        smtp_starttls: mail_opts.smtp_starttls,
        mail_from: mail_opts.mail_from,
        mail_timeout_seconds: mail_opts.mail_timeout_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 12] = [
        "HOAXIFY_PORT",
        "HOAXIFY_DSN",
        "HOAXIFY_FRONTEND_BASE_URL",
        "HOAXIFY_SESSION_STALE_WINDOW_SECONDS",
        "HOAXIFY_TOKEN_REAP_INTERVAL_SECONDS",
        "HOAXIFY_SMTP_HOST",
        "HOAXIFY_SMTP_PORT",
        "HOAXIFY_SMTP_USERNAME",
        "HOAXIFY_SMTP_PASSWORD",
        "HOAXIFY_SMTP_INSECURE",
        "HOAXIFY_MAIL_FROM",
        "HOAXIFY_MAIL_TIMEOUT_SECONDS",
    ];

    fn with_env<F: FnOnce()>(set: &[(&'static str, &'static str)], f: F) {
        let mut vars: Vec<(&str, Option<&str>)> = VARS.iter().map(|name| (*name, None)).collect();
        for (name, value) in set {
            vars.retain(|(existing, _)| existing != name);
            vars.push((*name, Some(*value)));
        }
        temp_env::with_vars(vars, f);
    }

    #[test]
    fn server_action_from_env() {
        with_env(
            &[
                ("HOAXIFY_DSN", "postgres://hoaxify@localhost:5432/hoaxify"),
                ("HOAXIFY_PORT", "9000"),
                ("HOAXIFY_FRONTEND_BASE_URL", "https://hoaxify.com"),
                ("HOAXIFY_SESSION_STALE_WINDOW_SECONDS", "60"),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["hoaxify"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 9000);
                    assert_eq!(args.dsn, "postgres://hoaxify@localhost:5432/hoaxify");
                    assert_eq!(args.frontend_base_url, "https://hoaxify.com");
                    assert_eq!(args.session_stale_window_seconds, 60);
                    assert_eq!(args.token_reap_interval_seconds, 3600);
                    assert!(args.smtp_host.is_none());
                }
            },
        );
    }

    #[test]
    fn half_smtp_credentials_are_rejected() {
        with_env(
            &[
                ("HOAXIFY_DSN", "memory://"),
                ("HOAXIFY_SMTP_HOST", "localhost"),
                ("HOAXIFY_SMTP_PASSWORD", "s3cret"),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["hoaxify"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("must be given together"));
                }
            },
        );
    }
}
