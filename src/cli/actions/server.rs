use crate::{
    api::{self, AuthConfig},
    cli::telemetry,
    email::{EmailSender, LogEmailSender, MailConfig, Mailer, SmtpConfig, SmtpEmailSender},
    store,
};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub session_stale_window_seconds: u64,
    pub token_reap_interval_seconds: u64,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<SecretString>,
    pub smtp_starttls: bool,
    pub mail_from: String,
    pub mail_timeout_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be reached, the mail transport is
/// misconfigured, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let stores = store::connect(&args.dsn).await?;

    let mailer = Mailer::new(
        email_sender(&args)?,
        MailConfig::new(args.frontend_base_url.clone())
            .with_send_timeout(Duration::from_secs(args.mail_timeout_seconds)),
    );

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_session_stale_window_seconds(args.session_stale_window_seconds)
        .with_token_reap_interval_seconds(args.token_reap_interval_seconds);

    let result = api::new(args.port, stores, auth_config, mailer).await;
    telemetry::shutdown_tracer();
    result
}

fn email_sender(args: &Args) -> Result<Arc<dyn EmailSender>> {
    let Some(host) = &args.smtp_host else {
        warn!("No SMTP host configured, outgoing mail is only logged");
        return Ok(Arc::new(LogEmailSender));
    };

    let mut config = SmtpConfig::new(host.clone())
        .with_port(args.smtp_port)
        .with_starttls(args.smtp_starttls);
    if let (Some(username), Some(password)) = (&args.smtp_username, &args.smtp_password) {
        config = config.with_credentials(username.clone(), password.clone());
    }
    Ok(Arc::new(SmtpEmailSender::new(&config, &args.mail_from)?))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("frontend_base_url", args.frontend_base_url.clone()),
        (
            "session_stale_window",
            format!("{}s", args.session_stale_window_seconds),
        ),
        (
            "token_reap_interval",
            format!("{}s", args.token_reap_interval_seconds),
        ),
        (
            "smtp",
            args.smtp_host.as_ref().map_or_else(
                || "log only".to_string(),
                |host| format!("{host}:{}", args.smtp_port),
            ),
        ),
        ("smtp_auth_set", args.smtp_password.is_some().to_string()),
        ("mail_from", args.mail_from.clone()),
        ("mail_timeout", format!("{}s", args.mail_timeout_seconds)),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
