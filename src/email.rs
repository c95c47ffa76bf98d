//! Mail gateway abstractions.
//!
//! Account flows talk to a [`Mailer`], which renders the activation and
//! password-reset messages and hands them to an [`EmailSender`]. Every send is
//! bounded by a timeout; running out of time counts as a failed send.
//!
//! Two senders ship with the crate: [`SmtpEmailSender`] for real delivery and
//! [`LogEmailSender`], which only logs, for local development.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{info, instrument};

pub const DEFAULT_MAIL_FROM: &str = "Hoaxify <info@hoaxify.com>";
pub const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Email delivery abstraction.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to,
            subject = %message.subject,
            body = %message.html_body,
            "email send stub"
        );
        Ok(())
    }
}

/// SMTP relay settings.
#[derive(Clone)]
pub struct SmtpConfig {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<SecretString>,
    starttls: bool,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("starttls", &self.starttls)
            .finish_non_exhaustive()
    }
}

impl SmtpConfig {
    #[must_use]
    pub fn new(host: String) -> Self {
        Self {
            host,
            port: DEFAULT_SMTP_PORT,
            username: None,
            password: None,
            starttls: true,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: String, password: SecretString) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// `false` talks plain SMTP, for local relays such as MailHog.
    #[must_use]
    pub fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Async SMTP delivery through `lettre`.
#[derive(Clone)]
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Build the transport; no connection is opened until the first send.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay host or the sender address is invalid.
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .with_context(|| format!("Invalid SMTP relay: {}", config.host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }
        let from = from
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid mail-from address: {from}"))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let to = message
            .to
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid recipient address: {}", message.to))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .context("failed to build email")?;
        self.transport
            .send(email)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

/// Link and timeout settings for outbound account mail.
#[derive(Clone, Debug)]
pub struct MailConfig {
    frontend_base_url: String,
    send_timeout: Duration,
}

impl MailConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}

/// Renders account mail and delivers it within the configured timeout.
#[derive(Clone)]
pub struct Mailer {
    sender: Arc<dyn EmailSender>,
    config: MailConfig,
}

impl fmt::Debug for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Mailer {
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>, config: MailConfig) -> Self {
        Self { sender, config }
    }

    /// # Errors
    ///
    /// Returns an error if the sender fails or times out.
    #[instrument(skip(self, token))]
    pub async fn send_activation(&self, to: &str, token: &str) -> Result<()> {
        let link = frontend_link(&self.config.frontend_base_url, "/#/login?token=", token);
        self.deliver(EmailMessage {
            to: to.to_string(),
            subject: "Account Activation".to_string(),
            html_body: format!(
                "<div><b>Please click below link to activate your account</b></div>\
                 <div><a href=\"{link}\">Activate</a></div>"
            ),
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the sender fails or times out.
    #[instrument(skip(self, token))]
    pub async fn send_password_reset(&self, to: &str, token: &str) -> Result<()> {
        let link = frontend_link(
            &self.config.frontend_base_url,
            "/#/password-reset/update?reset=",
            token,
        );
        self.deliver(EmailMessage {
            to: to.to_string(),
            subject: "Password Reset".to_string(),
            html_body: format!(
                "<div>Please click below link to reset your password</div>\
                 <div><a href=\"{link}\">Reset</a></div>"
            ),
        })
        .await
    }

    async fn deliver(&self, message: EmailMessage) -> Result<()> {
        let limit = self.config.send_timeout;
        timeout(limit, self.sender.send(&message))
            .await
            .map_err(|_| anyhow!("mail gateway timed out after {}ms", limit.as_millis()))?
    }
}

fn frontend_link(frontend_base_url: &str, route: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}{route}{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailSender for Recording {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            self.sent
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(message.clone());
            Ok(())
        }
    }

    struct Stalled;

    #[async_trait]
    impl EmailSender for Stalled {
        async fn send(&self, _message: &EmailMessage) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[test]
    fn frontend_link_trims_trailing_slash() {
        assert_eq!(
            frontend_link("http://localhost:8080/", "/#/login?token=", "abc"),
            "http://localhost:8080/#/login?token=abc"
        );
    }

    #[tokio::test]
    async fn activation_mail_carries_token_link() -> Result<()> {
        let recording = Arc::new(Recording::default());
        let mailer = Mailer::new(
            recording.clone(),
            MailConfig::new("https://hoaxify.com".to_string()),
        );
        mailer.send_activation("user1@mail.com", "tok3n").await?;

        let sent = recording.sent.lock().map_err(|_| anyhow!("poisoned"))?;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user1@mail.com");
        assert_eq!(sent[0].subject, "Account Activation");
        assert!(sent[0]
            .html_body
            .contains("https://hoaxify.com/#/login?token=tok3n"));
        Ok(())
    }

    #[tokio::test]
    async fn reset_mail_carries_reset_link() -> Result<()> {
        let recording = Arc::new(Recording::default());
        let mailer = Mailer::new(
            recording.clone(),
            MailConfig::new("https://hoaxify.com".to_string()),
        );
        mailer.send_password_reset("user1@mail.com", "r3set").await?;

        let sent = recording.sent.lock().map_err(|_| anyhow!("poisoned"))?;
        assert!(sent[0]
            .html_body
            .contains("https://hoaxify.com/#/password-reset/update?reset=r3set"));
        Ok(())
    }

    #[tokio::test]
    async fn slow_gateway_counts_as_failure() {
        let mailer = Mailer::new(
            Arc::new(Stalled),
            MailConfig::new("http://localhost".to_string())
                .with_send_timeout(Duration::from_millis(20)),
        );
        let result = mailer.send_activation("user1@mail.com", "tok3n").await;
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("timed out"));
        }
    }

    #[tokio::test]
    async fn smtp_sender_rejects_bad_from_address() {
        let config = SmtpConfig::new("localhost".to_string()).with_starttls(false);
        assert!(SmtpEmailSender::new(&config, "not an address").is_err());
        assert!(SmtpEmailSender::new(&config, DEFAULT_MAIL_FROM).is_ok());
    }

    #[test]
    fn smtp_config_debug_hides_password() {
        let config = SmtpConfig::new("smtp.example.com".to_string())
            .with_credentials("user".to_string(), SecretString::from("hunter2".to_string()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert_eq!(config.port(), DEFAULT_SMTP_PORT);
        assert_eq!(config.host(), "smtp.example.com");
    }
}
