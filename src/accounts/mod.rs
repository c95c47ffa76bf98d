//! Account provisioning, activation, login and password recovery.
//!
//! ## Provisioning
//!
//! Registration reserves the account inside an open storage transaction
//! ([`crate::store::PendingUser`]), sends the activation mail and only then
//! commits. If the gateway fails or times out the transaction is rolled back
//! and the caller gets [`Error::EmailFailure`]; nobody else ever saw the row.
//!
//! ## Recovery
//!
//! A reset request stores the digest of a fresh reset token and mails the raw
//! token. When the send fails the previous reset token is put back, the same
//! "no undelivered secret survives" rule registration follows.
//!
//! The update step checks the reset token before looking at the new password,
//! so a bad token is always `403` even with an invalid password. A successful
//! update clears every pending token on the account and then revokes all of
//! the user's sessions.

use crate::{
    email::Mailer,
    error::{Error, Result},
    locale::Message,
    session::{token, TokenManager},
    store::{CreateOutcome, NewUser, Page, PageRequest, User, UserId, UserStore},
    validation::{check_password, check_registration, check_username, normalize_email},
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

mod password;

pub use password::Passwords;

/// Raw registration input; any field may be missing.
#[derive(Clone, Debug, Default)]
pub struct Registration {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// What a successful login hands back to the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginGrant {
    pub id: UserId,
    pub username: String,
    pub token: String,
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    tokens: TokenManager,
    mailer: Mailer,
    passwords: Passwords,
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService")
            .field("tokens", &self.tokens)
            .field("mailer", &self.mailer)
            .finish_non_exhaustive()
    }
}

impl AccountService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenManager,
        mailer: Mailer,
        passwords: Passwords,
    ) -> Self {
        Self {
            users,
            tokens,
            mailer,
            passwords,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Create an inactive account and mail its activation token.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for bad input or a taken e-mail,
    /// [`Error::EmailFailure`] when the activation mail could not be sent.
    #[instrument(skip_all)]
    pub async fn register(&self, form: Registration) -> Result<UserId> {
        let email = form.email.as_deref().map(normalize_email);
        let mut errors = check_registration(
            form.username.as_deref(),
            email.as_deref(),
            form.password.as_deref(),
        );
        if let (false, Some(email)) = (errors.contains_key("email"), email.as_deref()) {
            if self.users.find_by_email(email).await?.is_some() {
                errors.insert("email", Message::EmailInuse);
            }
        }
        let (Some(username), Some(email), Some(password), true) =
            (form.username, email, form.password, errors.is_empty())
        else {
            return Err(Error::Validation(errors));
        };

        let password_hash = self.passwords.hash(&password).await?;
        let activation_token = token::generate()?;

        let outcome = self
            .users
            .begin_create(NewUser {
                username,
                email: email.clone(),
                password_hash,
                activation_token: token::digest(&activation_token),
            })
            .await?;
        let pending = match outcome {
            CreateOutcome::Pending(pending) => pending,
            CreateOutcome::EmailTaken => {
                return Err(Error::validation("email", Message::EmailInuse));
            }
        };
        let user_id = pending.user().id;

        if let Err(err) = self.mailer.send_activation(&email, &activation_token).await {
            warn!(user_id, "activation mail failed, discarding account: {err:#}");
            if let Err(rollback_err) = pending.rollback().await {
                error!(user_id, "Failed to roll back account: {rollback_err:#}");
            }
            return Err(Error::EmailFailure(err));
        }

        pending.commit().await?;
        info!(user_id, "account created");
        Ok(user_id)
    }

    /// Consume an activation token.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidToken`] when no pending account holds the token,
    /// including a second use of the same token.
    #[instrument(skip_all)]
    pub async fn activate(&self, activation_token: &str) -> Result<UserId> {
        match self.users.activate(&token::digest(activation_token)).await? {
            Some(user_id) => {
                info!(user_id, "account activated");
                Ok(user_id)
            }
            None => Err(Error::InvalidToken(Message::AccountActivationFailure)),
        }
    }

    /// Check credentials and issue a session token.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] for unknown e-mails or wrong passwords,
    /// [`Error::Forbidden`] for accounts still waiting for activation.
    #[instrument(skip_all)]
    pub async fn login(&self, email: Option<&str>, password: Option<&str>) -> Result<LoginGrant> {
        let password = password.unwrap_or_default();
        let user = match email.map(normalize_email) {
            Some(email) => self.users.find_by_email(&email).await?,
            None => None,
        };
        let Some(user) = user else {
            self.passwords.verify_dummy(password).await;
            return Err(Error::Unauthorized(Message::AuthenticationFailure));
        };
        if !self.passwords.verify(password, &user.password_hash).await? {
            return Err(Error::Unauthorized(Message::AuthenticationFailure));
        }
        if user.inactive {
            return Err(Error::Forbidden(Message::InactiveAuthenticationFailure));
        }

        let token = self.tokens.issue(user.id).await?;
        info!(user_id = user.id, "login succeeded");
        Ok(LoginGrant {
            id: user.id,
            username: user.username,
            token,
        })
    }

    /// Revoke the presented session token, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error only.
    pub async fn logout(&self, session_token: Option<&str>) -> Result<()> {
        if let Some(session_token) = session_token {
            self.tokens.revoke(session_token).await?;
        }
        Ok(())
    }

    /// Store a fresh reset token and mail it.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a malformed e-mail, [`Error::NotFound`] when
    /// no account uses it, [`Error::EmailFailure`] when the mail could not be
    /// sent (the previous reset token is restored).
    #[instrument(skip_all)]
    pub async fn request_password_reset(&self, email: Option<&str>) -> Result<()> {
        let email = email.map(normalize_email).unwrap_or_default();
        if !crate::validation::valid_email(&email) {
            return Err(Error::validation("email", Message::EmailInvalid));
        }
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(Error::NotFound(Message::EmailNotInuse))?;

        let reset_token = token::generate()?;
        let reset_hash = token::digest(&reset_token);
        self.users.set_reset_token(user.id, &reset_hash).await?;

        if let Err(err) = self.mailer.send_password_reset(&email, &reset_token).await {
            warn!(user_id = user.id, "reset mail failed, restoring previous token: {err:#}");
            let restored = self
                .users
                .restore_reset_token(user.id, &reset_hash, user.password_reset_token.as_deref())
                .await;
            if let Err(restore_err) = restored {
                error!(user_id = user.id, "Failed to restore reset token: {restore_err:#}");
            }
            return Err(Error::EmailFailure(err));
        }

        info!(user_id = user.id, "password reset requested");
        Ok(())
    }

    /// Replace the password of the account holding `reset_token` and sign the
    /// user out everywhere.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] for a missing or unknown reset token (checked
    /// first), [`Error::Validation`] for a weak password.
    #[instrument(skip_all)]
    pub async fn update_password(
        &self,
        reset_token: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        let forbidden = || Error::Forbidden(Message::UnauthorizedPasswordReset);

        let Some(reset_token) = reset_token.filter(|reset_token| !reset_token.is_empty()) else {
            return Err(forbidden());
        };
        let reset_hash = token::digest(reset_token);
        let Some(user) = self.users.find_by_reset_token(&reset_hash).await? else {
            return Err(forbidden());
        };

        if let Some(message) = check_password(password) {
            return Err(Error::validation("password", message));
        }
        let password_hash = self.passwords.hash(password.unwrap_or_default()).await?;

        if !self
            .users
            .complete_password_reset(user.id, &reset_hash, &password_hash)
            .await?
        {
            // Consumed by a concurrent update.
            return Err(forbidden());
        }

        let revoked = self.tokens.revoke_all(user.id).await?;
        info!(user_id = user.id, revoked, "password updated");
        Ok(())
    }

    /// Active account by id.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown or inactive accounts.
    pub async fn find_user(&self, id: UserId) -> Result<User> {
        self.users
            .find_by_id(id)
            .await?
            .filter(|user| !user.inactive)
            .ok_or(Error::NotFound(Message::UserNotFound))
    }

    /// # Errors
    ///
    /// Returns a storage error only.
    pub async fn list_users(
        &self,
        exclude: Option<UserId>,
        request: PageRequest,
    ) -> Result<Page<User>> {
        Ok(self.users.page_active(exclude, request).await?)
    }

    /// # Errors
    ///
    /// [`Error::Forbidden`] unless `actor` owns the account,
    /// [`Error::Validation`] for a bad username.
    #[instrument(skip(self, username))]
    pub async fn update_username(
        &self,
        actor: Option<UserId>,
        id: UserId,
        username: Option<&str>,
    ) -> Result<User> {
        if actor != Some(id) {
            return Err(Error::Forbidden(Message::UnauthorizedUserUpdate));
        }
        if let Some(message) = check_username(username) {
            return Err(Error::validation("username", message));
        }
        self.users
            .update_username(id, username.unwrap_or_default())
            .await?
            .ok_or(Error::Forbidden(Message::UnauthorizedUserUpdate))
    }

    /// Delete the caller's own account with its sessions and hoaxes.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] unless `actor` owns the account.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, actor: Option<UserId>, id: UserId) -> Result<()> {
        if actor != Some(id) {
            return Err(Error::Forbidden(Message::UnauthorizedUserDelete));
        }
        if self.users.delete(id).await? {
            info!(user_id = id, "account deleted");
        }
        Ok(())
    }
}
