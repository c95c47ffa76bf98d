//! Argon2id password hashing on the blocking pool.

use crate::session::token;
use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use rand::rngs::OsRng;
use std::sync::Arc;
use tokio::task::spawn_blocking;

#[derive(Clone)]
pub struct Passwords {
    argon: Argon2<'static>,
    // Checked against when no account matches the e-mail.
    dummy_hash: Arc<str>,
}

impl std::fmt::Debug for Passwords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passwords").finish_non_exhaustive()
    }
}

impl Passwords {
    /// Argon2id with the crate's default cost parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the dummy hash cannot be computed.
    pub fn new() -> Result<Self> {
        Self::with_params(Params::default())
    }

    /// # Errors
    ///
    /// Returns an error if the dummy hash cannot be computed.
    pub fn with_params(params: Params) -> Result<Self> {
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon, &token::generate()?)?;
        Ok(Self {
            argon,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Hash with a fresh random salt; returns the PHC string.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails or the blocking task is cancelled.
    pub async fn hash(&self, password: &str) -> Result<String> {
        let argon = self.argon.clone();
        let password = password.to_owned();
        spawn_blocking(move || hash_with(&argon, &password))
            .await
            .context("password hashing task failed")?
    }

    /// Constant-effort comparison against a stored PHC string.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored hash cannot be parsed or the blocking
    /// task is cancelled.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let argon = self.argon.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&hash).map_err(|err| anyhow!("invalid password hash: {err}"))?;
            Ok(argon.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .context("password verification task failed")?
    }

    /// Spend the same effort as [`Passwords::verify`] without an account.
    pub async fn verify_dummy(&self, password: &str) {
        let dummy_hash = self.dummy_hash.clone();
        let _ = self.verify(password, &dummy_hash).await;
    }
}

fn hash_with(argon: &Argon2<'_>, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Result<Passwords> {
        let params =
            Params::new(1024, 1, 1, None).map_err(|err| anyhow!("invalid params: {err}"))?;
        Passwords::with_params(params)
    }

    #[tokio::test]
    async fn hash_then_verify() -> Result<()> {
        let passwords = fast()?;
        let hash = passwords.hash("Secret1a").await?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(passwords.verify("Secret1a", &hash).await?);
        assert!(!passwords.verify("Secret1b", &hash).await?);
        Ok(())
    }

    #[tokio::test]
    async fn hashes_are_salted() -> Result<()> {
        let passwords = fast()?;
        let first = passwords.hash("Secret1a").await?;
        let second = passwords.hash("Secret1a").await?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_hash_is_an_error() -> Result<()> {
        let passwords = fast()?;
        assert!(passwords.verify("Secret1a", "plain-text").await.is_err());
        passwords.verify_dummy("anything").await;
        Ok(())
    }
}
