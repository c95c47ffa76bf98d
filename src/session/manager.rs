use super::{
    clock::{Clock, SystemClock},
    token,
};
use crate::store::{SessionRecord, TokenStore, UserId};
use anyhow::{anyhow, Result};
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

/// Tokens unused for this long are rejected and reaped.
pub const DEFAULT_STALE_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const ISSUE_ATTEMPTS: usize = 3;

/// Issues, validates, revokes and reaps session tokens.
///
/// Storage errors are returned to the caller as-is; nothing is retried here
/// except a digest collision on issue.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    stale_window: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("stale_window", &self.stale_window)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, stale_window: Duration) -> Self {
        Self {
            store,
            stale_window,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn stale_window(&self) -> Duration {
        self.stale_window
    }

    fn window_millis(&self) -> i64 {
        i64::try_from(self.stale_window.as_millis()).unwrap_or(i64::MAX)
    }

    /// Last-use instant at or before which a token counts as stale.
    fn cutoff(&self, now: i64) -> i64 {
        now.saturating_sub(self.window_millis())
    }

    /// Create and persist a new token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the random source or the store fails, or if three
    /// generated tokens in a row collide with existing rows.
    #[instrument(skip(self))]
    pub async fn issue(&self, user_id: UserId) -> Result<String> {
        for _ in 0..ISSUE_ATTEMPTS {
            let token = token::generate()?;
            let record = SessionRecord {
                token_hash: token::digest(&token),
                user_id,
                last_used_at: self.clock.now_millis(),
            };
            if self.store.insert(&record).await? {
                debug!("session token issued");
                return Ok(token);
            }
        }
        Err(anyhow!("failed to issue a unique session token"))
    }

    /// Resolve `token` to its owner and slide its expiry forward.
    ///
    /// Unknown and stale tokens yield `None`; a stale token is deleted on
    /// the spot so it can never be accepted again.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn validate(&self, token: &str) -> Result<Option<UserId>> {
        let token_hash = token::digest(token);
        let now = self.clock.now_millis();
        let cutoff = self.cutoff(now);

        if let Some(user_id) = self.store.refresh(&token_hash, now, cutoff).await? {
            return Ok(Some(user_id));
        }

        if self.store.delete_if_stale(&token_hash, cutoff).await? {
            debug!("stale session token purged on use");
        }
        Ok(None)
    }

    /// Delete one token. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        self.store.delete(&token::digest(token)).await
    }

    /// Delete every token of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: UserId) -> Result<u64> {
        let revoked = self.store.delete_for_user(user_id).await?;
        debug!(revoked, "user sessions revoked");
        Ok(revoked)
    }

    /// Delete every token not used within the stale window.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn reap_expired(&self) -> Result<u64> {
        let cutoff = self.cutoff(self.clock.now_millis());
        self.store.delete_used_before(cutoff).await
    }
}
