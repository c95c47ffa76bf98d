//! Storage seams for users, session tokens and hoaxes.
//!
//! Two backends implement the traits: [`postgres::PgStore`] for deployments and
//! [`memory::MemoryStore`] for local development and tests. Every token value
//! that reaches storage (session, activation, reset) is a SHA-256 digest; raw
//! tokens never leave the request that produced them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub mod memory;
pub mod postgres;

pub type UserId = i64;
pub type HoaxId = i64;

/// Account row as kept by the credential store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub inactive: bool,
    pub activation_token: Option<Vec<u8>>,
    pub password_reset_token: Option<Vec<u8>>,
}

/// Fields needed to insert a pending account.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub activation_token: Vec<u8>,
}

/// Session row; `last_used_at` is Unix epoch milliseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub token_hash: Vec<u8>,
    pub user_id: UserId,
    pub last_used_at: i64,
}

/// Author fields embedded in hoax listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hoax {
    pub id: HoaxId,
    pub content: String,
    pub timestamp: i64,
    pub author: Author,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 10;

    /// Clamp raw query values: bad or negative page becomes 0, size outside
    /// `1..=10` becomes 10.
    #[must_use]
    pub fn from_query(page: Option<&str>, size: Option<&str>) -> Self {
        let page = page.and_then(|page| page.trim().parse::<u32>().ok()).unwrap_or(0);
        let size = size
            .and_then(|size| size.trim().parse::<u32>().ok())
            .filter(|size| (1..=Self::MAX_SIZE).contains(size))
            .unwrap_or(Self::DEFAULT_SIZE);
        Self { page, size }
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: Self::DEFAULT_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(content: Vec<T>, request: PageRequest, total: u64) -> Self {
        let size = u64::from(request.size.max(1));
        let total_pages = u32::try_from(total.div_ceil(size)).unwrap_or(u32::MAX);
        Self {
            content,
            page: request.page,
            size: request.size,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_pages: self.total_pages,
        }
    }
}

/// Result of reserving a new account.
pub enum CreateOutcome {
    Pending(Box<dyn PendingUser>),
    EmailTaken,
}

/// An inserted but uncommitted account.
///
/// The row is invisible to every other reader until [`PendingUser::commit`].
/// Dropping the handle without committing discards it.
#[async_trait]
pub trait PendingUser: Send {
    fn user(&self) -> &User;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_reset_token(&self, token_hash: &[u8]) -> Result<Option<User>>;

    /// Open a transaction and insert the account as inactive.
    async fn begin_create(&self, user: NewUser) -> Result<CreateOutcome>;

    /// Clear the activation token and the inactive flag in one statement.
    /// Returns `None` when no account holds the token.
    async fn activate(&self, token_hash: &[u8]) -> Result<Option<UserId>>;

    async fn set_reset_token(&self, id: UserId, token_hash: &[u8]) -> Result<()>;

    /// Put `previous` back only if the reset token is still `current`.
    async fn restore_reset_token(
        &self,
        id: UserId,
        current: &[u8],
        previous: Option<&[u8]>,
    ) -> Result<bool>;

    /// Store the new hash and clear reset token, activation token and the
    /// inactive flag, conditional on the reset token still matching.
    async fn complete_password_reset(
        &self,
        id: UserId,
        token_hash: &[u8],
        password_hash: &str,
    ) -> Result<bool>;

    async fn update_username(&self, id: UserId, username: &str) -> Result<Option<User>>;

    /// Delete the account; its sessions and hoaxes go with it.
    async fn delete(&self, id: UserId) -> Result<bool>;

    async fn count(&self) -> Result<u64>;

    /// Active accounts ordered by id, optionally leaving one out.
    async fn page_active(&self, exclude: Option<UserId>, request: PageRequest)
        -> Result<Page<User>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns `false` when the digest is already taken.
    async fn insert(&self, record: &SessionRecord) -> Result<bool>;

    async fn find(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>>;

    /// Bump `last_used_at` to `now` for a row used after `fresh_after`.
    /// Returns the owner when the row was refreshed.
    async fn refresh(&self, token_hash: &[u8], now: i64, fresh_after: i64)
        -> Result<Option<UserId>>;

    async fn delete(&self, token_hash: &[u8]) -> Result<bool>;

    /// Delete one row only if it was last used at or before `cutoff`.
    async fn delete_if_stale(&self, token_hash: &[u8], cutoff: i64) -> Result<bool>;

    async fn delete_for_user(&self, user_id: UserId) -> Result<u64>;

    /// Delete every row last used at or before `cutoff`.
    async fn delete_used_before(&self, cutoff: i64) -> Result<u64>;
}

#[async_trait]
pub trait HoaxStore: Send + Sync {
    async fn insert(&self, user_id: UserId, content: &str, timestamp: i64) -> Result<HoaxId>;

    async fn find(&self, id: HoaxId) -> Result<Option<Hoax>>;

    async fn delete(&self, id: HoaxId) -> Result<bool>;

    /// Newest first, optionally restricted to one author.
    async fn page(&self, author: Option<UserId>, request: PageRequest) -> Result<Page<Hoax>>;
}

/// Handles to every store, sharing one backend.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub hoaxes: Arc<dyn HoaxStore>,
}

impl Stores {
    #[must_use]
    pub fn memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            users: store.clone(),
            tokens: store.clone(),
            hoaxes: store,
        }
    }

    #[must_use]
    pub fn postgres(store: postgres::PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            tokens: store.clone(),
            hoaxes: store,
        }
    }
}

/// Open the backend named by `dsn`: `memory://` or a PostgreSQL URL.
///
/// # Errors
///
/// Returns an error if the scheme is unknown, the database is unreachable or
/// the schema cannot be applied.
pub async fn connect(dsn: &str) -> Result<Stores> {
    if dsn.starts_with("memory:") {
        return Ok(Stores::memory());
    }
    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        let store = postgres::PgStore::connect(dsn)
            .await
            .context("Failed to connect to database")?;
        store.migrate().await.context("Failed to apply schema")?;
        return Ok(Stores::postgres(store));
    }
    Err(anyhow::anyhow!("Unsupported DSN scheme, expected postgres:// or memory://"))
}
