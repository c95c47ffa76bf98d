//! PostgreSQL backend.
//!
//! Every statement runs inside a `db.query` span. Conditional updates carry
//! their precondition in the `WHERE` clause so concurrent callers never need
//! an in-process lock.
//!
//! A pending sign-up keeps its transaction, and so a pooled connection, open
//! while the activation mail is sent. Only [`PgStore::signup_slots`] of them
//! may be open at once; further sign-ups queue for a slot and the rest of the
//! pool stays free for sessions and reads.

use super::{
    Author, CreateOutcome, Hoax, HoaxId, HoaxStore, NewUser, Page, PageRequest, PendingUser,
    SessionRecord, TokenStore, User, UserId, UserStore,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, Row, Transaction,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info_span, Instrument, Span};

const SCHEMA: &str = include_str!("../../sql/schema.sql");

pub const MAX_CONNECTIONS: u32 = 10;
/// Connections pending sign-ups may hold at once.
pub const SIGNUP_SLOTS: usize = 4;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLUMNS: &str = "id, username, email, password_hash, inactive, activation_token, password_reset_token";

fn db_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().is_some_and(|code| code == "23505")
                && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        inactive: row.try_get("inactive")?,
        activation_token: row.try_get("activation_token")?,
        password_reset_token: row.try_get("password_reset_token")?,
    })
}

fn hoax_from_row(row: &PgRow) -> Result<Hoax> {
    Ok(Hoax {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        timestamp: row.try_get("timestamp_ms")?,
        author: Author {
            id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
        },
    })
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    signups: Arc<Semaphore>,
}

impl PgStore {
    /// Wrap `pool`; its size should exceed `signup_slots`.
    #[must_use]
    pub fn new(pool: PgPool, signup_slots: usize) -> Self {
        Self {
            pool,
            signups: Arc::new(Semaphore::new(signup_slots.max(1))),
        }
    }

    /// Open a pool of [`MAX_CONNECTIONS`] against `dsn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the first connection cannot be established.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool, SIGNUP_SLOTS))
    }

    /// Sign-up transactions that can be open right now without queueing.
    #[must_use]
    pub fn signup_slots(&self) -> usize {
        self.signups.available_permits()
    }

    /// Create tables and indexes when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if any schema statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .instrument(db_span("MIGRATE", "sql/schema.sql"))
            .await
            .context("failed to apply schema")?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_user(&self, filter: &str, bind: UserLookup<'_>) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}");
        let span = db_span("SELECT", &query);
        let statement = sqlx::query(&query);
        let statement = match bind {
            UserLookup::Id(id) => statement.bind(id),
            UserLookup::Text(value) => statement.bind(value),
            UserLookup::Bytes(value) => statement.bind(value),
        };
        let row = statement
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;
        row.as_ref().map(user_from_row).transpose()
    }
}

enum UserLookup<'a> {
    Id(UserId),
    Text(&'a str),
    Bytes(&'a [u8]),
}

struct PgPendingUser {
    tx: Transaction<'static, Postgres>,
    user: User,
    // Released after the transaction settles.
    _slot: OwnedSemaphorePermit,
}

#[async_trait]
impl PendingUser for PgPendingUser {
    fn user(&self) -> &User {
        &self.user
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgPendingUser { tx, _slot, .. } = *self;
        tx.commit().await.context("commit signup transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgPendingUser { tx, _slot, .. } = *self;
        tx.rollback().await.context("rollback signup transaction")
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn ping(&self) -> Result<()> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to ping database")?;
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        self.find_user("id = $1", UserLookup::Id(id)).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user("email = $1", UserLookup::Text(email)).await
    }

    async fn find_by_reset_token(&self, token_hash: &[u8]) -> Result<Option<User>> {
        self.find_user("password_reset_token = $1", UserLookup::Bytes(token_hash))
            .await
    }

    async fn begin_create(&self, new_user: NewUser) -> Result<CreateOutcome> {
        let slot = self
            .signups
            .clone()
            .acquire_owned()
            .await
            .context("signup slots closed")?;
        // The row stays invisible to other sessions until the caller commits.
        let mut tx = self.pool.begin().await.context("begin signup transaction")?;

        let query = r"
            INSERT INTO users
                (username, email, password_hash, inactive, activation_token)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.activation_token)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await;

        let id: UserId = match row {
            Ok(row) => row.try_get("id")?,
            Err(err) => {
                if is_unique_violation(&err, "users_email_key") {
                    if let Err(rollback_err) = tx.rollback().await {
                        error!("Failed to roll back signup transaction: {rollback_err:#}");
                    }
                    return Ok(CreateOutcome::EmailTaken);
                }
                return Err(err).context("failed to insert user");
            }
        };

        Ok(CreateOutcome::Pending(Box::new(PgPendingUser {
            tx,
            _slot: slot,
            user: User {
                id,
                username: new_user.username,
                email: new_user.email,
                password_hash: new_user.password_hash,
                inactive: true,
                activation_token: Some(new_user.activation_token),
                password_reset_token: None,
            },
        })))
    }

    async fn activate(&self, token_hash: &[u8]) -> Result<Option<UserId>> {
        let query = r"
            UPDATE users
            SET inactive = FALSE, activation_token = NULL
            WHERE activation_token = $1
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to activate user")?;
        row.map(|row| row.try_get("id")).transpose().map_err(Into::into)
    }

    async fn set_reset_token(&self, id: UserId, token_hash: &[u8]) -> Result<()> {
        let query = "UPDATE users SET password_reset_token = $2 WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to store reset token")?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("user {id} not found"));
        }
        Ok(())
    }

    async fn restore_reset_token(
        &self,
        id: UserId,
        current: &[u8],
        previous: Option<&[u8]>,
    ) -> Result<bool> {
        let query = r"
            UPDATE users
            SET password_reset_token = $3
            WHERE id = $1 AND password_reset_token = $2
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(current)
            .bind(previous)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to restore reset token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_password_reset(
        &self,
        id: UserId,
        token_hash: &[u8],
        password_hash: &str,
    ) -> Result<bool> {
        let query = r"
            UPDATE users
            SET password_hash = $3,
                password_reset_token = NULL,
                activation_token = NULL,
                inactive = FALSE
            WHERE id = $1 AND password_reset_token = $2
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update password")?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_username(&self, id: UserId, username: &str) -> Result<Option<User>> {
        let query = format!("UPDATE users SET username = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let row = sqlx::query(&query)
            .bind(id)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to update username")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete(&self, id: UserId) -> Result<bool> {
        let query = "DELETE FROM users WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete user")?;
        Ok(result.rows_affected() == 1)
    }

    async fn count(&self) -> Result<u64> {
        let query = "SELECT COUNT(*) AS total FROM users";
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to count users")?;
        Ok(to_u64(row.try_get("total")?))
    }

    async fn page_active(
        &self,
        exclude: Option<UserId>,
        request: PageRequest,
    ) -> Result<Page<User>> {
        let filter = "inactive = FALSE AND ($1::BIGINT IS NULL OR id <> $1)";

        let count_query = format!("SELECT COUNT(*) AS total FROM users WHERE {filter}");
        let total: i64 = sqlx::query(&count_query)
            .bind(exclude)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", &count_query))
            .await
            .context("failed to count active users")?
            .try_get("total")?;

        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {filter} ORDER BY id LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&query)
            .bind(exclude)
            .bind(request.limit())
            .bind(request.offset())
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to list active users")?;
        let content = rows.iter().map(user_from_row).collect::<Result<Vec<_>>>()?;

        Ok(Page::new(content, request, to_u64(total)))
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, record: &SessionRecord) -> Result<bool> {
        let query = r"
            INSERT INTO session_tokens (token_hash, user_id, last_used_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_hash) DO NOTHING
        ";
        let result = sqlx::query(query)
            .bind(&record.token_hash)
            .bind(record.user_id)
            .bind(record.last_used_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert session token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let query = "SELECT token_hash, user_id, last_used_at FROM session_tokens WHERE token_hash = $1";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session token")?;
        row.map(|row| -> Result<SessionRecord> {
            Ok(SessionRecord {
                token_hash: row.try_get("token_hash")?,
                user_id: row.try_get("user_id")?,
                last_used_at: row.try_get("last_used_at")?,
            })
        })
        .transpose()
    }

    async fn refresh(
        &self,
        token_hash: &[u8],
        now: i64,
        fresh_after: i64,
    ) -> Result<Option<UserId>> {
        let query = r"
            UPDATE session_tokens
            SET last_used_at = $2
            WHERE token_hash = $1 AND last_used_at > $3
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .bind(fresh_after)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to refresh session token")?;
        row.map(|row| row.try_get("user_id"))
            .transpose()
            .map_err(Into::into)
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<bool> {
        let query = "DELETE FROM session_tokens WHERE token_hash = $1";
        let result = sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete session token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_if_stale(&self, token_hash: &[u8], cutoff: i64) -> Result<bool> {
        let query = "DELETE FROM session_tokens WHERE token_hash = $1 AND last_used_at <= $2";
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete stale session token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<u64> {
        let query = "DELETE FROM session_tokens WHERE user_id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to revoke user sessions")?;
        Ok(result.rows_affected())
    }

    async fn delete_used_before(&self, cutoff: i64) -> Result<u64> {
        let query = "DELETE FROM session_tokens WHERE last_used_at <= $1";
        let result = sqlx::query(query)
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to reap session tokens")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HoaxStore for PgStore {
    async fn insert(&self, user_id: UserId, content: &str, timestamp: i64) -> Result<HoaxId> {
        let query = r"
            INSERT INTO hoaxes (content, timestamp_ms, user_id)
            VALUES ($1, $2, $3)
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(content)
            .bind(timestamp)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert hoax")?;
        Ok(row.try_get("id")?)
    }

    async fn find(&self, id: HoaxId) -> Result<Option<Hoax>> {
        let query = r"
            SELECT h.id, h.content, h.timestamp_ms, u.id AS user_id, u.username, u.email
            FROM hoaxes h
            JOIN users u ON u.id = h.user_id
            WHERE h.id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup hoax")?;
        row.as_ref().map(hoax_from_row).transpose()
    }

    async fn delete(&self, id: HoaxId) -> Result<bool> {
        let query = "DELETE FROM hoaxes WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete hoax")?;
        Ok(result.rows_affected() == 1)
    }

    async fn page(&self, author: Option<UserId>, request: PageRequest) -> Result<Page<Hoax>> {
        let count_query =
            "SELECT COUNT(*) AS total FROM hoaxes WHERE ($1::BIGINT IS NULL OR user_id = $1)";
        let total: i64 = sqlx::query(count_query)
            .bind(author)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", count_query))
            .await
            .context("failed to count hoaxes")?
            .try_get("total")?;

        let query = r"
            SELECT h.id, h.content, h.timestamp_ms, u.id AS user_id, u.username, u.email
            FROM hoaxes h
            JOIN users u ON u.id = h.user_id
            WHERE ($1::BIGINT IS NULL OR h.user_id = $1)
            ORDER BY h.id DESC
            LIMIT $2 OFFSET $3
        ";
        let rows = sqlx::query(query)
            .bind(author)
            .bind(request.limit())
            .bind(request.offset())
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list hoaxes")?;
        let content = rows.iter().map(hoax_from_row).collect::<Result<Vec<_>>>()?;

        Ok(Page::new(content, request, to_u64(total)))
    }
}
