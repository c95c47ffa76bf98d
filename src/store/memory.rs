//! In-process backend used by `memory://` and the test suites.
//!
//! One mutex guards all tables, so each trait call is atomic the same way a
//! single SQL statement is. Pending accounts live outside the `users` table
//! until committed. A second sign-up for an address that is still pending
//! waits until the first one commits or rolls back, like a unique index does.

use super::{
    Author, CreateOutcome, Hoax, HoaxId, HoaxStore, NewUser, Page, PageRequest, PendingUser,
    SessionRecord, TokenStore, User, UserId, UserStore,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug)]
struct HoaxRow {
    user_id: UserId,
    content: String,
    timestamp: i64,
}

#[derive(Debug, Default)]
struct State {
    last_user_id: UserId,
    last_hoax_id: HoaxId,
    users: BTreeMap<UserId, User>,
    pending: BTreeMap<UserId, User>,
    sessions: HashMap<Vec<u8>, SessionRecord>,
    hoaxes: BTreeMap<HoaxId, HoaxRow>,
}

impl State {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|user| user.email == email)
    }

    fn email_pending(&self, email: &str) -> bool {
        self.pending.values().any(|user| user.email == email)
    }

    fn author(&self, user_id: UserId) -> Option<Author> {
        self.users.get(&user_id).map(|user| Author {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        })
    }

    fn hoax(&self, id: HoaxId, row: &HoaxRow) -> Option<Hoax> {
        self.author(row.user_id).map(|author| Hoax {
            id,
            content: row.content.clone(),
            timestamp: row.timestamp,
            author,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    // Woken whenever a pending account commits or rolls back.
    settled: Arc<Notify>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<State>) -> Result<MutexGuard<'_, State>> {
    state
        .lock()
        .map_err(|_| anyhow!("memory store lock poisoned"))
}

struct MemoryPendingUser {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    user: User,
    settled: bool,
}

#[async_trait]
impl PendingUser for MemoryPendingUser {
    fn user(&self) -> &User {
        &self.user
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let mut state = lock(&self.state)?;
        let user = state
            .pending
            .remove(&self.user.id)
            .ok_or_else(|| anyhow!("pending user {} vanished", self.user.id))?;
        state.users.insert(user.id, user);
        drop(state);
        self.settled = true;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        lock(&self.state)?.pending.remove(&self.user.id);
        self.settled = true;
        self.notify.notify_waiters();
        Ok(())
    }
}

impl Drop for MemoryPendingUser {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.pending.remove(&self.user.id);
        }
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_by_reset_token(&self, token_hash: &[u8]) -> Result<Option<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|user| user.password_reset_token.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn begin_create(&self, new_user: NewUser) -> Result<CreateOutcome> {
        let user = loop {
            // Registered before the check so a settle in between is not missed.
            let settled = self.settled.notified();
            {
                let mut state = self.lock()?;
                if state.email_taken(&new_user.email) {
                    return Ok(CreateOutcome::EmailTaken);
                }
                if !state.email_pending(&new_user.email) {
                    state.last_user_id += 1;
                    let user = User {
                        id: state.last_user_id,
                        username: new_user.username,
                        email: new_user.email,
                        password_hash: new_user.password_hash,
                        inactive: true,
                        activation_token: Some(new_user.activation_token),
                        password_reset_token: None,
                    };
                    state.pending.insert(user.id, user.clone());
                    break user;
                }
            }
            settled.await;
        };

        Ok(CreateOutcome::Pending(Box::new(MemoryPendingUser {
            state: self.state.clone(),
            notify: self.settled.clone(),
            user,
            settled: false,
        })))
    }

    async fn activate(&self, token_hash: &[u8]) -> Result<Option<UserId>> {
        let mut state = self.lock()?;
        let user = state
            .users
            .values_mut()
            .find(|user| user.activation_token.as_deref() == Some(token_hash));
        Ok(user.map(|user| {
            user.activation_token = None;
            user.inactive = false;
            user.id
        }))
    }

    async fn set_reset_token(&self, id: UserId, token_hash: &[u8]) -> Result<()> {
        let mut state = self.lock()?;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| anyhow!("user {id} not found"))?;
        user.password_reset_token = Some(token_hash.to_vec());
        Ok(())
    }

    async fn restore_reset_token(
        &self,
        id: UserId,
        current: &[u8],
        previous: Option<&[u8]>,
    ) -> Result<bool> {
        let mut state = self.lock()?;
        match state.users.get_mut(&id) {
            Some(user) if user.password_reset_token.as_deref() == Some(current) => {
                user.password_reset_token = previous.map(<[u8]>::to_vec);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_password_reset(
        &self,
        id: UserId,
        token_hash: &[u8],
        password_hash: &str,
    ) -> Result<bool> {
        let mut state = self.lock()?;
        match state.users.get_mut(&id) {
            Some(user) if user.password_reset_token.as_deref() == Some(token_hash) => {
                user.password_hash = password_hash.to_string();
                user.password_reset_token = None;
                user.activation_token = None;
                user.inactive = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_username(&self, id: UserId, username: &str) -> Result<Option<User>> {
        let mut state = self.lock()?;
        Ok(state.users.get_mut(&id).map(|user| {
            user.username = username.to_string();
            user.clone()
        }))
    }

    async fn delete(&self, id: UserId) -> Result<bool> {
        let mut state = self.lock()?;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.sessions.retain(|_, session| session.user_id != id);
        state.hoaxes.retain(|_, hoax| hoax.user_id != id);
        Ok(true)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.lock()?.users.len() as u64)
    }

    async fn page_active(
        &self,
        exclude: Option<UserId>,
        request: PageRequest,
    ) -> Result<Page<User>> {
        let state = self.lock()?;
        let active: Vec<&User> = state
            .users
            .values()
            .filter(|user| !user.inactive && Some(user.id) != exclude)
            .collect();
        let total = active.len() as u64;
        let content = active
            .into_iter()
            .skip(usize::try_from(request.offset()).unwrap_or(usize::MAX))
            .take(request.size as usize)
            .cloned()
            .collect();
        Ok(Page::new(content, request, total))
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, record: &SessionRecord) -> Result<bool> {
        let mut state = self.lock()?;
        if state.sessions.contains_key(&record.token_hash) {
            return Ok(false);
        }
        if !state.users.contains_key(&record.user_id) {
            return Err(anyhow!("user {} not found", record.user_id));
        }
        state
            .sessions
            .insert(record.token_hash.clone(), record.clone());
        Ok(true)
    }

    async fn find(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        Ok(self.lock()?.sessions.get(token_hash).cloned())
    }

    async fn refresh(
        &self,
        token_hash: &[u8],
        now: i64,
        fresh_after: i64,
    ) -> Result<Option<UserId>> {
        let mut state = self.lock()?;
        Ok(state
            .sessions
            .get_mut(token_hash)
            .filter(|session| session.last_used_at > fresh_after)
            .map(|session| {
                session.last_used_at = now;
                session.user_id
            }))
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<bool> {
        Ok(self.lock()?.sessions.remove(token_hash).is_some())
    }

    async fn delete_if_stale(&self, token_hash: &[u8], cutoff: i64) -> Result<bool> {
        let mut state = self.lock()?;
        let stale = state
            .sessions
            .get(token_hash)
            .is_some_and(|session| session.last_used_at <= cutoff);
        if stale {
            state.sessions.remove(token_hash);
        }
        Ok(stale)
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<u64> {
        let mut state = self.lock()?;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_used_before(&self, cutoff: i64) -> Result<u64> {
        let mut state = self.lock()?;
        let before = state.sessions.len();
        state
            .sessions
            .retain(|_, session| session.last_used_at > cutoff);
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl HoaxStore for MemoryStore {
    async fn insert(&self, user_id: UserId, content: &str, timestamp: i64) -> Result<HoaxId> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&user_id) {
            return Err(anyhow!("user {user_id} not found"));
        }
        state.last_hoax_id += 1;
        let id = state.last_hoax_id;
        state.hoaxes.insert(
            id,
            HoaxRow {
                user_id,
                content: content.to_string(),
                timestamp,
            },
        );
        Ok(id)
    }

    async fn find(&self, id: HoaxId) -> Result<Option<Hoax>> {
        let state = self.lock()?;
        Ok(state.hoaxes.get(&id).and_then(|row| state.hoax(id, row)))
    }

    async fn delete(&self, id: HoaxId) -> Result<bool> {
        Ok(self.lock()?.hoaxes.remove(&id).is_some())
    }

    async fn page(&self, author: Option<UserId>, request: PageRequest) -> Result<Page<Hoax>> {
        let state = self.lock()?;
        let matching: Vec<Hoax> = state
            .hoaxes
            .iter()
            .rev()
            .filter(|(_, row)| author.map_or(true, |author| row.user_id == author))
            .filter_map(|(id, row)| state.hoax(*id, row))
            .collect();
        let total = matching.len() as u64;
        let content = matching
            .into_iter()
            .skip(usize::try_from(request.offset()).unwrap_or(usize::MAX))
            .take(request.size as usize)
            .collect();
        Ok(Page::new(content, request, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            username: "user1".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            activation_token: email.as_bytes().to_vec(),
        }
    }

    async fn create(store: &MemoryStore, email: &str) -> Result<User> {
        match store.begin_create(new_user(email)).await? {
            CreateOutcome::Pending(pending) => {
                let user = pending.user().clone();
                pending.commit().await?;
                Ok(user)
            }
            CreateOutcome::EmailTaken => Err(anyhow!("email taken")),
        }
    }

    #[tokio::test]
    async fn pending_user_is_invisible_until_commit() -> Result<()> {
        let store = MemoryStore::new();
        let CreateOutcome::Pending(pending) = store.begin_create(new_user("a@mail.com")).await?
        else {
            return Err(anyhow!("expected pending user"));
        };
        let id = pending.user().id;

        assert!(store.find_by_id(id).await?.is_none());
        assert!(store.find_by_email("a@mail.com").await?.is_none());
        assert_eq!(UserStore::count(&store).await?, 0);

        pending.commit().await?;
        let user = store.find_by_id(id).await?;
        assert!(user.as_ref().is_some_and(|user| user.inactive));
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_for_pending_email_waits_for_rollback() -> Result<()> {
        let store = MemoryStore::new();
        let CreateOutcome::Pending(pending) = store.begin_create(new_user("a@mail.com")).await?
        else {
            return Err(anyhow!("expected pending user"));
        };

        let second = store.clone();
        let waiting =
            tokio::spawn(async move { second.begin_create(new_user("a@mail.com")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished(), "second sign-up must wait for the first");

        pending.rollback().await?;
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiting).await???;
        let CreateOutcome::Pending(pending) = outcome else {
            return Err(anyhow!("address should be free after rollback"));
        };
        pending.commit().await?;
        assert_eq!(UserStore::count(&store).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_for_pending_email_sees_commit() -> Result<()> {
        let store = MemoryStore::new();
        let CreateOutcome::Pending(pending) = store.begin_create(new_user("a@mail.com")).await?
        else {
            return Err(anyhow!("expected pending user"));
        };

        let second = store.clone();
        let waiting =
            tokio::spawn(async move { second.begin_create(new_user("a@mail.com")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        pending.commit().await?;
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiting).await???;
        assert!(matches!(outcome, CreateOutcome::EmailTaken));
        Ok(())
    }

    #[tokio::test]
    async fn other_addresses_are_not_held_up_by_a_pending_sign_up() -> Result<()> {
        let store = MemoryStore::new();
        let _pending = store.begin_create(new_user("a@mail.com")).await?;
        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            store.begin_create(new_user("b@mail.com")),
        )
        .await??;
        assert!(matches!(outcome, CreateOutcome::Pending(_)));
        Ok(())
    }

    #[tokio::test]
    async fn dropping_pending_user_discards_it() -> Result<()> {
        let store = MemoryStore::new();
        let outcome = store.begin_create(new_user("a@mail.com")).await?;
        drop(outcome);
        assert!(matches!(
            store.begin_create(new_user("a@mail.com")).await?,
            CreateOutcome::Pending(_)
        ));
        assert_eq!(UserStore::count(&store).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn activate_consumes_token() -> Result<()> {
        let store = MemoryStore::new();
        let user = create(&store, "a@mail.com").await?;

        assert_eq!(store.activate(b"a@mail.com").await?, Some(user.id));
        assert_eq!(store.activate(b"a@mail.com").await?, None);

        let user = store.find_by_id(user.id).await?;
        assert!(user.is_some_and(|user| !user.inactive && user.activation_token.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_cascades() -> Result<()> {
        let store = MemoryStore::new();
        let user = create(&store, "a@mail.com").await?;
        TokenStore::insert(
            &store,
            &SessionRecord {
                token_hash: vec![1],
                user_id: user.id,
                last_used_at: 0,
            },
        )
        .await?;
        HoaxStore::insert(&store, user.id, "hoax content", 1).await?;

        assert!(UserStore::delete(&store, user.id).await?);
        assert!(TokenStore::find(&store, &[1]).await?.is_none());
        assert_eq!(HoaxStore::page(&store, None, PageRequest::default()).await?.content.len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_skips_stale_rows() -> Result<()> {
        let store = MemoryStore::new();
        let user = create(&store, "a@mail.com").await?;
        let record = SessionRecord {
            token_hash: vec![7],
            user_id: user.id,
            last_used_at: 100,
        };
        assert!(TokenStore::insert(&store, &record).await?);
        assert!(!TokenStore::insert(&store, &record).await?);

        assert_eq!(store.refresh(&[7], 200, 100).await?, None);
        assert_eq!(store.refresh(&[7], 200, 99).await?, Some(user.id));
        assert_eq!(
            TokenStore::find(&store, &[7]).await?.map(|r| r.last_used_at),
            Some(200)
        );
        Ok(())
    }

    #[tokio::test]
    async fn hoaxes_are_listed_newest_first() -> Result<()> {
        let store = MemoryStore::new();
        let first = create(&store, "a@mail.com").await?;
        let second = create(&store, "b@mail.com").await?;
        for (user, n) in [(first.id, 1), (second.id, 2), (first.id, 3)] {
            HoaxStore::insert(&store, user, &format!("hoax number {n}"), n).await?;
        }

        let all = HoaxStore::page(&store, None, PageRequest::default()).await?;
        let timestamps: Vec<i64> = all.content.iter().map(|hoax| hoax.timestamp).collect();
        assert_eq!(timestamps, vec![3, 2, 1]);

        let mine = HoaxStore::page(&store, Some(first.id), PageRequest::default()).await?;
        assert_eq!(mine.content.len(), 2);
        assert!(mine.content.iter().all(|hoax| hoax.author.id == first.id));
        Ok(())
    }
}
