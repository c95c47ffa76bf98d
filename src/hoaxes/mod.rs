//! Short posts ("hoaxes") written by active users.

use crate::{
    error::{Error, Result},
    locale::Message,
    session::clock::{Clock, SystemClock},
    store::{Hoax, HoaxId, HoaxStore, Page, PageRequest, UserId, UserStore},
    validation::check_hoax_content,
};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct HoaxService {
    hoaxes: Arc<dyn HoaxStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HoaxService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoaxService").finish_non_exhaustive()
    }
}

impl HoaxService {
    #[must_use]
    pub fn new(hoaxes: Arc<dyn HoaxStore>, users: Arc<dyn UserStore>) -> Self {
        Self {
            hoaxes,
            users,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store a hoax written by `actor`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] without an authenticated caller,
    /// [`Error::Validation`] when the content is missing or out of bounds.
    #[instrument(skip(self, content))]
    pub async fn submit(&self, actor: Option<UserId>, content: Option<&str>) -> Result<HoaxId> {
        let Some(user_id) = actor else {
            return Err(Error::Unauthorized(Message::UnauthorizedHoaxSubmit));
        };
        if let Some(message) = check_hoax_content(content) {
            return Err(Error::validation("content", message));
        }
        let id = self
            .hoaxes
            .insert(user_id, content.unwrap_or_default(), self.clock.now_millis())
            .await?;
        info!(hoax_id = id, "hoax submitted");
        Ok(id)
    }

    /// Newest first, optionally limited to one author.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when `author` is not an active account.
    pub async fn list(&self, author: Option<UserId>, request: PageRequest) -> Result<Page<Hoax>> {
        if let Some(author) = author {
            let active = self
                .users
                .find_by_id(author)
                .await?
                .is_some_and(|user| !user.inactive);
            if !active {
                return Err(Error::NotFound(Message::UserNotFound));
            }
        }
        Ok(self.hoaxes.page(author, request).await?)
    }

    /// Delete a hoax owned by `actor`.
    ///
    /// A missing hoax and a foreign one are indistinguishable to the caller.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] unless `actor` wrote the hoax.
    #[instrument(skip(self))]
    pub async fn delete(&self, actor: Option<UserId>, id: HoaxId) -> Result<()> {
        let forbidden = || Error::Forbidden(Message::UnauthorizedHoaxDelete);
        let Some(user_id) = actor else {
            return Err(forbidden());
        };
        match self.hoaxes.find(id).await? {
            Some(hoax) if hoax.author.id == user_id => {
                self.hoaxes.delete(id).await?;
                info!(hoax_id = id, "hoax deleted");
                Ok(())
            }
            _ => Err(forbidden()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;
    use crate::store::{CreateOutcome, NewUser, Stores};
    use anyhow::anyhow;

    const NOW: i64 = 1_700_000_000_000;

    async fn user(stores: &Stores, name: &str, activate: bool) -> anyhow::Result<UserId> {
        let outcome = stores
            .users
            .begin_create(NewUser {
                username: name.to_string(),
                email: format!("{name}@mail.com"),
                password_hash: "hash".to_string(),
                activation_token: name.as_bytes().to_vec(),
            })
            .await?;
        let CreateOutcome::Pending(pending) = outcome else {
            return Err(anyhow!("email taken"));
        };
        let id = pending.user().id;
        pending.commit().await?;
        if activate {
            stores.users.activate(name.as_bytes()).await?;
        }
        Ok(id)
    }

    fn service(stores: &Stores) -> HoaxService {
        HoaxService::new(stores.hoaxes.clone(), stores.users.clone())
            .with_clock(Arc::new(ManualClock::new(NOW)))
    }

    #[tokio::test]
    async fn submit_requires_caller_and_valid_content() -> anyhow::Result<()> {
        let stores = Stores::memory();
        let hoaxes = service(&stores);
        let author = user(&stores, "user1", true).await?;

        assert!(matches!(
            hoaxes.submit(None, Some("Hoax content")).await,
            Err(Error::Unauthorized(Message::UnauthorizedHoaxSubmit))
        ));
        let long = "a".repeat(5001);
        for content in [None, Some("too short"), Some(long.as_str())] {
            let Err(Error::Validation(errors)) = hoaxes.submit(Some(author), content).await else {
                return Err(anyhow!("expected validation failure"));
            };
            assert_eq!(errors.get("content"), Some(&Message::HoaxContentSize));
        }

        let id = hoaxes.submit(Some(author), Some("Hoax content")).await?;
        let stored = stores.hoaxes.find(id).await?.ok_or_else(|| anyhow!("missing"))?;
        assert_eq!(stored.timestamp, NOW);
        assert_eq!(stored.author.id, author);
        Ok(())
    }

    #[tokio::test]
    async fn listing_by_author_requires_active_account() -> anyhow::Result<()> {
        let stores = Stores::memory();
        let hoaxes = service(&stores);
        let active = user(&stores, "user1", true).await?;
        let pending = user(&stores, "user2", false).await?;

        hoaxes.submit(Some(active), Some("First hoax here")).await?;
        hoaxes.submit(Some(active), Some("Second hoax here")).await?;

        let page = hoaxes.list(Some(active), PageRequest::default()).await?;
        assert_eq!(page.content.len(), 2);
        assert_eq!(page.content[0].content, "Second hoax here");

        for author in [pending, 999] {
            assert!(matches!(
                hoaxes.list(Some(author), PageRequest::default()).await,
                Err(Error::NotFound(Message::UserNotFound))
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn only_author_deletes() -> anyhow::Result<()> {
        let stores = Stores::memory();
        let hoaxes = service(&stores);
        let author = user(&stores, "user1", true).await?;
        let other = user(&stores, "user2", true).await?;
        let id = hoaxes.submit(Some(author), Some("Hoax content")).await?;

        for actor in [None, Some(other)] {
            assert!(matches!(
                hoaxes.delete(actor, id).await,
                Err(Error::Forbidden(Message::UnauthorizedHoaxDelete))
            ));
        }
        assert!(matches!(
            hoaxes.delete(Some(author), id + 1).await,
            Err(Error::Forbidden(Message::UnauthorizedHoaxDelete))
        ));

        hoaxes.delete(Some(author), id).await?;
        assert!(stores.hoaxes.find(id).await?.is_none());
        Ok(())
    }
}
