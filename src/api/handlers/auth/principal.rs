//! Authenticated caller extraction.

use crate::store::UserId;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

/// Identity attached by the authentication gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
}

/// The caller of a request, anonymous when no valid token was presented.
#[derive(Clone, Copy, Debug, Default)]
pub struct Caller(pub Option<Principal>);

impl Caller {
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.0.map(|principal| principal.user_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Principal>().copied()))
    }
}
