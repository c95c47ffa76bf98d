//! Session handling at the HTTP boundary.
//!
//! [`gate::authenticate`] runs on every request. A bearer token that resolves
//! through the token manager attaches a [`principal::Principal`]; a missing,
//! unknown or stale token leaves the request anonymous. Each route then
//! decides what anonymity means for it (`403` for owner-only mutations,
//! `401` for hoax submission, nothing for listings and logout).

pub(crate) mod gate;
pub(crate) mod principal;
pub(crate) mod session;
mod state;

pub use state::{AuthConfig, DEFAULT_FRONTEND_BASE_URL};
