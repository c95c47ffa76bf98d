//! Session token lifecycle: issue, validate with sliding expiry, revoke, reap.

pub mod clock;
mod manager;
mod reaper;
pub mod token;

pub use manager::{TokenManager, DEFAULT_STALE_WINDOW};
pub use reaper::{spawn_token_reaper, ReaperHandle, DEFAULT_REAP_INTERVAL};
