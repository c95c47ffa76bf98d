//! # Hoaxify (accounts, sessions and posts)
//!
//! `hoaxify` is the backend of a small social feed. Users register, confirm
//! their address through an e-mailed link, log in to obtain an opaque session
//! token and post short messages ("hoaxes").
//!
//! ## Sessions
//!
//! Session tokens are random, unstructured strings. The server keeps only a
//! SHA-256 digest of each token together with the owner and the time it was
//! last used. A token stays valid while it keeps being used: every successful
//! validation slides its expiry forward by the stale window (7 days by
//! default). Deleting the row is the only way to revoke a token. A background
//! reaper removes stale rows on a fixed interval.
//!
//! ## Provisioning and recovery
//!
//! Registration inserts the account inside an open storage transaction and
//! only commits once the activation e-mail was handed to the mail gateway.
//! A failed or timed out send rolls the insert back, so no account exists
//! whose owner never received the activation link.
//!
//! A password reset replaces the password hash, clears every pending token on
//! the account and then revokes all of the user's sessions.
//!
//! ## Errors
//!
//! Every failure reaches the client as `{path, timestamp, message}` with an
//! extra `validationErrors` map for input-shape failures. Messages are
//! resolved from stable keys into English or Turkish based on
//! `Accept-Language`.

pub mod accounts;
pub mod api;
pub mod cli;
pub mod email;
pub mod error;
pub mod hoaxes;
pub mod locale;
pub mod session;
pub mod store;
pub mod validation;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
