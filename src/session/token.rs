//! Opaque token generation and digesting.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes behind every session, activation and reset token.
pub const TOKEN_BYTES: usize = 32;

/// Create a new opaque token from the OS CSPRNG, base64url without padding.
///
/// # Errors
///
/// Returns an error if the OS random source fails.
pub fn generate() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// SHA-256 digest of a token; the only form that reaches storage.
#[must_use]
pub fn digest(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generate_is_url_safe_and_long_enough() -> Result<()> {
        let token = generate()?;
        // 32 bytes -> 43 base64url characters without padding
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let decoded = Base64UrlUnpadded::decode_vec(&token)
            .map_err(|err| anyhow::anyhow!("decode failed: {err}"))?;
        assert_eq!(decoded.len(), TOKEN_BYTES);
        Ok(())
    }

    #[test]
    fn generate_does_not_repeat() -> Result<()> {
        let mut seen = HashSet::new();
        for _ in 0..256 {
            assert!(seen.insert(generate()?));
        }
        Ok(())
    }

    #[test]
    fn digest_is_stable_sha256() {
        let first = digest("token");
        assert_eq!(first.len(), 32);
        assert_eq!(first, digest("token"));
        assert_ne!(first, digest("other"));
    }
}
