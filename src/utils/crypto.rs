// src/utils/crypto.rs
//! Random key material generation.
//!
//! Uses `ring`'s system CSPRNG for both secrets and key ids.

use crate::error::KeyError;
use jsonwebtoken::Algorithm;
use ring::rand::{SecureRandom, SystemRandom};

/// Number of random bytes behind a generated key id.
const KEY_ID_BYTES: usize = 12;

/// Secret length matching the HMAC digest size of `algorithm`.
///
/// # Returns
/// `None` for algorithms that don't use shared secrets
pub fn secret_len(algorithm: Algorithm) -> Option<usize> {
    match algorithm {
        Algorithm::HS256 => Some(32),
        Algorithm::HS384 => Some(48),
        Algorithm::HS512 => Some(64),
        _ => None,
    }
}

/// Fills a buffer of `len` bytes from the system random source.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, KeyError> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| KeyError::RandomFailure)?;
    Ok(buf)
}

/// Generates a url-safe random key id.
pub fn random_key_id() -> Result<String, KeyError> {
    let bytes = random_bytes(KEY_ID_BYTES)?;
    Ok(base64::encode_config(bytes, base64::URL_SAFE_NO_PAD))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_len_matches_digest() {
        assert_eq!(secret_len(Algorithm::HS256), Some(32));
        assert_eq!(secret_len(Algorithm::HS512), Some(64));
        assert_eq!(secret_len(Algorithm::RS256), None);
    }

    #[test]
    fn test_key_ids_are_unique_and_url_safe() {
        let a = random_key_id().unwrap();
        let b = random_key_id().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
