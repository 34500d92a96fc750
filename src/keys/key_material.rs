// src/keys/key_material.rs
//! Key material contract consumed by the token service.
//!
//! A provider hands out immutable [`KeySet`] snapshots. The token service
//! takes one snapshot per operation, so a verification that races a rotation
//! sees either the old key set or the new one, never a mix of both.

use crate::error::KeyError;
use crate::models::signing_key::{KeyRole, Secret, SigningKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Source of signing and verification keys.
///
/// Persistence of keys lives behind this trait; the crate ships
/// [`KeyRing`](crate::keys::key_ring::KeyRing) as an in-memory implementation.
pub trait KeyMaterialProvider: Send + Sync {
    /// Returns a consistent view of the keys at this instant.
    fn snapshot(&self) -> Arc<KeySet>;
}

/// An immutable set of keys and their secrets.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Vec<SigningKey>,
    secrets: HashMap<String, Secret>,
}

impl KeySet {
    /// Builds a key set.
    ///
    /// # Errors
    /// - `DuplicateKid` if two entries share an id
    /// - `MultipleSigningKeys` if more than one entry has the signing role
    /// - `EmptySecret` if an entry has no secret bytes
    pub fn new(entries: Vec<(SigningKey, Secret)>) -> Result<Self, KeyError> {
        let mut keys = Vec::with_capacity(entries.len());
        let mut secrets = HashMap::with_capacity(entries.len());
        let mut signing_kid: Option<String> = None;

        for (key, secret) in entries {
            if secret.is_empty() {
                return Err(KeyError::EmptySecret(key.kid));
            }
            if secrets.contains_key(&key.kid) {
                return Err(KeyError::DuplicateKid(key.kid));
            }
            if key.role == KeyRole::Signing {
                if let Some(existing) = &signing_kid {
                    return Err(KeyError::MultipleSigningKeys(existing.clone(), key.kid));
                }
                signing_kid = Some(key.kid.clone());
            }
            secrets.insert(key.kid.clone(), secret);
            keys.push(key);
        }

        Ok(Self { keys, secrets })
    }

    /// The key used for new issuance, if one is configured.
    pub fn current_signing_key(&self) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.role == KeyRole::Signing)
    }

    pub fn key_by_kid(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// Checks this set's own record for `key.kid`; the caller's copy of the
    /// role and grace window is not trusted.
    pub fn is_valid_for_verification(&self, key: &SigningKey, now: DateTime<Utc>) -> bool {
        self.key_by_kid(&key.kid)
            .map_or(false, |stored| stored.accepts_verification_at(now))
    }

    /// Keys accepted for verification at `now`, most recently activated first.
    pub fn valid_verification_keys(&self, now: DateTime<Utc>) -> Vec<&SigningKey> {
        let mut valid: Vec<&SigningKey> = self
            .keys
            .iter()
            .filter(|key| key.accepts_verification_at(now))
            .collect();
        valid.sort_by(|a, b| b.activated_at.cmp(&a.activated_at).then_with(|| a.kid.cmp(&b.kid)));
        valid
    }

    pub fn secret_material(&self, key: &SigningKey) -> Option<&Secret> {
        self.secrets.get(&key.kid)
    }

    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Copies out every key with its secret, for building the next version.
    pub(crate) fn entries(&self) -> Vec<(SigningKey, Secret)> {
        self.keys
            .iter()
            .filter_map(|key| {
                self.secrets
                    .get(&key.kid)
                    .map(|secret| (key.clone(), secret.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(kid: &str, role: KeyRole, activated_at: DateTime<Utc>) -> SigningKey {
        SigningKey {
            kid: kid.to_string(),
            algorithm: None,
            role,
            activated_at,
            verify_until: None,
        }
    }

    fn secret() -> Secret {
        Secret::new(b"0123456789abcdef0123456789abcdef".to_vec())
    }

    #[test]
    fn test_rejects_two_signing_keys() {
        let now = Utc::now();
        let result = KeySet::new(vec![
            (key("a", KeyRole::Signing, now), secret()),
            (key("b", KeyRole::Signing, now), secret()),
        ]);
        assert!(matches!(result, Err(KeyError::MultipleSigningKeys(a, b)) if a == "a" && b == "b"));
    }

    #[test]
    fn test_rejects_duplicate_kid_and_empty_secret() {
        let now = Utc::now();
        let duplicate = KeySet::new(vec![
            (key("a", KeyRole::Signing, now), secret()),
            (key("a", KeyRole::VerifyOnly, now), secret()),
        ]);
        assert!(matches!(duplicate, Err(KeyError::DuplicateKid(_))));

        let empty = KeySet::new(vec![(key("a", KeyRole::Signing, now), Secret::new(Vec::new()))]);
        assert!(matches!(empty, Err(KeyError::EmptySecret(_))));
    }

    #[test]
    fn test_verification_keys_newest_first() {
        let now = Utc::now();
        let set = KeySet::new(vec![
            (key("old", KeyRole::VerifyOnly, now - Duration::days(60)), secret()),
            (key("current", KeyRole::Signing, now - Duration::days(1)), secret()),
            (key("mid", KeyRole::VerifyOnly, now - Duration::days(30)), secret()),
            (key("gone", KeyRole::Retired, now - Duration::days(90)), secret()),
        ])
        .unwrap();

        let kids: Vec<&str> = set
            .valid_verification_keys(now)
            .into_iter()
            .map(|key| key.kid.as_str())
            .collect();
        assert_eq!(kids, vec!["current", "mid", "old"]);
        assert_eq!(set.current_signing_key().map(|key| key.kid.as_str()), Some("current"));
    }

    #[test]
    fn test_validity_uses_stored_record() {
        let now = Utc::now();
        let set = KeySet::new(vec![(key("retired", KeyRole::Retired, now), secret())]).unwrap();

        let forged = key("retired", KeyRole::Signing, now);
        assert!(!set.is_valid_for_verification(&forged, now));

        let unknown = key("unknown", KeyRole::Signing, now);
        assert!(!set.is_valid_for_verification(&unknown, now));
    }

    #[test]
    fn test_empty_set_has_no_signing_key() {
        let set = KeySet::default();
        assert!(set.current_signing_key().is_none());
        assert!(set.valid_verification_keys(Utc::now()).is_empty());
    }
}
