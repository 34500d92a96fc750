// src/keys/key_ring.rs
//! In-memory rotating key provider.
//!
//! Provides:
//! - Copy-on-write key set versions behind a lock held only for a pointer swap
//! - Rotation with a verify-only grace period for the outgoing key
//! - Generation of fresh HMAC secrets from the system CSPRNG
//! - Retirement and pruning of keys that are no longer needed

use crate::error::KeyError;
use crate::keys::key_material::{KeyMaterialProvider, KeySet};
use crate::models::signing_key::{is_secret_algorithm, KeyRole, Secret, SigningKey};
use crate::utils::crypto::{random_bytes, random_key_id, secret_len};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::Algorithm;
use std::sync::{Arc, PoisonError, RwLock};

/// Rotating key store.
///
/// Every mutation builds a new [`KeySet`] from the current one and swaps it
/// in. Readers holding an older snapshot keep a consistent view until they
/// drop it.
pub struct KeyRing {
    current: RwLock<Arc<KeySet>>,
}

impl KeyRing {
    pub fn new(set: KeySet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// A ring with no keys. Issuance fails until a key is rotated in.
    pub fn empty() -> Self {
        Self::new(KeySet::default())
    }

    /// Creates a ring holding one freshly generated signing key.
    pub fn generate(algorithm: Algorithm, now: DateTime<Utc>) -> Result<Self, KeyError> {
        let (key, secret) = generate_key(algorithm, now)?;
        Ok(Self::new(KeySet::new(vec![(key, secret)])?))
    }

    /// Installs `key` as the signing key.
    ///
    /// # Arguments
    /// * `key` - New key; its role and activation time are overwritten
    /// * `secret` - Secret material for the new key
    /// * `now` - Rotation instant, recorded as the new key's activation time
    /// * `grace` - How long the outgoing signing key stays verify-only
    ///
    /// # Errors
    /// Returns `Err` if the kid already exists, the secret is empty, or the
    /// key declares a non-HMAC algorithm. The ring is unchanged on error.
    pub fn rotate(
        &self,
        mut key: SigningKey,
        secret: Secret,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<(), KeyError> {
        if let Some(algorithm) = key.algorithm {
            if !is_secret_algorithm(algorithm) {
                return Err(KeyError::UnsupportedAlgorithm(format!("{:?}", algorithm)));
            }
        }
        key.role = KeyRole::Signing;
        key.activated_at = now;
        key.verify_until = None;

        let new_kid = key.kid.clone();
        self.update(|set| {
            let mut entries: Vec<(SigningKey, Secret)> = set
                .entries()
                .into_iter()
                .map(|(mut existing, existing_secret)| {
                    if existing.role == KeyRole::Signing {
                        existing.role = KeyRole::VerifyOnly;
                        existing.verify_until = Some(now + grace);
                    }
                    (existing, existing_secret)
                })
                .collect();
            entries.push((key, secret));
            KeySet::new(entries)
        })?;

        log::info!("rotated signing key to {} (grace {}s)", new_kid, grace.num_seconds());
        Ok(())
    }

    /// Generates a new random key and rotates it in.
    ///
    /// # Returns
    /// Metadata of the new signing key
    pub fn rotate_generated(
        &self,
        algorithm: Algorithm,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<SigningKey, KeyError> {
        let (key, secret) = generate_key(algorithm, now)?;
        let metadata = key.clone();
        self.rotate(key, secret, now, grace)?;
        Ok(metadata)
    }

    /// Stops accepting a key for anything, immediately.
    pub fn retire(&self, kid: &str) -> Result<(), KeyError> {
        self.update(|set| {
            if set.key_by_kid(kid).is_none() {
                return Err(KeyError::UnknownKid(kid.to_string()));
            }
            let entries = set
                .entries()
                .into_iter()
                .map(|(mut key, secret)| {
                    if key.kid == kid {
                        if key.role == KeyRole::Signing {
                            log::warn!("retiring current signing key {}; issuance will fail until rotation", kid);
                        }
                        key.role = KeyRole::Retired;
                    }
                    (key, secret)
                })
                .collect();
            KeySet::new(entries)
        })?;
        log::info!("retired key {}", kid);
        Ok(())
    }

    /// Drops retired keys and verify-only keys whose grace has ended.
    ///
    /// # Returns
    /// Number of keys removed
    pub fn prune(&self, now: DateTime<Utc>) -> Result<usize, KeyError> {
        let mut removed = 0;
        self.update(|set| {
            let before = set.len();
            let entries: Vec<(SigningKey, Secret)> = set
                .entries()
                .into_iter()
                .filter(|(key, _)| key.role == KeyRole::Signing || key.accepts_verification_at(now))
                .collect();
            removed = before - entries.len();
            KeySet::new(entries)
        })?;
        if removed > 0 {
            log::info!("pruned {} expired keys", removed);
        }
        Ok(removed)
    }

    /// Builds the next version from the current one and swaps it in.
    fn update<F>(&self, build: F) -> Result<(), KeyError>
    where
        F: FnOnce(&KeySet) -> Result<KeySet, KeyError>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = build(&**guard)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

impl KeyMaterialProvider for KeyRing {
    fn snapshot(&self) -> Arc<KeySet> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }
}

/// Generates a signing key with a random kid and a digest-sized secret.
fn generate_key(algorithm: Algorithm, now: DateTime<Utc>) -> Result<(SigningKey, Secret), KeyError> {
    let len = secret_len(algorithm)
        .ok_or_else(|| KeyError::UnsupportedAlgorithm(format!("{:?}", algorithm)))?;
    let secret = Secret::new(random_bytes(len)?);
    let key = SigningKey::signing(random_key_id()?, Some(algorithm), now);
    Ok((key, secret))
}
