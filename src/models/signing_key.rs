// src/models/signing_key.rs
//! Signing key metadata.
//!
//! A [`SigningKey`] describes a key (id, algorithm, role, validity window)
//! but never carries its secret. Secret material is only handed out by a
//! [`KeySet`](crate::keys::key_material::KeySet) as a [`Secret`].

use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle role of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    /// Used for new issuance. At most one key holds this role.
    Signing,
    /// Rotated out; still accepted for verification during its grace period.
    VerifyOnly,
    /// No longer accepted for anything.
    Retired,
}

/// Metadata for a key held by a key set.
///
/// # Fields
/// - `kid`: identifier written into the header of every credential the key signs
/// - `algorithm`: declared algorithm, or `None` to use the configured default
/// - `role`: see [`KeyRole`]
/// - `activated_at`: when the key became the signing key
/// - `verify_until`: end of the grace period, set when the key is demoted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    pub kid: String,
    pub algorithm: Option<Algorithm>,
    pub role: KeyRole,
    pub activated_at: DateTime<Utc>,
    pub verify_until: Option<DateTime<Utc>>,
}

impl SigningKey {
    /// Creates a key in the signing role, activated at `activated_at`.
    pub fn signing(kid: impl Into<String>, algorithm: Option<Algorithm>, activated_at: DateTime<Utc>) -> Self {
        Self {
            kid: kid.into(),
            algorithm,
            role: KeyRole::Signing,
            activated_at,
            verify_until: None,
        }
    }

    /// The algorithm this key signs with, falling back to `default`.
    pub fn effective_algorithm(&self, default: Algorithm) -> Algorithm {
        self.algorithm.unwrap_or(default)
    }

    /// Returns true if the role and grace window accept verification at `now`.
    pub fn accepts_verification_at(&self, now: DateTime<Utc>) -> bool {
        let role_ok = matches!(self.role, KeyRole::Signing | KeyRole::VerifyOnly);
        role_ok && self.verify_until.map_or(true, |until| now < until)
    }
}

/// Returns true for the HMAC algorithms usable with shared secret material.
pub fn is_secret_algorithm(algorithm: Algorithm) -> bool {
    matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Shared secret bytes for an HMAC key.
///
/// `Debug` is redacted so secrets never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {}])", self.0.len())
    }
}
