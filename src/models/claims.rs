// src/models/claims.rs
//! Bearer credential data model.
//!
//! A [`Credential`] is a compact JWT: `base64url(header).base64url(payload).base64url(signature)`.
//! The payload deserializes into [`Claims`]; verification reports a
//! [`VerificationOutcome`] rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Claim names the issuer always sets itself.
pub const REGISTERED_CLAIMS: [&str; 3] = ["sub", "iat", "exp"];

/// The signed assertions carried inside a credential.
///
/// # Fields
/// - `sub`: vendor identifier the credential is bound to
/// - `iat`: issued-at, seconds since the Unix epoch
/// - `exp`: expiry, seconds since the Unix epoch (exclusive)
/// - `extra`: any additional claims supplied at issuance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Builds a claim set, dropping extra claims that collide with registered ones.
    pub fn new(subject: &str, issued_at: i64, expires_at: i64, extra: Map<String, Value>) -> Self {
        let extra = extra
            .into_iter()
            .filter(|(name, _)| !REGISTERED_CLAIMS.contains(&name.as_str()))
            .collect();
        Self {
            sub: subject.to_string(),
            iat: issued_at,
            exp: expires_at,
            extra,
        }
    }

    /// Returns true once `now` (seconds since epoch) has reached the expiry.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    /// Looks up an extra claim by name.
    pub fn extra_claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// An issued bearer credential. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub(crate) fn new(compact: String) -> Self {
        Self(compact)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Credential {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key id read from a credential header *without* verifying the signature.
///
/// Only good for choosing which key to try first. It deliberately offers no
/// way to reach the payload, so it can't be mistaken for an authenticated claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedKeyId(String);

impl UnverifiedKeyId {
    pub(crate) fn new(kid: String) -> Self {
        Self(kid)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of verifying a credential.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    /// Signature, expiry and subject all checked out.
    Valid(Claims),
    /// Authentic, but `now >= exp`.
    Expired,
    /// Authentic and unexpired, but bound to a different subject.
    SubjectMismatch,
    /// No valid key produced a matching signature.
    SignatureInvalid,
    /// The credential could not be parsed.
    Malformed,
    /// There were no keys valid for verification to try.
    NoKeyAvailable,
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Valid(claims) => Some(claims),
            _ => None,
        }
    }

    pub fn into_claims(self) -> Option<Claims> {
        match self {
            Self::Valid(claims) => Some(claims),
            _ => None,
        }
    }

    /// How much a failed outcome tells us. Failures after a verified signature
    /// outrank parse failures, which outrank plain signature mismatches.
    pub(crate) fn failure_rank(&self) -> u8 {
        match self {
            Self::Valid(_) => 4,
            Self::Expired | Self::SubjectMismatch => 3,
            Self::Malformed => 2,
            Self::SignatureInvalid => 1,
            Self::NoKeyAvailable => 0,
        }
    }
}
