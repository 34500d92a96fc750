// src/error.rs
//! Error types for the access-control core.
//!
//! Each concern gets its own enum so callers can match on exactly the
//! failures an operation can produce:
//! - [`TokenError`]: credential issuance
//! - [`KeyError`]: key-set construction and rotation
//! - [`EntitlementError`]: plan enforcement (the only errors the resolver surfaces)
//! - [`StoreError`]: subscription store implementations
//! - [`ConfigError`]: startup configuration

use thiserror::Error;

/// Errors raised while issuing a credential.
///
/// Verification never produces one of these; it reports a
/// [`VerificationOutcome`](crate::models::claims::VerificationOutcome) instead.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No key currently holds the signing role. Indicates a misconfigured deployment.
    #[error("no current signing key is configured")]
    NoSigningKey,

    /// The key set has no secret for the signing key.
    #[error("no secret material for signing key {0}")]
    MissingSecret(String),

    /// Credentials must live for a positive duration that fits a timestamp.
    #[error("token ttl must be positive and within timestamp range")]
    InvalidTtl,

    /// The key declares an algorithm that cannot be used with secret material.
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// JWT encoding failed.
    #[error("failed to encode credential: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// Errors raised while building or rotating a key set.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("duplicate key id: {0}")]
    DuplicateKid(String),

    #[error("more than one key holds the signing role ({0} and {1})")]
    MultipleSigningKeys(String, String),

    #[error("key {0} has empty secret material")]
    EmptySecret(String),

    #[error("unknown key id: {0}")]
    UnknownKid(String),

    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The system random source failed while generating key material.
    #[error("failed to generate random key material")]
    RandomFailure,
}

/// Errors surfaced by entitlement enforcement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntitlementError {
    /// The attempted value is not allowed under the resolved limit.
    #[error("{feature} limit of {limit} exceeded (attempted {attempted})")]
    LimitExceeded {
        feature: String,
        limit: i64,
        attempted: i64,
    },

    /// The vendor's plan does not include the feature.
    #[error("feature '{0}' is not available on the current plan")]
    FeatureUnavailable(String),
}

/// Errors returned by [`SubscriptionStore`](crate::storage::subscription_store::SubscriptionStore)
/// implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("subscription store unavailable: {0}")]
    Unavailable(String),

    #[error("subscription data is corrupt: {0}")]
    Corrupt(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for credential issuance.
pub type TokenResult<T> = Result<T, TokenError>;

/// Result type for entitlement enforcement.
pub type EntitlementResult<T> = Result<T, EntitlementError>;
