// src/services/token_service.rs
//! Credential issuance and verification service.
//!
//! Credentials are HMAC-signed JWTs whose header names the signing key (`kid`).
//! Verification runs in two phases:
//! 1. Peek at the unverified `kid` and, if that key is valid for
//!    verification, try it alone.
//! 2. Otherwise, or if that attempt fails, try every key valid for
//!    verification, most recently activated first.
//!
//! Phase 2 keeps credentials signed by a rotated-out key working until they
//! expire or the key's grace period ends, even when the `kid` is wrong or absent.

use crate::config::TokenConfig;
use crate::error::{TokenError, TokenResult};
use crate::keys::key_material::{KeyMaterialProvider, KeySet};
use crate::models::claims::{Claims, Credential, UnverifiedKeyId, VerificationOutcome};
use crate::models::signing_key::{is_secret_algorithm, SigningKey};
use crate::utils::serialization::{decode_segment, split_segments};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Extra claim marking a refresh token.
pub const TOKEN_USE_CLAIM: &str = "token_use";

/// Header fields read by [`TokenService::peek_key_id`].
#[derive(Deserialize)]
struct PeekedHeader {
    kid: Option<String>,
}

/// Issues and verifies vendor credentials.
///
/// Stateless apart from its immutable configuration: every call takes one
/// key-set snapshot and one timestamp, and nothing is cached between calls.
pub struct TokenService {
    /// Source of signing and verification keys
    keys: Arc<dyn KeyMaterialProvider>,
    /// Issuance TTLs and the fallback algorithm
    config: TokenConfig,
}

impl TokenService {
    /// Creates a new TokenService.
    ///
    /// # Arguments
    /// * `keys` - Provider of key-set snapshots
    /// * `config` - Validated token settings
    pub fn new(keys: Arc<dyn KeyMaterialProvider>, config: TokenConfig) -> Self {
        Self { keys, config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issues a credential for `subject` that expires `ttl` from now.
    ///
    /// # Errors
    /// - `NoSigningKey` if the key set has no current signing key
    /// - `InvalidTtl` if `ttl` is not positive
    pub fn issue(&self, subject: &str, extra_claims: Map<String, Value>, ttl: Duration) -> TokenResult<Credential> {
        self.issue_at(subject, extra_claims, ttl, Utc::now())
    }

    /// Issues a credential as of `now`.
    ///
    /// # Process Flow
    /// 1. Takes a key-set snapshot and its current signing key
    /// 2. Builds claims `{sub, iat: now, exp: now + ttl, ...extra}`
    /// 3. Builds header `{alg, kid}` from the signing key
    /// 4. Signs with the key's secret under its algorithm
    pub fn issue_at(
        &self,
        subject: &str,
        extra_claims: Map<String, Value>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> TokenResult<Credential> {
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidTtl);
        }

        let keys = self.keys.snapshot();
        let key = keys.current_signing_key().ok_or(TokenError::NoSigningKey)?;
        let secret = keys
            .secret_material(key)
            .ok_or_else(|| TokenError::MissingSecret(key.kid.clone()))?;
        let algorithm = key.effective_algorithm(self.config.default_algorithm);
        if !is_secret_algorithm(algorithm) {
            return Err(TokenError::UnsupportedAlgorithm(format!("{:?}", algorithm)));
        }

        let expires_at = now.checked_add_signed(ttl).ok_or(TokenError::InvalidTtl)?;

        let mut header = Header::new(algorithm);
        header.kid = Some(key.kid.clone());
        let claims = Claims::new(subject, now.timestamp(), expires_at.timestamp(), extra_claims);

        let token = encode(&header, &claims, &EncodingKey::from_secret(secret.as_bytes()))?;
        log::debug!("issued credential for {} with key {} (exp {})", subject, key.kid, claims.exp);
        Ok(Credential::new(token))
    }

    /// Issues a short-lived access credential using the configured TTL.
    pub fn issue_access_token(&self, subject: &str, extra_claims: Map<String, Value>) -> TokenResult<Credential> {
        self.issue(subject, extra_claims, self.config.access_token_ttl)
    }

    /// Issues a refresh credential using the configured TTL.
    pub fn issue_refresh_token(&self, subject: &str) -> TokenResult<Credential> {
        let mut extra = Map::new();
        extra.insert(TOKEN_USE_CLAIM.to_string(), Value::from("refresh"));
        self.issue(subject, extra, self.config.refresh_token_ttl)
    }

    /// Reads the `kid` from a credential's header.
    ///
    /// Performs **no** signature verification. The result only picks which
    /// key to try first and must never be treated as authenticated.
    ///
    /// # Returns
    /// `None` unless the credential has exactly three segments and a header
    /// that decodes to JSON with a string `kid`
    pub fn peek_key_id(credential: &str) -> Option<UnverifiedKeyId> {
        let [header, _, _] = split_segments(credential)?;
        let header: PeekedHeader = decode_segment(header).ok()?;
        header.kid.map(UnverifiedKeyId::new)
    }

    /// Returns true iff the credential is authentic, unexpired and bound to
    /// `expected_subject`. Never fails.
    pub fn verify(&self, credential: &str, expected_subject: &str) -> bool {
        self.verify_at(credential, expected_subject, Utc::now())
    }

    pub fn verify_at(&self, credential: &str, expected_subject: &str, now: DateTime<Utc>) -> bool {
        self.check_at(credential, expected_subject, now).is_valid()
    }

    /// Like [`verify`](Self::verify), but reports why a credential was rejected.
    pub fn check(&self, credential: &str, expected_subject: &str) -> VerificationOutcome {
        self.check_at(credential, expected_subject, Utc::now())
    }

    pub fn check_at(&self, credential: &str, expected_subject: &str, now: DateTime<Utc>) -> VerificationOutcome {
        self.evaluate(credential, Some(expected_subject), now)
    }

    /// Verifies a credential without an expected subject and returns its
    /// authenticated claims, so middleware can learn the vendor id.
    pub fn authenticate(&self, credential: &str) -> VerificationOutcome {
        self.authenticate_at(credential, Utc::now())
    }

    pub fn authenticate_at(&self, credential: &str, now: DateTime<Utc>) -> VerificationOutcome {
        self.evaluate(credential, None, now)
    }

    fn evaluate(&self, credential: &str, expected_subject: Option<&str>, now: DateTime<Utc>) -> VerificationOutcome {
        if split_segments(credential).is_none() {
            log::debug!("rejected credential: not three segments");
            return VerificationOutcome::Malformed;
        }

        let keys = self.keys.snapshot();
        let mut best = VerificationOutcome::NoKeyAvailable;
        let mut tried: Option<&str> = None;

        if let Some(kid) = Self::peek_key_id(credential) {
            match keys.key_by_kid(kid.as_str()) {
                Some(key) if keys.is_valid_for_verification(key, now) => {
                    let outcome = self.attempt(&keys, key, credential, expected_subject, now);
                    if outcome.is_valid() {
                        return outcome;
                    }
                    tried = Some(key.kid.as_str());
                    best = outcome;
                }
                Some(_) => log::debug!("key {} is not valid for verification, falling back", kid.as_str()),
                None => log::debug!("unknown key {}, falling back", kid.as_str()),
            }
        }

        for key in keys.valid_verification_keys(now) {
            if tried == Some(key.kid.as_str()) {
                continue;
            }
            let outcome = self.attempt(&keys, key, credential, expected_subject, now);
            if outcome.is_valid() {
                return outcome;
            }
            if outcome.failure_rank() > best.failure_rank() {
                best = outcome;
            }
        }

        log::debug!("rejected credential: {:?}", best);
        best
    }

    /// Full verification under a single candidate key. Errors become the
    /// candidate's failure outcome.
    fn attempt(
        &self,
        keys: &KeySet,
        key: &SigningKey,
        credential: &str,
        expected_subject: Option<&str>,
        now: DateTime<Utc>,
    ) -> VerificationOutcome {
        let secret = match keys.secret_material(key) {
            Some(secret) => secret,
            None => {
                log::debug!("candidate {} has no secret material", key.kid);
                return VerificationOutcome::NoKeyAvailable;
            }
        };

        // Expiry is checked below against the captured `now`.
        let mut validation = Validation::new(key.effective_algorithm(self.config.default_algorithm));
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        let claims = match decode::<Claims>(credential, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
            Ok(data) => data.claims,
            Err(err) => {
                log::debug!("candidate {} rejected credential: {}", key.kid, err);
                return classify(err.kind());
            }
        };

        if claims.is_expired_at(now.timestamp()) {
            return VerificationOutcome::Expired;
        }
        if let Some(expected) = expected_subject {
            if claims.sub != expected {
                return VerificationOutcome::SubjectMismatch;
            }
        }
        VerificationOutcome::Valid(claims)
    }
}

fn classify(kind: &ErrorKind) -> VerificationOutcome {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => VerificationOutcome::SignatureInvalid,
        ErrorKind::ExpiredSignature => VerificationOutcome::Expired,
        _ => VerificationOutcome::Malformed,
    }
}
