// src/config.rs
//! Startup configuration.
//!
//! Settings are read once with the `config` crate, validated, and frozen
//! into a [`CoreConfig`]. Services receive their part at construction and
//! never see it change.
//!
//! ## Sources (later wins)
//! 1. Built-in defaults
//! 2. Optional file `vendor-access.{toml,yaml,json}` in the working directory
//! 3. Environment variables prefixed with `VENDOR_ACCESS_`
//!    (e.g. `VENDOR_ACCESS_ACCESS_TOKEN_TTL_SECS=600`); nested keys use `__`
//!    (e.g. `VENDOR_ACCESS_ENTITLEMENT_DEFAULTS__MAXPRODUCTS=20`)
//!
//! The `entitlement_defaults` table overrides entries of the built-in default
//! table by feature name. Feature names match case-insensitively.

use crate::error::ConfigError;
use crate::models::entitlement::{EntitlementDefaults, Feature, FeatureDefault, FeatureKind};
use crate::models::signing_key::is_secret_algorithm;
use chrono::Duration;
use config::{Config, Environment, File};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

const ENV_PREFIX: &str = "VENDOR_ACCESS";
const CONFIG_FILE: &str = "vendor-access";

/// Raw settings as they appear in files and the environment.
#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
    access_token_ttl_secs: i64,
    refresh_token_ttl_secs: i64,
    default_algorithm: String,
    key_grace_period_secs: i64,
    #[serde(default)]
    entitlement_defaults: HashMap<String, RawDefault>,
}

/// An entitlement default as written in configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum RawDefault {
    Flag(bool),
    Number(i64),
}

/// Credential issuance settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Used for keys that don't declare an algorithm.
    pub default_algorithm: Algorithm,
    /// How long a demoted key stays valid for verification after rotation.
    pub key_grace_period: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
            default_algorithm: Algorithm::HS256,
            key_grace_period: Duration::days(1),
        }
    }
}

impl TokenConfig {
    fn from_raw(raw: &RawSettings) -> Result<Self, ConfigError> {
        let default_algorithm = Algorithm::from_str(raw.default_algorithm.trim()).map_err(|_| {
            ConfigError::Invalid(format!("unknown algorithm '{}'", raw.default_algorithm))
        })?;
        if !is_secret_algorithm(default_algorithm) {
            return Err(ConfigError::Invalid(format!(
                "default_algorithm must be HS256, HS384 or HS512, got {:?}",
                default_algorithm
            )));
        }

        let config = Self {
            access_token_ttl: seconds("access_token_ttl_secs", raw.access_token_ttl_secs)?,
            refresh_token_ttl: seconds("refresh_token_ttl_secs", raw.refresh_token_ttl_secs)?,
            default_algorithm,
            key_grace_period: seconds("key_grace_period_secs", raw.key_grace_period_secs)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects non-positive durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("access_token_ttl_secs", self.access_token_ttl),
            ("refresh_token_ttl_secs", self.refresh_token_ttl),
            ("key_grace_period_secs", self.key_grace_period),
        ];
        for (name, value) in durations {
            if value <= Duration::zero() {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

/// Everything both services need, fixed at startup.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub token: TokenConfig,
    pub entitlements: Arc<EntitlementDefaults>,
}

impl CoreConfig {
    /// Loads from the default sources and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::defaults_builder()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    /// Validates an already-built `config::Config`.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let raw: RawSettings = config.try_deserialize()?;
        let token = TokenConfig::from_raw(&raw)?;

        let entitlements = entitlement_defaults(&raw.entitlement_defaults)?;
        entitlements.validate()?;

        log::debug!(
            "loaded config: access ttl {}s, refresh ttl {}s, algorithm {:?}",
            token.access_token_ttl.num_seconds(),
            token.refresh_token_ttl.num_seconds(),
            token.default_algorithm
        );
        Ok(Self { token, entitlements })
    }

    /// A builder preloaded with the built-in defaults.
    pub fn defaults_builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = TokenConfig::default();
        Ok(Config::builder()
            .set_default("access_token_ttl_secs", defaults.access_token_ttl.num_seconds())?
            .set_default("refresh_token_ttl_secs", defaults.refresh_token_ttl.num_seconds())?
            .set_default("default_algorithm", "HS256")?
            .set_default("key_grace_period_secs", defaults.key_grace_period.num_seconds())?)
    }
}

fn seconds(name: &str, value: i64) -> Result<Duration, ConfigError> {
    Duration::try_seconds(value).ok_or_else(|| ConfigError::Invalid(format!("{} is out of range", name)))
}

/// Applies configured overrides on top of the built-in table.
///
/// A number becomes a quota for quota features and a limit otherwise, so a
/// number given for a flag feature fails validation as a kind mismatch.
fn entitlement_defaults(overrides: &HashMap<String, RawDefault>) -> Result<Arc<EntitlementDefaults>, ConfigError> {
    let builtin = EntitlementDefaults::builtin();
    if overrides.is_empty() {
        return Ok(builtin);
    }

    let mut entries = Vec::with_capacity(overrides.len());
    for (name, raw) in overrides {
        let feature = Feature::ALL
            .iter()
            .find(|feature| feature.as_str().eq_ignore_ascii_case(name));
        let name = feature.map_or_else(|| name.clone(), |feature| feature.as_str().to_string());
        let kind = feature.map(|feature| feature.builtin_default().kind());

        let value = match (*raw, kind) {
            (RawDefault::Flag(value), _) => FeatureDefault::Flag(value),
            (RawDefault::Number(value), Some(FeatureKind::Quota)) => FeatureDefault::Quota(value),
            (RawDefault::Number(value), _) => match i32::try_from(value) {
                Ok(limit) => FeatureDefault::Limit(limit),
                Err(_) if kind.is_none() => FeatureDefault::Quota(value),
                Err(_) => return Err(ConfigError::Invalid(format!("default for '{}' is out of range", name))),
            },
        };
        entries.push((name, value));
    }

    log::debug!("overriding {} entitlement defaults", entries.len());
    Ok(Arc::new(builtin.with_overrides(entries)))
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            entitlements: EntitlementDefaults::builtin(),
        }
    }
}
