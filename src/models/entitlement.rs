// src/models/entitlement.rs
//! Entitlement catalogue and resolution results.
//!
//! The catalogue of recognised features lives in [`Feature`]. Each feature's
//! fallback value comes from an exhaustive match, so adding a feature without
//! a default fails to compile. [`EntitlementDefaults`] is the immutable table
//! handed to the resolver; lookups against it are total.

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Plan name reported when a vendor has no active subscription.
pub const FREE_PLAN_NAME: &str = "Free Plan";

/// One mebibyte, in bytes.
pub const MIB: i64 = 1024 * 1024;

/// Features the platform recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Analytics,
    CustomDomain,
    AdvancedFeatures,
    EmailSupport,
    PrioritySupport,
    MaxProducts,
    MaxOrders,
    MaxCategories,
    StorageLimit,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::Analytics,
        Feature::CustomDomain,
        Feature::AdvancedFeatures,
        Feature::EmailSupport,
        Feature::PrioritySupport,
        Feature::MaxProducts,
        Feature::MaxOrders,
        Feature::MaxCategories,
        Feature::StorageLimit,
    ];

    /// Name used in plan feature documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Analytics => "analytics",
            Feature::CustomDomain => "customDomain",
            Feature::AdvancedFeatures => "advancedFeatures",
            Feature::EmailSupport => "emailSupport",
            Feature::PrioritySupport => "prioritySupport",
            Feature::MaxProducts => "maxProducts",
            Feature::MaxOrders => "maxOrders",
            Feature::MaxCategories => "maxCategories",
            Feature::StorageLimit => "storageLimit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|feature| feature.as_str() == name)
    }

    /// Value used when no active plan supplies one.
    pub fn builtin_default(&self) -> FeatureDefault {
        match self {
            Feature::Analytics
            | Feature::CustomDomain
            | Feature::AdvancedFeatures
            | Feature::EmailSupport
            | Feature::PrioritySupport => FeatureDefault::Flag(false),
            Feature::MaxProducts => FeatureDefault::Limit(10),
            Feature::MaxOrders => FeatureDefault::Limit(50),
            Feature::MaxCategories => FeatureDefault::Limit(5),
            Feature::StorageLimit => FeatureDefault::Quota(100 * MIB),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a feature's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Boolean on/off entitlement.
    Flag,
    /// 32-bit count limit.
    Limit,
    /// 64-bit quota, e.g. bytes of storage.
    Quota,
}

/// A typed default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureDefault {
    Flag(bool),
    Limit(i32),
    Quota(i64),
}

impl FeatureDefault {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureDefault::Flag(_) => FeatureKind::Flag,
            FeatureDefault::Limit(_) => FeatureKind::Limit,
            FeatureDefault::Quota(_) => FeatureKind::Quota,
        }
    }
}

static BUILTIN_DEFAULTS: Lazy<Arc<EntitlementDefaults>> = Lazy::new(|| {
    let entries = Feature::ALL
        .iter()
        .map(|feature| (feature.as_str().to_string(), feature.builtin_default()))
        .collect();
    Arc::new(EntitlementDefaults { entries })
});

/// Immutable feature name → default table.
///
/// Names missing from the table, or present with another kind, resolve to
/// `false` / `0`, so every lookup has an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementDefaults {
    entries: BTreeMap<String, FeatureDefault>,
}

impl EntitlementDefaults {
    /// The platform's built-in table, shared process-wide.
    pub fn builtin() -> Arc<Self> {
        Arc::clone(&BUILTIN_DEFAULTS)
    }

    /// A copy of this table with `overrides` replacing or adding entries.
    /// The result is not validated.
    pub fn with_overrides<I>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, FeatureDefault)>,
    {
        let mut entries = self.entries.clone();
        entries.extend(overrides);
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<FeatureDefault> {
        self.entries.get(name).copied()
    }

    /// Default for a boolean query.
    pub fn flag(&self, name: &str) -> bool {
        match self.get(name) {
            Some(FeatureDefault::Flag(value)) => value,
            _ => false,
        }
    }

    /// Default for an integer query.
    pub fn limit(&self, name: &str) -> i32 {
        match self.get(name) {
            Some(FeatureDefault::Limit(value)) => value,
            _ => 0,
        }
    }

    /// Default for a long query.
    pub fn quota(&self, name: &str) -> i64 {
        match self.get(name) {
            Some(FeatureDefault::Quota(value)) => value,
            _ => 0,
        }
    }

    /// Every entry, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureDefault)> {
        self.entries.iter().map(|(name, default)| (name.as_str(), *default))
    }

    /// Checks the table at startup: every recognised feature present with
    /// its declared kind, and no negative numeric default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for feature in Feature::ALL {
            let expected = feature.builtin_default().kind();
            match self.get(feature.as_str()) {
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "no default for feature '{}'",
                        feature
                    )))
                }
                Some(found) if found.kind() != expected => {
                    return Err(ConfigError::Invalid(format!(
                        "default for '{}' is {:?}, expected {:?}",
                        feature,
                        found.kind(),
                        expected
                    )))
                }
                Some(_) => {}
            }
        }
        for (name, default) in &self.entries {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("empty feature name in defaults".into()));
            }
            let negative = match default {
                FeatureDefault::Flag(_) => false,
                FeatureDefault::Limit(value) => *value < 0,
                FeatureDefault::Quota(value) => *value < 0,
            };
            if negative {
                return Err(ConfigError::Invalid(format!("negative default for '{}'", name)));
            }
        }
        Ok(())
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Read from the active plan's feature document.
    Plan,
    /// Substituted from the default table.
    Default,
}

/// A resolved entitlement value with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntitlementDecision<T> {
    pub value: T,
    pub source: DecisionSource,
}

impl<T> EntitlementDecision<T> {
    pub fn from_plan(value: T) -> Self {
        Self {
            value,
            source: DecisionSource::Plan,
        }
    }

    pub fn from_default(value: T) -> Self {
        Self {
            value,
            source: DecisionSource::Default,
        }
    }
}

/// Every recognised feature resolved for one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementSummary {
    pub plan_name: String,
    pub active: bool,
    pub flags: BTreeMap<String, bool>,
    pub limits: BTreeMap<String, i64>,
}
