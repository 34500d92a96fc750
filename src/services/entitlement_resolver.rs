// src/services/entitlement_resolver.rs
//! Plan entitlement resolution and enforcement.
//!
//! Resolution is total: a value comes from the vendor's active plan when the
//! plan supplies one of the right shape, and from the default table in every
//! other case, including store outages and malformed plan documents. Those
//! failures are logged and never reach the caller.
//!
//! Only the `enforce_*` operations return errors, and only to say no.

use crate::error::{EntitlementError, EntitlementResult, StoreError};
use crate::models::entitlement::{
    EntitlementDecision, EntitlementDefaults, EntitlementSummary, Feature, FeatureDefault, FeatureKind, FREE_PLAN_NAME,
};
use crate::models::subscription::Subscription;
use crate::storage::subscription_store::SubscriptionStore;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Failures recovered inside the resolver by substituting a default.
#[derive(Debug, Error)]
enum ResolutionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("plan {plan_id} has a feature document that is not an object")]
    MalformedDocument { plan_id: String },
}

/// Resolves and enforces vendor entitlements.
///
/// Stateless: each call performs one store read and recomputes subscription
/// activity against a single captured timestamp.
pub struct EntitlementResolver {
    /// Source of active subscriptions
    store: Arc<dyn SubscriptionStore>,
    /// Values used whenever the plan can't supply one
    defaults: Arc<EntitlementDefaults>,
}

impl EntitlementResolver {
    /// Creates a new EntitlementResolver.
    ///
    /// # Arguments
    /// * `store` - Subscription source
    /// * `defaults` - Validated default table, usually [`EntitlementDefaults::builtin`]
    pub fn new(store: Arc<dyn SubscriptionStore>, defaults: Arc<EntitlementDefaults>) -> Self {
        Self { store, defaults }
    }

    /// Returns true if the vendor's plan enables the named boolean feature.
    pub fn has_feature(&self, vendor_id: &str, name: &str) -> bool {
        self.resolve_flag(vendor_id, name).value
    }

    /// Returns the named integer limit for the vendor.
    pub fn limit(&self, vendor_id: &str, name: &str) -> i32 {
        self.resolve_limit(vendor_id, name).value
    }

    /// Returns the named long limit (e.g. storage bytes) for the vendor.
    pub fn limit_long(&self, vendor_id: &str, name: &str) -> i64 {
        self.resolve_limit_long(vendor_id, name).value
    }

    pub fn resolve_flag(&self, vendor_id: &str, name: &str) -> EntitlementDecision<bool> {
        self.resolve(vendor_id, name, as_flag, self.defaults.flag(name))
    }

    pub fn resolve_limit(&self, vendor_id: &str, name: &str) -> EntitlementDecision<i32> {
        self.resolve(vendor_id, name, as_limit, self.defaults.limit(name))
    }

    pub fn resolve_limit_long(&self, vendor_id: &str, name: &str) -> EntitlementDecision<i64> {
        self.resolve(vendor_id, name, as_quota, self.defaults.quota(name))
    }

    /// Fails if `current_count` has already reached the product limit.
    pub fn enforce_product_limit(&self, vendor_id: &str, current_count: i64) -> EntitlementResult<()> {
        self.enforce_limit(vendor_id, Feature::MaxProducts, current_count)
    }

    /// Fails if `current_count` has already reached the order limit.
    pub fn enforce_order_limit(&self, vendor_id: &str, current_count: i64) -> EntitlementResult<()> {
        self.enforce_limit(vendor_id, Feature::MaxOrders, current_count)
    }

    /// Fails if `current_count` has already reached the category limit.
    pub fn enforce_category_limit(&self, vendor_id: &str, current_count: i64) -> EntitlementResult<()> {
        self.enforce_limit(vendor_id, Feature::MaxCategories, current_count)
    }

    /// Count rule: blocks once `current_count >= limit`, so reaching the
    /// limit already prevents the next creation.
    ///
    /// Quota features are read as longs; flags have no count and resolve to 0.
    pub fn enforce_limit(&self, vendor_id: &str, feature: Feature, current_count: i64) -> EntitlementResult<()> {
        let limit = match feature.builtin_default().kind() {
            FeatureKind::Quota => self.limit_long(vendor_id, feature.as_str()),
            FeatureKind::Limit | FeatureKind::Flag => i64::from(self.limit(vendor_id, feature.as_str())),
        };
        if current_count >= limit {
            return Err(EntitlementError::LimitExceeded {
                feature: feature.as_str().to_string(),
                limit,
                attempted: current_count,
            });
        }
        Ok(())
    }

    /// Storage rule: blocks only when `used + additional` would pass the
    /// limit. Landing exactly on the limit is allowed.
    pub fn enforce_storage_limit(&self, vendor_id: &str, used: i64, additional: i64) -> EntitlementResult<()> {
        let limit = self.limit_long(vendor_id, Feature::StorageLimit.as_str());
        let attempted = used.saturating_add(additional);
        if attempted > limit {
            return Err(EntitlementError::LimitExceeded {
                feature: Feature::StorageLimit.as_str().to_string(),
                limit,
                attempted,
            });
        }
        Ok(())
    }

    /// Fails with `FeatureUnavailable` unless the plan enables `name`.
    pub fn enforce_feature_access(&self, vendor_id: &str, name: &str) -> EntitlementResult<()> {
        if self.has_feature(vendor_id, name) {
            Ok(())
        } else {
            Err(EntitlementError::FeatureUnavailable(name.to_string()))
        }
    }

    /// The active plan's raw feature document, or `None` without an active subscription.
    pub fn current_plan_features(&self, vendor_id: &str) -> Option<Value> {
        self.active_subscription_or_none(vendor_id, "plan features", Utc::now())
            .map(|subscription| subscription.plan.features)
    }

    /// The active plan's name, or `"Free Plan"`.
    pub fn current_plan_name(&self, vendor_id: &str) -> String {
        self.active_subscription_or_none(vendor_id, "plan name", Utc::now())
            .map_or_else(|| FREE_PLAN_NAME.to_string(), |subscription| subscription.plan.name)
    }

    pub fn is_subscription_active(&self, vendor_id: &str) -> bool {
        self.active_subscription_or_none(vendor_id, "subscription status", Utc::now())
            .is_some()
    }

    /// Resolves every feature in the default table from a single store read.
    pub fn summary(&self, vendor_id: &str) -> EntitlementSummary {
        let subscription = self.active_subscription_or_none(vendor_id, "all features", Utc::now());
        let subscription = subscription.as_ref();

        let mut flags = BTreeMap::new();
        let mut limits = BTreeMap::new();
        for (name, default) in self.defaults.iter() {
            match default {
                FeatureDefault::Flag(value) => {
                    let decision = self.decide(vendor_id, subscription, name, as_flag, value);
                    flags.insert(name.to_string(), decision.value);
                }
                FeatureDefault::Limit(value) => {
                    let decision = self.decide(vendor_id, subscription, name, as_limit, value);
                    limits.insert(name.to_string(), i64::from(decision.value));
                }
                FeatureDefault::Quota(value) => {
                    let decision = self.decide(vendor_id, subscription, name, as_quota, value);
                    limits.insert(name.to_string(), decision.value);
                }
            }
        }

        EntitlementSummary {
            plan_name: subscription.map_or_else(|| FREE_PLAN_NAME.to_string(), |s| s.plan.name.clone()),
            active: subscription.is_some(),
            flags,
            limits,
        }
    }

    fn resolve<T: Copy + Debug>(
        &self,
        vendor_id: &str,
        name: &str,
        extract: fn(&Value) -> Option<T>,
        default: T,
    ) -> EntitlementDecision<T> {
        let subscription = self.active_subscription_or_none(vendor_id, name, Utc::now());
        self.decide(vendor_id, subscription.as_ref(), name, extract, default)
    }

    fn decide<T: Copy + Debug>(
        &self,
        vendor_id: &str,
        subscription: Option<&Subscription>,
        name: &str,
        extract: fn(&Value) -> Option<T>,
        default: T,
    ) -> EntitlementDecision<T> {
        let subscription = match subscription {
            Some(subscription) => subscription,
            None => return EntitlementDecision::from_default(default),
        };
        match feature_value(subscription, name) {
            Ok(Some(value)) => match extract(value) {
                Some(resolved) => EntitlementDecision::from_plan(resolved),
                None => {
                    log::debug!(
                        "plan {} value for '{}' has the wrong shape ({}); using default {:?}",
                        subscription.plan_id(),
                        name,
                        value,
                        default
                    );
                    EntitlementDecision::from_default(default)
                }
            },
            Ok(None) => EntitlementDecision::from_default(default),
            Err(err) => {
                log::warn!("{}; using default {:?}", fallback_warning(vendor_id, name, &err), default);
                EntitlementDecision::from_default(default)
            }
        }
    }

    /// Store read with activity recomputed here. Store failures are logged
    /// against `resolving` and treated as "no active subscription".
    fn active_subscription_or_none(&self, vendor_id: &str, resolving: &str, now: DateTime<Utc>) -> Option<Subscription> {
        match self.active_subscription(vendor_id, now) {
            Ok(subscription) => subscription,
            Err(err) => {
                log::warn!("{}; using defaults", fallback_warning(vendor_id, resolving, &err));
                None
            }
        }
    }

    fn active_subscription(&self, vendor_id: &str, now: DateTime<Utc>) -> Result<Option<Subscription>, ResolutionError> {
        let found = self.store.active_subscription(vendor_id, now)?;
        Ok(found.filter(|subscription| subscription.is_active_at(now)))
    }
}

fn fallback_warning(vendor_id: &str, resolving: &str, err: &ResolutionError) -> String {
    format!("resolving '{}' for vendor {}: {}", resolving, vendor_id, err)
}

/// Looks up a feature in the plan document. A null document has no features.
fn feature_value<'a>(subscription: &'a Subscription, name: &str) -> Result<Option<&'a Value>, ResolutionError> {
    match &subscription.plan.features {
        Value::Object(features) => Ok(features.get(name)),
        Value::Null => Ok(None),
        _ => Err(ResolutionError::MalformedDocument {
            plan_id: subscription.plan_id().to_string(),
        }),
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    value.as_bool()
}

fn as_limit(value: &Value) -> Option<i32> {
    value.as_i64().and_then(|n| i32::try_from(n).ok())
}

fn as_quota(value: &Value) -> Option<i64> {
    value.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entitlement::{DecisionSource, MIB};
    use crate::models::subscription::{Plan, SubscriptionStatus};
    use crate::storage::subscription_store::InMemorySubscriptionStore;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn subscription(vendor: &str, features: Value) -> Subscription {
        let now = Utc::now();
        Subscription {
            vendor_id: vendor.into(),
            plan: Plan {
                id: "growth".into(),
                name: "Growth".into(),
                features,
            },
            status: SubscriptionStatus::Active,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
        }
    }

    fn resolver_with(subscriptions: Vec<Subscription>) -> (EntitlementResolver, Arc<InMemorySubscriptionStore>) {
        let store = Arc::new(InMemorySubscriptionStore::new());
        for subscription in subscriptions {
            store.insert(subscription);
        }
        let resolver = EntitlementResolver::new(store.clone(), EntitlementDefaults::builtin());
        (resolver, store)
    }

    /// Returns its subscription regardless of status or dates.
    struct CarelessStore(Subscription);

    impl SubscriptionStore for CarelessStore {
        fn active_subscription(&self, _vendor_id: &str, _now: DateTime<Utc>) -> Result<Option<Subscription>, StoreError> {
            Ok(Some(self.0.clone()))
        }
    }

    #[test]
    fn test_defaults_without_subscription() {
        let (resolver, _) = resolver_with(vec![]);

        assert!(!resolver.has_feature("v1", "analytics"));
        assert_eq!(resolver.limit("v1", "maxProducts"), 10);
        assert_eq!(resolver.limit("v1", "maxOrders"), 50);
        assert_eq!(resolver.limit("v1", "maxCategories"), 5);
        assert_eq!(resolver.limit_long("v1", "storageLimit"), 100 * MIB);
        assert_eq!(resolver.limit("v1", "somethingElse"), 0);
        assert_eq!(resolver.current_plan_name("v1"), "Free Plan");
        assert!(!resolver.is_subscription_active("v1"));
        assert_eq!(resolver.current_plan_features("v1"), None);
    }

    #[test]
    fn test_plan_values_override_defaults() {
        let (resolver, _) = resolver_with(vec![subscription("v1", json!({"maxProducts": 25, "analytics": true}))]);

        assert!(resolver.has_feature("v1", "analytics"));
        assert_eq!(resolver.limit("v1", "maxProducts"), 25);
        assert_eq!(resolver.limit("v1", "maxCategories"), 5);
        assert_eq!(resolver.current_plan_name("v1"), "Growth");
        assert!(resolver.is_subscription_active("v1"));
        assert_eq!(
            resolver.current_plan_features("v1"),
            Some(json!({"maxProducts": 25, "analytics": true}))
        );
    }

    #[test]
    fn test_decisions_report_provenance() {
        let (resolver, _) = resolver_with(vec![subscription("v1", json!({"maxProducts": 25}))]);

        assert_eq!(resolver.resolve_limit("v1", "maxProducts"), EntitlementDecision::from_plan(25));
        assert_eq!(resolver.resolve_limit("v1", "maxOrders"), EntitlementDecision::from_default(50));
        assert_eq!(resolver.resolve_flag("v2", "analytics").source, DecisionSource::Default);
    }

    #[test]
    fn test_wrong_shape_falls_back() {
        let (resolver, _) = resolver_with(vec![subscription(
            "v1",
            json!({
                "analytics": "yes",
                "maxProducts": true,
                "maxOrders": 12.5,
                "maxCategories": 5_000_000_000i64,
                "storageLimit": "lots",
                "customDomain": 1
            }),
        )]);

        assert!(!resolver.has_feature("v1", "analytics"));
        assert!(!resolver.has_feature("v1", "customDomain"));
        assert_eq!(resolver.limit("v1", "maxProducts"), 10);
        assert_eq!(resolver.limit("v1", "maxOrders"), 50);
        assert_eq!(resolver.limit("v1", "maxCategories"), 5);
        assert_eq!(resolver.limit_long("v1", "storageLimit"), 100 * MIB);
    }

    #[test]
    fn test_long_limit_accepts_large_values() {
        let (resolver, _) = resolver_with(vec![subscription("v1", json!({"storageLimit": 10_737_418_240i64}))]);
        assert_eq!(resolver.limit_long("v1", "storageLimit"), 10 * 1024 * MIB);
    }

    #[test]
    fn test_malformed_document_falls_back() {
        let (resolver, _) = resolver_with(vec![subscription("v1", json!(["maxProducts", 25]))]);

        assert_eq!(resolver.limit("v1", "maxProducts"), 10);
        assert!(!resolver.has_feature("v1", "analytics"));
        assert_eq!(resolver.current_plan_name("v1"), "Growth");
    }

    #[test]
    fn test_store_outage_falls_back() {
        let (resolver, store) = resolver_with(vec![subscription("v1", json!({"maxProducts": 25, "analytics": true}))]);
        store.set_unavailable(true);

        assert_eq!(resolver.limit("v1", "maxProducts"), 10);
        assert!(!resolver.has_feature("v1", "analytics"));
        assert_eq!(resolver.current_plan_name("v1"), "Free Plan");
        assert!(!resolver.is_subscription_active("v1"));
        assert_eq!(resolver.current_plan_features("v1"), None);

        store.set_unavailable(false);
        assert_eq!(resolver.limit("v1", "maxProducts"), 25);
    }

    #[test]
    fn test_fallback_warning_names_vendor_and_feature() {
        let store_failure = ResolutionError::from(StoreError::Unavailable("connection refused".into()));
        let message = fallback_warning("v1", "maxProducts", &store_failure);
        assert!(message.contains("v1"), "{}", message);
        assert!(message.contains("maxProducts"), "{}", message);
        assert!(message.contains("connection refused"), "{}", message);

        let malformed = ResolutionError::MalformedDocument { plan_id: "growth".into() };
        let message = fallback_warning("v2", "analytics", &malformed);
        assert!(message.contains("v2") && message.contains("analytics") && message.contains("growth"));
    }

    #[test]
    fn test_activity_is_recomputed() {
        let mut lapsed = subscription("v1", json!({"maxProducts": 99}));
        lapsed.end_date = Utc::now() - Duration::hours(1);
        let resolver = EntitlementResolver::new(Arc::new(CarelessStore(lapsed)), EntitlementDefaults::builtin());
        assert_eq!(resolver.limit("v1", "maxProducts"), 10);
        assert!(!resolver.is_subscription_active("v1"));

        let mut cancelled = subscription("v1", json!({"maxProducts": 99}));
        cancelled.status = SubscriptionStatus::Cancelled;
        let resolver = EntitlementResolver::new(Arc::new(CarelessStore(cancelled)), EntitlementDefaults::builtin());
        assert_eq!(resolver.current_plan_name("v1"), "Free Plan");
    }

    #[test]
    fn test_count_limits_block_at_limit() {
        let (resolver, _) = resolver_with(vec![]);

        assert!(resolver.enforce_product_limit("v1", 9).is_ok());
        assert_eq!(
            resolver.enforce_product_limit("v1", 10),
            Err(EntitlementError::LimitExceeded {
                feature: "maxProducts".into(),
                limit: 10,
                attempted: 10
            })
        );
        assert!(resolver.enforce_order_limit("v1", 49).is_ok());
        assert!(resolver.enforce_order_limit("v1", 50).is_err());
        assert!(resolver.enforce_category_limit("v1", 4).is_ok());
        assert!(resolver.enforce_category_limit("v1", 5).is_err());
    }

    #[test]
    fn test_count_limits_follow_plan() {
        let (resolver, _) = resolver_with(vec![subscription("v1", json!({"maxProducts": 25}))]);
        assert!(resolver.enforce_product_limit("v1", 10).is_ok());
        assert!(resolver.enforce_product_limit("v1", 25).is_err());
    }

    #[test]
    fn test_storage_limit_allows_reaching_limit() {
        let (resolver, _) = resolver_with(vec![]);

        assert!(resolver.enforce_storage_limit("v1", 80 * MIB, 20 * MIB).is_ok());
        assert_eq!(
            resolver.enforce_storage_limit("v1", 90 * MIB, 20 * MIB),
            Err(EntitlementError::LimitExceeded {
                feature: "storageLimit".into(),
                limit: 100 * MIB,
                attempted: 110 * MIB
            })
        );
        assert!(resolver.enforce_storage_limit("v1", 100 * MIB, 1).is_err());
    }

    #[test]
    fn test_storage_overflow_counts_as_exceeded() {
        let (resolver, _) = resolver_with(vec![]);
        assert!(resolver.enforce_storage_limit("v1", i64::MAX, i64::MAX).is_err());
    }

    #[test]
    fn test_generic_enforce_limit_reads_quota_as_long() {
        let (resolver, _) = resolver_with(vec![]);
        assert!(resolver.enforce_limit("v1", Feature::StorageLimit, 100 * MIB - 1).is_ok());
        assert!(resolver.enforce_limit("v1", Feature::StorageLimit, 100 * MIB).is_err());
    }

    #[test]
    fn test_feature_access() {
        let (resolver, _) = resolver_with(vec![subscription("v1", json!({"analytics": true}))]);

        assert!(resolver.enforce_feature_access("v1", "analytics").is_ok());
        assert_eq!(
            resolver.enforce_feature_access("v1", "customDomain"),
            Err(EntitlementError::FeatureUnavailable("customDomain".into()))
        );
        assert!(resolver.enforce_feature_access("v2", "analytics").is_err());
    }

    #[test]
    fn test_summary_merges_plan_and_defaults() {
        let (resolver, _) = resolver_with(vec![subscription("v1", json!({"maxProducts": 25, "analytics": true}))]);

        let summary = resolver.summary("v1");
        assert_eq!(summary.plan_name, "Growth");
        assert!(summary.active);
        assert_eq!(summary.flags.get("analytics"), Some(&true));
        assert_eq!(summary.flags.get("prioritySupport"), Some(&false));
        assert_eq!(summary.limits.get("maxProducts"), Some(&25));
        assert_eq!(summary.limits.get("maxCategories"), Some(&5));
        assert_eq!(summary.limits.get("storageLimit"), Some(&(100 * MIB)));
        assert_eq!(summary.flags.len() + summary.limits.len(), Feature::ALL.len());

        let free = resolver.summary("nobody");
        assert_eq!(free.plan_name, "Free Plan");
        assert!(!free.active);
    }
}
