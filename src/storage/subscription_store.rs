// src/storage/subscription_store.rs
//! Subscription storage contract and an in-memory implementation.
//!
//! The production store lives outside this crate. [`InMemorySubscriptionStore`]
//! backs the demo binary and the resolver tests, and can simulate an outage.

use crate::error::StoreError;
use crate::models::subscription::Subscription;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Source of vendor subscriptions.
pub trait SubscriptionStore: Send + Sync {
    /// Returns the vendor's subscription that is active at `now`, if any.
    fn active_subscription(&self, vendor_id: &str, now: DateTime<Utc>) -> Result<Option<Subscription>, StoreError>;
}

/// In-memory storage for subscriptions, keyed by vendor id.
///
/// # Note
/// For production use, back the trait with the platform database.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    /// All subscriptions ever recorded per vendor, in insertion order
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    /// When set, every read fails with `StoreError::Unavailable`
    unavailable: AtomicBool,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription. Earlier subscriptions for the vendor are kept.
    pub fn insert(&self, subscription: Subscription) {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        subscriptions
            .entry(subscription.vendor_id.clone())
            .or_default()
            .push(subscription);
    }

    /// Removes every subscription for a vendor.
    ///
    /// # Returns
    /// `true` if the vendor had any subscriptions
    pub fn remove_vendor(&self, vendor_id: &str) -> bool {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        subscriptions.remove(vendor_id).is_some()
    }

    /// Number of subscriptions recorded for a vendor.
    pub fn count_for(&self, vendor_id: &str) -> usize {
        let subscriptions = self.subscriptions.read().unwrap_or_else(PoisonError::into_inner);
        subscriptions.get(vendor_id).map_or(0, Vec::len)
    }

    /// Simulates the store going down (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    /// Picks the active subscription with the latest start date.
    fn active_subscription(&self, vendor_id: &str, now: DateTime<Utc>) -> Result<Option<Subscription>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".into()));
        }
        let subscriptions = self.subscriptions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(subscriptions.get(vendor_id).and_then(|list| {
            list.iter()
                .filter(|subscription| subscription.is_active_at(now))
                .max_by_key(|subscription| subscription.start_date)
                .cloned()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscription::{Plan, SubscriptionStatus};
    use chrono::Duration;
    use serde_json::json;

    fn subscription(vendor: &str, plan: &str, status: SubscriptionStatus, start: DateTime<Utc>) -> Subscription {
        Subscription {
            vendor_id: vendor.into(),
            plan: Plan {
                id: plan.into(),
                name: plan.into(),
                features: json!({}),
            },
            status,
            start_date: start,
            end_date: start + Duration::days(30),
        }
    }

    #[test]
    fn test_returns_latest_active_subscription() {
        let now = Utc::now();
        let store = InMemorySubscriptionStore::new();
        store.insert(subscription("v1", "basic", SubscriptionStatus::Active, now - Duration::days(20)));
        store.insert(subscription("v1", "pro", SubscriptionStatus::Active, now - Duration::days(2)));
        store.insert(subscription("v1", "old", SubscriptionStatus::Cancelled, now - Duration::days(1)));

        let active = store.active_subscription("v1", now).unwrap().unwrap();
        assert_eq!(active.plan_id(), "pro");
        assert_eq!(store.count_for("v1"), 3);
    }

    #[test]
    fn test_ignores_lapsed_subscriptions() {
        let now = Utc::now();
        let store = InMemorySubscriptionStore::new();
        store.insert(subscription("v1", "pro", SubscriptionStatus::Active, now - Duration::days(60)));

        assert!(store.active_subscription("v1", now).unwrap().is_none());
        assert!(store.active_subscription("unknown", now).unwrap().is_none());
    }

    #[test]
    fn test_unavailable_store_errors() {
        let store = InMemorySubscriptionStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.active_subscription("v1", Utc::now()), Err(StoreError::Unavailable(_))));

        store.set_unavailable(false);
        assert!(store.active_subscription("v1", Utc::now()).is_ok());
    }

    #[test]
    fn test_remove_vendor() {
        let store = InMemorySubscriptionStore::new();
        store.insert(subscription("v1", "pro", SubscriptionStatus::Active, Utc::now()));
        assert!(store.remove_vendor("v1"));
        assert!(!store.remove_vendor("v1"));
        assert_eq!(store.count_for("v1"), 0);
    }
}
