// src/models/subscription.rs
//! Subscription and plan data model.
//!
//! Both are read-only to this crate; persistence belongs to a
//! [`SubscriptionStore`](crate::storage::subscription_store::SubscriptionStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Billing state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
    Trial,
}

/// A named bundle of entitlements.
///
/// `features` maps feature names to booleans or integers, e.g.
/// `{"maxProducts": 25, "analytics": true}`. It is kept as raw JSON because
/// the document is owned elsewhere and may be malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub features: Value,
}

/// A vendor's time-bounded binding to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub vendor_id: String,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Subscription {
    pub fn plan_id(&self) -> &str {
        &self.plan.id
    }

    /// Active iff status is `ACTIVE` and `now` falls in `[start_date, end_date)`.
    ///
    /// Always computed from the inputs; there is no stored "is active" flag.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.start_date <= now && now < self.end_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn subscription(status: SubscriptionStatus, start: DateTime<Utc>, end: DateTime<Utc>) -> Subscription {
        Subscription {
            vendor_id: "vendor-1".into(),
            plan: Plan {
                id: "pro".into(),
                name: "Pro".into(),
                features: json!({}),
            },
            status,
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn test_active_window_is_half_open() {
        let start = Utc::now();
        let end = start + Duration::days(30);
        let sub = subscription(SubscriptionStatus::Active, start, end);

        assert!(!sub.is_active_at(start - Duration::seconds(1)));
        assert!(sub.is_active_at(start));
        assert!(sub.is_active_at(end - Duration::seconds(1)));
        assert!(!sub.is_active_at(end));
    }

    #[test]
    fn test_non_active_status_is_never_active() {
        let start = Utc::now() - Duration::days(1);
        let end = start + Duration::days(30);
        let now = Utc::now();
        for status in [SubscriptionStatus::Expired, SubscriptionStatus::Cancelled, SubscriptionStatus::Trial] {
            assert!(!subscription(status, start, end).is_active_at(now));
        }
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(SubscriptionStatus::Cancelled).unwrap(), json!("CANCELLED"));
        let parsed: SubscriptionStatus = serde_json::from_value(json!("TRIAL")).unwrap();
        assert_eq!(parsed, SubscriptionStatus::Trial);
    }
}
