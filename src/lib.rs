// src/lib.rs

//! # Vendor Access Core
//!
//! Access-control core for a multi-tenant commerce platform.
//!
//! ## Architecture Overview
//! 1. **Keys Layer**: `KeyMaterialProvider` snapshots and the rotating `KeyRing`
//! 2. **Services Layer**: `TokenService` (credential issuance/verification) and
//!    `EntitlementResolver` (plan-based feature gating)
//! 3. **Storage Layer**: `SubscriptionStore` contract and an in-memory store
//! 4. **Configuration**: immutable `CoreConfig` loaded once at startup
//!
//! Authentication middleware calls `TokenService` to establish the vendor
//! identity; handlers then gate actions through `EntitlementResolver`. The two
//! services never call each other.

pub mod config;
pub mod error;
pub mod keys;        // Signing key material and rotation
pub mod models;      // Data structures
pub mod services;    // Token and entitlement logic
pub mod storage;     // Subscription storage
pub mod utils;       // Helper functions

pub use crate::config::{CoreConfig, TokenConfig};
pub use error::{ConfigError, EntitlementError, KeyError, StoreError, TokenError};
pub use keys::key_material::{KeyMaterialProvider, KeySet};
pub use keys::key_ring::KeyRing;
pub use models::claims::{Claims, Credential, UnverifiedKeyId, VerificationOutcome};
pub use models::entitlement::{EntitlementDecision, EntitlementDefaults, EntitlementSummary, Feature};
pub use models::signing_key::{KeyRole, Secret, SigningKey};
pub use models::subscription::{Plan, Subscription, SubscriptionStatus};
pub use services::entitlement_resolver::EntitlementResolver;
pub use services::token_service::TokenService;
pub use storage::subscription_store::{InMemorySubscriptionStore, SubscriptionStore};
