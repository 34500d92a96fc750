// src/main.rs

//! # Vendor Access Core - Demo Entry Point
//!
//! Wires the access-control core together with in-memory collaborators and
//! walks through a key rotation.
//!
//! ## Environment Variables (all optional)
//! - `RUST_LOG`: log filter (default `info`)
//! - `VENDOR_ACCESS_ACCESS_TOKEN_TTL_SECS`: access credential lifetime
//! - `VENDOR_ACCESS_REFRESH_TOKEN_TTL_SECS`: refresh credential lifetime
//! - `VENDOR_ACCESS_DEFAULT_ALGORITHM`: HS256, HS384 or HS512
//! - `VENDOR_ACCESS_KEY_GRACE_PERIOD_SECS`: verify-only window after rotation
//! - `VENDOR_ACCESS_ENTITLEMENT_DEFAULTS__<FEATURE>`: override a default entitlement

use anyhow::Context;
use chrono::{Duration, Utc};
use dotenv::dotenv;
use serde_json::{json, Map};
use std::sync::Arc;
use vendor_access_core::{
    CoreConfig, EntitlementResolver, InMemorySubscriptionStore, KeyRing, Plan, Subscription, SubscriptionStatus,
    TokenService,
};

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load `.env` and configure logging
/// 2. Load and validate configuration
/// 3. Build the key ring and subscription store
/// 4. Issue, rotate, verify and resolve entitlements
fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = CoreConfig::load().context("failed to load configuration")?;
    let now = Utc::now();

    let key_ring = Arc::new(
        KeyRing::generate(config.token.default_algorithm, now).context("failed to generate signing key")?,
    );
    let tokens = TokenService::new(key_ring.clone(), config.token.clone());

    let store = Arc::new(InMemorySubscriptionStore::new());
    store.insert(Subscription {
        vendor_id: "vendor-demo".into(),
        plan: Plan {
            id: "growth".into(),
            name: "Growth".into(),
            features: json!({"maxProducts": 25, "analytics": true}),
        },
        status: SubscriptionStatus::Active,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(30),
    });
    let entitlements = EntitlementResolver::new(store, config.entitlements.clone());

    let access = tokens.issue_access_token("vendor-demo", Map::new())?;
    log::info!("issued access credential with key {:?}", TokenService::peek_key_id(access.as_str()));
    log::info!("verifies before rotation: {}", tokens.verify(access.as_str(), "vendor-demo"));

    let rotated = key_ring.rotate_generated(config.token.default_algorithm, Utc::now(), config.token.key_grace_period)?;
    log::info!("rotated to key {}", rotated.kid);
    log::info!("verifies after rotation: {}", tokens.verify(access.as_str(), "vendor-demo"));
    log::info!("wrong subject rejected: {:?}", tokens.check(access.as_str(), "vendor-other"));

    let summary = entitlements.summary("vendor-demo");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    match entitlements.enforce_product_limit("vendor-demo", 25) {
        Ok(()) => log::info!("product creation allowed"),
        Err(err) => log::info!("product creation blocked: {}", err),
    }
    match entitlements.enforce_feature_access("vendor-demo", "customDomain") {
        Ok(()) => log::info!("custom domain allowed"),
        Err(err) => log::info!("upgrade required: {}", err),
    }

    Ok(())
}
