// src/services/mod.rs
//! Business logic: credential issuance/verification and entitlement checks.

pub mod entitlement_resolver;
pub mod token_service;
