// src/models/mod.rs
//! Data structures shared by the token and entitlement services.

pub mod claims;
pub mod entitlement;
pub mod signing_key;
pub mod subscription;
