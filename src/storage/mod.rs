// src/storage/mod.rs
//! Subscription storage layer.

pub mod subscription_store;
