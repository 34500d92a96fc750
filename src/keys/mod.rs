// src/keys/mod.rs
//! Signing key material: the provider contract and an in-memory rotating ring.

pub mod key_material;
pub mod key_ring;
