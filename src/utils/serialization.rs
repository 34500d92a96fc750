// src/utils/serialization.rs
//! Serialization utilities for compact credentials.
//!
//! Credential segments are JSON documents encoded as unpadded base64url.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Splits a compact credential into its three segments.
///
/// # Returns
/// - `Some([header, payload, signature])` if there are exactly three dot-separated parts
/// - `None` otherwise
pub fn split_segments(credential: &str) -> Option<[&str; 3]> {
    let mut parts = credential.split('.');
    let header = parts.next()?;
    let payload = parts.next()?;
    let signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some([header, payload, signature])
}

/// Serializes a value to JSON and encodes it as an unpadded base64url segment.
///
/// # Returns
/// - `Ok(String)` with the encoded segment on success
/// - `Err(serde_json::Error)` if serialization fails
pub fn encode_segment<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(data)?;
    Ok(base64::encode_config(json, base64::URL_SAFE_NO_PAD))
}

/// Decodes an unpadded base64url segment and deserializes its JSON.
///
/// # Returns
/// Deserialized value, or a description of which step failed
pub fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, String> {
    let bytes = base64::decode_config(segment, base64::URL_SAFE_NO_PAD)
        .map_err(|e| format!("Base64 decoding failed: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("JSON decoding failed: {}", e))
}
