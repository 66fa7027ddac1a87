//! Serde helpers for the string-encoded payloads Harvester keeps in
//! annotations and secret data.

use crate::core::domain::error::{SyncError, SyncResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Reads a JSON document stored as the value of an annotation.
///
/// A missing annotation or a malformed payload yields `T::default()`, as
/// hand-edited resources frequently carry stale or truncated values.
pub fn json_annotation<T>(annotations: Option<&BTreeMap<String, String>>, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    annotations
        .and_then(|a| a.get(key))
        .and_then(|raw| match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(annotation = key, error = %e, "ignoring malformed annotation");
                None
            }
        })
        .unwrap_or_default()
}

/// Encodes `value` as compact JSON for storage in an annotation.
pub fn to_json_annotation<T: Serialize + ?Sized>(value: &T) -> SyncResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Base64 encoding of secret data values.
pub mod base64_data {
    use super::*;

    /// Encodes a UTF-8 string as standard base64.
    pub fn encode(value: &str) -> String {
        STANDARD.encode(value.as_bytes())
    }

    /// Decodes a standard base64 string into UTF-8 text.
    pub fn decode(value: &str) -> SyncResult<String> {
        let bytes = STANDARD
            .decode(value.trim())
            .map_err(|e| SyncError::Parse(format!("invalid base64 payload: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| SyncError::Parse(format!("payload is not UTF-8: {e}")))
    }
}
