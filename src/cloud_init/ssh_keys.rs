//! Keeping `ssh_authorized_keys` in step with the selected SSH key pairs.

use super::document::CloudConfigDocument;
use crate::core::domain::error::SyncResult;
use serde_yaml::Value;

pub const SSH_AUTHORIZED_KEYS: &str = "ssh_authorized_keys";

/// String values currently listed under `ssh_authorized_keys`.
pub fn authorized_keys(doc: &CloudConfigDocument) -> Vec<String> {
    doc.get(SSH_AUTHORIZED_KEYS)
        .and_then(Value::as_sequence)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Sets `ssh_authorized_keys` to the selected public keys followed by the
/// values already in the document, without duplicates. An empty result
/// removes the key unless it is protected.
pub fn merge_ssh_keys(doc: &mut CloudConfigDocument, selected: &[String]) -> SyncResult<()> {
    let existing = authorized_keys(doc);
    let mut merged: Vec<String> = Vec::with_capacity(selected.len() + existing.len());
    for key in selected.iter().chain(existing.iter()) {
        if !merged.contains(key) {
            merged.push(key.clone());
        }
    }

    if merged.is_empty() {
        if doc.get(SSH_AUTHORIZED_KEYS).is_some_and(Value::is_sequence) {
            doc.clear_sequence(SSH_AUTHORIZED_KEYS)?;
        }
        return Ok(());
    }
    doc.set(
        SSH_AUTHORIZED_KEYS,
        Value::Sequence(merged.into_iter().map(Value::String).collect()),
    )
}

/// Removes the given public key values from `ssh_authorized_keys`.
pub fn delete_ssh_keys(doc: &mut CloudConfigDocument, removed: &[String]) -> SyncResult<()> {
    if !doc.get(SSH_AUTHORIZED_KEYS).is_some_and(Value::is_sequence) {
        return Ok(());
    }
    let remaining: Vec<String> = authorized_keys(doc)
        .into_iter()
        .filter(|key| !removed.contains(key))
        .collect();
    if remaining.is_empty() {
        doc.clear_sequence(SSH_AUTHORIZED_KEYS)
    } else {
        doc.set(
            SSH_AUTHORIZED_KEYS,
            Value::Sequence(remaining.into_iter().map(Value::String).collect()),
        )
    }
}
