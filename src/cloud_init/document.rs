//! A line-oriented cloud-config editor that keeps comments and untouched
//! entries byte-for-byte.
//!
//! The document is first parsed with `serde_yaml` to make sure it is a
//! mapping, then split into top-level entries by scanning lines: a key starts
//! at column zero, indented lines and block-sequence items belong to the
//! entry above them, and blank or column-zero comment lines are attached as
//! the leading lines of the entry that follows. Only the entries that are
//! set or deleted are re-emitted; everything else is written back verbatim.

use crate::core::domain::error::{SyncError, SyncResult};
use serde_yaml::{Mapping, Value};

/// Comment that marks a cloud-init document, and a node that must survive
/// automated deletes when it sits right above it.
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    value: Value,
    /// Blank and comment lines directly above the key.
    leading: Vec<String>,
    /// The key line and its continuation lines.
    body: Vec<String>,
}

/// A top-level cloud-config mapping with its original formatting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudConfigDocument {
    entries: Vec<Entry>,
    trailing: Vec<String>,
}

impl CloudConfigDocument {
    /// Parses `text`. An empty or comment-only text is an empty document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Parse`] when the text is not valid YAML, is not a
    /// mapping, or uses a top-level layout the line scanner cannot follow
    /// (flow mappings, multiple documents).
    pub fn parse(text: &str) -> SyncResult<Self> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.iter().all(|line| is_detached(line)) {
            return Ok(Self {
                entries: Vec::new(),
                trailing: lines
                    .into_iter()
                    .filter(|l| !l.trim().is_empty())
                    .map(str::to_string)
                    .collect(),
            });
        }

        let mapping = match serde_yaml::from_str::<Value>(text) {
            Ok(Value::Mapping(mapping)) => mapping,
            Ok(Value::Null) => Mapping::new(),
            Ok(_) => {
                return Err(SyncError::Parse(
                    "cloud-config document is not a mapping".to_string(),
                ));
            }
            Err(e) => return Err(SyncError::Parse(e.to_string())),
        };

        let mut entries: Vec<Entry> = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for line in lines {
            if is_detached(line) {
                pending.push(line.to_string());
            } else if is_continuation(line) {
                let entry = entries.last_mut().ok_or_else(|| {
                    SyncError::Parse(format!("unexpected indented line before first key: {line:?}"))
                })?;
                entry.body.append(&mut pending);
                entry.body.push(line.to_string());
            } else {
                let key = key_of(line)
                    .ok_or_else(|| SyncError::Parse(format!("unsupported top-level line: {line:?}")))?;
                entries.push(Entry {
                    key,
                    value: Value::Null,
                    leading: std::mem::take(&mut pending),
                    body: vec![line.to_string()],
                });
            }
        }

        if entries.len() != mapping.len() {
            return Err(SyncError::Parse(format!(
                "found {} top-level keys, expected {}",
                entries.len(),
                mapping.len()
            )));
        }
        for (entry, (key, value)) in entries.iter_mut().zip(mapping) {
            if key_text(&key).as_deref() != Some(entry.key.as_str()) {
                return Err(SyncError::Parse(format!(
                    "top-level key {:?} does not match the parsed document",
                    entry.key
                )));
            }
            entry.value = value;
        }

        Ok(Self {
            entries,
            trailing: pending,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    /// Top-level keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entry(key).map(|e| &e.value)
    }

    /// Sets `key` to `value`. An existing entry is replaced in place and
    /// keeps its leading comments; a new one is appended. Setting an equal
    /// value leaves the original text untouched.
    pub fn set(&mut self, key: &str, value: Value) -> SyncResult<()> {
        if self.get(key) == Some(&value) {
            return Ok(());
        }

        let mut single = Mapping::new();
        single.insert(Value::String(key.to_string()), value.clone());
        let rendered =
            serde_yaml::to_string(&single).map_err(|e| SyncError::Parse(e.to_string()))?;
        let body: Vec<String> = rendered.lines().map(str::to_string).collect();

        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.value = value;
            entry.body = body;
        } else {
            // The first key takes over a leading header such as `#cloud-config`.
            let leading = if self.entries.is_empty() {
                std::mem::take(&mut self.trailing)
            } else {
                Vec::new()
            };
            self.entries.push(Entry {
                key: key.to_string(),
                value,
                leading,
                body,
            });
        }
        Ok(())
    }

    /// Removes `key`. Its leading comments move to the next entry, or to the
    /// end of the document.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|e| e.key == key)?;
        let mut removed = self.entries.remove(index);
        match self.entries.get_mut(index) {
            Some(next) => {
                removed.leading.append(&mut next.leading);
                next.leading = removed.leading;
            }
            None => {
                removed.leading.append(&mut self.trailing);
                self.trailing = removed.leading;
            }
        }
        Some(removed.value)
    }

    /// Whether the `#cloud-config` header line sits above `key` with only
    /// blank or comment lines in between.
    pub fn is_protected(&self, key: &str) -> bool {
        self.entry(key)
            .is_some_and(|e| e.leading.iter().any(|l| l.trim_end() == CLOUD_CONFIG_HEADER))
    }

    /// Deletes `key` unless it is protected. Returns whether it was deleted.
    pub fn delete_unprotected(&mut self, key: &str) -> bool {
        if self.is_protected(key) {
            tracing::debug!(key, "keeping protected cloud-config key");
            return false;
        }
        self.delete(key).is_some()
    }

    /// Empties a sequence-valued key and deletes it unless it is protected,
    /// in which case it stays in the document as `[]`.
    pub fn clear_sequence(&mut self, key: &str) -> SyncResult<()> {
        if !self.contains(key) {
            return Ok(());
        }
        self.set(key, Value::Sequence(Vec::new()))?;
        self.delete_unprotected(key);
        Ok(())
    }

    /// Renders the document, prefixed with `#cloud-config` when the text
    /// does not already start with it. An empty document renders to `None`.
    pub fn render(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let mut out = String::new();
        let lines = self
            .entries
            .iter()
            .flat_map(|e| e.leading.iter().chain(e.body.iter()))
            .chain(self.trailing.iter());
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
        if !has_cloud_config_header(&out) {
            out.insert_str(0, &format!("{CLOUD_CONFIG_HEADER}\n"));
        }
        Some(out)
    }

    fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }
}

/// Whether the first line of `text` is the `#cloud-config` header.
pub fn has_cloud_config_header(text: &str) -> bool {
    text.lines()
        .next()
        .is_some_and(|line| line.trim_start().starts_with(CLOUD_CONFIG_HEADER))
}

/// Blank lines, column-zero comments and document markers.
fn is_detached(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || line.starts_with('#')
        || trimmed == "---"
        || trimmed == "..."
}

fn is_continuation(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t') || line == "-" || line.starts_with("- ")
}

/// Extracts the key of a `key: value` line.
fn key_of(line: &str) -> Option<String> {
    let line = line.trim_end();
    for quote in ['"', '\''] {
        if let Some(rest) = line.strip_prefix(quote) {
            let end = rest.find(quote)?;
            let after = rest[end + 1..].trim_start();
            return after
                .starts_with(':')
                .then(|| rest[..end].to_string());
        }
    }
    let end = line
        .find(": ")
        .or_else(|| line.find(":\t"))
        .or_else(|| line.strip_suffix(':').map(str::len))?;
    let key = line[..end].trim_end();
    (!key.is_empty() && !key.starts_with(['{', '[', '&', '*', '!', '?'])).then(|| key.to_string())
}

fn key_text(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
