//! Persistent key-value store seam.
//!
//! The store holds two JSON documents: the current projection set under
//! [`PROJECTIONS_KEY`] and the history ledger array under [`HISTORY_KEY`].
//! Values are JSON text. Reads of absent or malformed values are treated as
//! empty by the callers in this crate; writes may fail when a value exceeds
//! the backend's capacity.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::lenient::decode_text;

pub const PROJECTIONS_KEY: &str = "nhl_projections";
pub const HISTORY_KEY: &str = "nhl_history";

/// Per-value quota, matching the usual browser storage allowance.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("capacity exceeded for key {key}: {size} bytes > {limit} bytes")]
    CapacityExceeded {
        key: String,
        size: usize,
        limit: usize,
    },
    #[error("store backend error: {0}")]
    Backend(String),
}

pub trait KeyValueStore {
    #[allow(clippy::missing_errors_doc)]
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    #[allow(clippy::missing_errors_doc)]
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    #[allow(clippy::missing_errors_doc)]
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Appends `item` to the JSON array stored at `key` as one atomic step
    /// and returns the new array length. A missing, malformed or non-array
    /// value is replaced by `[item]`.
    #[allow(clippy::missing_errors_doc)]
    fn append_to_array(&mut self, key: &str, item: &Value) -> Result<usize, StoreError>;
}

/// Computes the text written back by [`KeyValueStore::append_to_array`].
///
/// # Errors
/// Returns [`StoreError::Backend`] when the array cannot be serialized.
pub fn appended_array_text(current: Option<&str>, item: &Value) -> Result<(String, usize), StoreError> {
    let mut items = match decode_text(current, Value::Array(Vec::new())) {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    items.push(item.clone());
    let len = items.len();
    let text = serde_json::to_string(&Value::Array(items))
        .map_err(|err| StoreError::Backend(format!("failed to serialize array: {err}")))?;
    Ok((text, len))
}

/// Checks `value` against a per-value byte limit.
///
/// # Errors
/// Returns [`StoreError::CapacityExceeded`] when the value is too large.
pub fn ensure_capacity(key: &str, value: &str, limit: usize) -> Result<(), StoreError> {
    if value.len() > limit {
        return Err(StoreError::CapacityExceeded {
            key: key.to_string(),
            size: value.len(),
            limit,
        });
    }
    Ok(())
}

/// Reads and parses `key`, treating read failures, absence and malformed JSON
/// as `default`.
pub fn read_json(store: &dyn KeyValueStore, key: &str, default: Value) -> Value {
    match store.get(key) {
        Ok(raw) => decode_text(raw.as_deref(), default),
        Err(err) => {
            tracing::warn!(key, error = %err, "store read failed; treating value as empty");
            default
        }
    }
}

/// Writes `value` under `key`. Failures only cost cross-session durability,
/// so they are logged and reported as `false` rather than propagated.
pub fn write_json_swallowed(store: &mut dyn KeyValueStore, key: &str, value: &Value) -> bool {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to serialize value for store write");
            return false;
        }
    };

    match store.set(key, &text) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(key, error = %err, "store write failed; value kept in memory only");
            false
        }
    }
}

/// In-process store with a per-value capacity limit.
#[derive(Debug, Clone)]
pub struct MemoryKvStore {
    entries: BTreeMap<String, String>,
    max_value_bytes: usize,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_value_bytes(max_value_bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_value_bytes,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        ensure_capacity(key, value, self.max_value_bytes)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let _ = self.entries.remove(key);
        Ok(())
    }

    fn append_to_array(&mut self, key: &str, item: &Value) -> Result<usize, StoreError> {
        let (text, len) = appended_array_text(self.entries.get(key).map(String::as_str), item)?;
        ensure_capacity(key, &text, self.max_value_bytes)?;
        self.entries.insert(key.to_string(), text);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn append_replaces_malformed_value_with_single_item_array() {
        let mut store = MemoryKvStore::new();
        must(store.set(HISTORY_KEY, "{not json"));
        assert_eq!(must(store.append_to_array(HISTORY_KEY, &json!({"date": "2026-02-27"}))), 1);
        assert_eq!(
            read_json(&store, HISTORY_KEY, json!([])),
            json!([{"date": "2026-02-27"}])
        );
    }

    #[test]
    fn append_preserves_existing_order() {
        let mut store = MemoryKvStore::new();
        for index in 0..3 {
            must(store.append_to_array(HISTORY_KEY, &json!(index)));
        }
        assert_eq!(read_json(&store, HISTORY_KEY, json!([])), json!([0, 1, 2]));
    }

    #[test]
    fn capacity_limit_rejects_large_values() {
        let mut store = MemoryKvStore::with_max_value_bytes(8);
        let result = store.set(PROJECTIONS_KEY, "0123456789");
        assert!(matches!(result, Err(StoreError::CapacityExceeded { size: 10, limit: 8, .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn swallowed_write_reports_failure_without_panicking() {
        let mut store = MemoryKvStore::with_max_value_bytes(4);
        assert!(!write_json_swallowed(&mut store, PROJECTIONS_KEY, &json!({"games": []})));
        assert!(write_json_swallowed(&mut store, PROJECTIONS_KEY, &json!({})));
    }

    #[test]
    fn read_json_defaults_for_absent_key() {
        let store = MemoryKvStore::new();
        assert_eq!(read_json(&store, PROJECTIONS_KEY, json!({})), json!({}));
    }
}
