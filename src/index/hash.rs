/// Hash index over one column: normalized value → row keys.
///
/// Equality lookups only. Values are normalized to string keys so the index can be
/// written as a plain `{ "value": ["rowKey", ...] }` document.

use crate::core::Value;
use crate::storage::Document;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Key stored for NULL values.
pub const NULL_KEY: &str = "__NULL__";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey(String);

impl IndexKey {
    /// NULL → sentinel, booleans → "0"/"1", binary → content hash, everything else → text.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self(NULL_KEY.to_string()),
            Value::Boolean(b) => Self(if *b { "1" } else { "0" }.to_string()),
            Value::Bytes(bytes) => Self(hex::encode(Sha256::digest(bytes))),
            other => Self(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Value> for IndexKey {
    fn from(value: &Value) -> Self {
        Self::from_value(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    map: BTreeMap<IndexKey, Vec<String>>,
}

impl HashIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `row_key` under `value`. Adding the same pair twice is a no-op.
    pub fn insert(&mut self, value: &Value, row_key: &str) {
        let keys = self.map.entry(IndexKey::from(value)).or_default();
        if !keys.iter().any(|k| k == row_key) {
            keys.push(row_key.to_string());
        }
    }

    pub fn delete(&mut self, value: &Value, row_key: &str) {
        let key = IndexKey::from(value);
        if let Some(keys) = self.map.get_mut(&key) {
            keys.retain(|k| k != row_key);
            if keys.is_empty() {
                self.map.remove(&key);
            }
        }
    }

    #[must_use]
    pub fn search(&self, value: &Value) -> Vec<String> {
        self.map.get(&IndexKey::from(value)).cloned().unwrap_or_default()
    }

    /// Number of distinct values.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.map.len()
    }

    /// Number of (value, row) pairs.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        self.map
            .iter()
            .map(|(key, rows)| {
                let rows = rows.iter().cloned().map(serde_json::Value::String).collect();
                (key.0.clone(), serde_json::Value::Array(rows))
            })
            .collect()
    }

    /// Rebuilds an index from its stored document. Malformed entries are skipped.
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        let mut map = BTreeMap::new();
        for (key, rows) in document {
            let Some(rows) = rows.as_array() else { continue };
            let rows: Vec<String> = rows
                .iter()
                .filter_map(|r| match r {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect();
            if !rows.is_empty() {
                map.insert(IndexKey(key.clone()), rows);
            }
        }
        Self { map }
    }
}
