use super::format::{Document, FormatHandler};
use super::serialization::SerializationHandler;
use crate::core::{DatabaseError, Row};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Row cache for one table with its pending writes and removals.
///
/// Rows are read from `tables/<table>/<rowKey>` on demand. Writes and deletes
/// only touch the cache until [`TableStore::flush`].
#[derive(Debug)]
pub struct TableStore {
    dir: PathBuf,
    rows: HashMap<String, Row>,
    dirty: HashSet<String>,
    deleted: HashSet<String>,
    fully_loaded: bool,
}

impl TableStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            rows: HashMap::new(),
            dirty: HashSet::new(),
            deleted: HashSet::new(),
            fully_loaded: false,
        }
    }

    fn read_file(
        &self,
        key: &str,
        format: &FormatHandler,
    ) -> Result<Option<Row>, DatabaseError> {
        let path = format.path_for(&self.dir, key);
        Ok(format.read(&path)?.map(|doc| decode_row(&doc)))
    }

    /// Cached row, loading it from disk on a miss. Rows pending deletion are absent.
    pub fn get(&mut self, key: &str, format: &FormatHandler) -> Result<Option<&Row>, DatabaseError> {
        if self.deleted.contains(key) {
            return Ok(None);
        }
        if !self.rows.contains_key(key) && !self.fully_loaded {
            match self.read_file(key, format)? {
                Some(row) => {
                    self.rows.insert(key.to_string(), row);
                }
                None => return Ok(None),
            }
        }
        Ok(self.rows.get(key))
    }

    pub fn contains(&mut self, key: &str, format: &FormatHandler) -> Result<bool, DatabaseError> {
        Ok(self.get(key, format)?.is_some())
    }

    /// Loads every stored row not already cached.
    pub fn load_all(&mut self, format: &FormatHandler) -> Result<(), DatabaseError> {
        if self.fully_loaded {
            return Ok(());
        }
        for key in format.list_stems(&self.dir)? {
            if self.rows.contains_key(&key) || self.deleted.contains(&key) {
                continue;
            }
            if let Some(row) = self.read_file(&key, format)? {
                self.rows.insert(key, row);
            }
        }
        self.fully_loaded = true;
        Ok(())
    }

    /// Every live row in row-key order. Call `load_all` first.
    #[must_use]
    pub fn rows(&self) -> Vec<(&String, &Row)> {
        let mut rows: Vec<(&String, &Row)> = self.rows.iter().collect();
        rows.sort_by(|a, b| compare_row_keys(a.0, b.0));
        rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn put(&mut self, key: String, row: Row) {
        self.deleted.remove(&key);
        self.dirty.insert(key.clone());
        self.rows.insert(key, row);
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Row> {
        if self.deleted.contains(key) {
            return None;
        }
        let row = self.rows.get_mut(key)?;
        self.dirty.insert(key.to_string());
        Some(row)
    }

    pub fn remove(&mut self, key: &str) -> Option<Row> {
        self.dirty.remove(key);
        self.deleted.insert(key.to_string());
        self.rows.remove(key)
    }

    /// Forgets all rows; the caller removes the files.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.dirty.clear();
        self.deleted.clear();
        self.fully_loaded = true;
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty() || !self.deleted.is_empty()
    }

    /// Writes dirty rows and removes deleted ones. Returns the number of files touched.
    pub fn flush(
        &mut self,
        format: &FormatHandler,
        serializer: &SerializationHandler,
    ) -> Result<usize, DatabaseError> {
        let mut touched = 0;
        for key in std::mem::take(&mut self.deleted) {
            if format.remove(&format.path_for(&self.dir, &key))? {
                touched += 1;
            }
        }
        let mut dirty: Vec<String> = self.dirty.drain().collect();
        dirty.sort_by(|a, b| compare_row_keys(a, b));
        for key in dirty {
            if let Some(row) = self.rows.get(&key) {
                format.write(&format.path_for(&self.dir, &key), &encode_row(row, serializer))?;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

fn encode_row(row: &Row, serializer: &SerializationHandler) -> Document {
    row.iter()
        .map(|(name, value)| (name.to_string(), serializer.encode_value(value)))
        .collect()
}

fn decode_row(document: &Document) -> Row {
    document
        .iter()
        .map(|(name, json)| (name.clone(), SerializationHandler::decode_value(json)))
        .collect()
}

/// Row-key order: integer keys numerically and before any other key, the rest by text.
#[must_use]
pub fn compare_row_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
