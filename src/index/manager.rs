/// Index manager: owns every (table, column) secondary index.
///
/// Indexes are loaded lazily from `_indexes/<table>/<column>` on first access,
/// mutated in memory, and written back by `flush()`.

use super::hash::HashIndex;
use crate::core::{DatabaseError, Value};
use crate::storage::FormatHandler;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

type IndexId = (String, String);

#[derive(Debug)]
pub struct IndexManager {
    root: PathBuf,
    format: FormatHandler,
    indexes: HashMap<IndexId, HashIndex>,
    /// Indexes whose file existed (or that were built) when loaded.
    persisted: HashSet<IndexId>,
    dirty: HashSet<IndexId>,
    removed: HashSet<IndexId>,
}

impl IndexManager {
    #[must_use]
    pub fn new(root: PathBuf, format: FormatHandler) -> Self {
        Self {
            root,
            format,
            indexes: HashMap::new(),
            persisted: HashSet::new(),
            dirty: HashSet::new(),
            removed: HashSet::new(),
        }
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(crate::storage::encode_stem(table))
    }

    fn path(&self, table: &str, column: &str) -> PathBuf {
        self.format.path_for(&self.table_dir(table), column)
    }

    fn id(table: &str, column: &str) -> IndexId {
        (table.to_string(), column.to_string())
    }

    fn load(&mut self, table: &str, column: &str) -> Result<&mut HashIndex, DatabaseError> {
        let id = Self::id(table, column);
        if !self.indexes.contains_key(&id) {
            let index = if self.removed.contains(&id) {
                HashIndex::new()
            } else {
                match self.format.read(&self.path(table, column))? {
                    Some(doc) => {
                        self.persisted.insert(id.clone());
                        HashIndex::from_document(&doc)
                    }
                    None => HashIndex::new(),
                }
            };
            self.indexes.insert(id.clone(), index);
        }
        Ok(self.indexes.entry(id).or_default())
    }

    fn mark_dirty(&mut self, table: &str, column: &str) {
        let id = Self::id(table, column);
        self.removed.remove(&id);
        self.dirty.insert(id);
    }

    /// True when the index has a file on disk or has been built in this process.
    pub fn is_materialized(&mut self, table: &str, column: &str) -> Result<bool, DatabaseError> {
        self.load(table, column)?;
        let id = Self::id(table, column);
        Ok(self.persisted.contains(&id) || self.dirty.contains(&id))
    }

    pub fn add(&mut self, table: &str, column: &str, value: &Value, row_key: &str) -> Result<(), DatabaseError> {
        self.load(table, column)?.insert(value, row_key);
        self.mark_dirty(table, column);
        Ok(())
    }

    pub fn remove(&mut self, table: &str, column: &str, value: &Value, row_key: &str) -> Result<(), DatabaseError> {
        self.load(table, column)?.delete(value, row_key);
        self.mark_dirty(table, column);
        Ok(())
    }

    /// Moves `row_key` from `old` to `new`; a no-op when the value did not change.
    pub fn update(
        &mut self,
        table: &str,
        column: &str,
        old: &Value,
        new: &Value,
        row_key: &str,
    ) -> Result<(), DatabaseError> {
        if old == new {
            return Ok(());
        }
        let index = self.load(table, column)?;
        index.delete(old, row_key);
        index.insert(new, row_key);
        self.mark_dirty(table, column);
        Ok(())
    }

    pub fn find_by_value(&mut self, table: &str, column: &str, value: &Value) -> Result<Vec<String>, DatabaseError> {
        Ok(self.load(table, column)?.search(value))
    }

    /// Replaces an index with one built from `rows` (row key, value).
    pub fn rebuild<'a>(
        &mut self,
        table: &str,
        column: &str,
        rows: impl IntoIterator<Item = (&'a str, &'a Value)>,
    ) {
        let mut index = HashIndex::new();
        for (row_key, value) in rows {
            index.insert(value, row_key);
        }
        debug!(table, column, rows = index.entry_count(), values = index.key_count(), "index rebuilt");
        self.indexes.insert(Self::id(table, column), index);
        self.mark_dirty(table, column);
    }

    /// Forgets one index and deletes its file on the next flush.
    pub fn drop_index(&mut self, table: &str, column: &str) {
        let id = Self::id(table, column);
        self.indexes.remove(&id);
        self.dirty.remove(&id);
        self.persisted.remove(&id);
        self.removed.insert(id);
    }

    /// Forgets every index of `table` and removes the table's index directory now.
    pub fn drop_table(&mut self, table: &str) -> Result<(), DatabaseError> {
        self.indexes.retain(|(t, _), _| t != table);
        self.dirty.retain(|(t, _)| t != table);
        self.persisted.retain(|(t, _)| t != table);
        self.removed.retain(|(t, _)| t != table);
        match std::fs::remove_dir_all(self.table_dir(table)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes every dirty index and deletes dropped ones. Returns the number of files touched.
    pub fn flush(&mut self) -> Result<usize, DatabaseError> {
        let mut touched = 0;
        for (table, column) in std::mem::take(&mut self.removed) {
            if self.format.remove(&self.path(&table, &column))? {
                touched += 1;
            }
        }

        let mut dirty: Vec<IndexId> = self.dirty.drain().collect();
        dirty.sort();
        for id in dirty {
            if let Some(index) = self.indexes.get(&id) {
                self.format.write(&self.path(&id.0, &id.1), &index.to_document())?;
                self.persisted.insert(id);
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileFormat;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> IndexManager {
        IndexManager::new(dir.path().join("_indexes"), FormatHandler::new(FileFormat::Json))
    }

    #[test]
    fn test_changes_persist_only_after_flush() {
        let dir = TempDir::new().unwrap();
        let mut indexes = manager(&dir);
        indexes.add("posts", "status", &Value::from("draft"), "1").unwrap();
        indexes.add("posts", "status", &Value::from("draft"), "2").unwrap();
        indexes.update("posts", "status", &Value::from("draft"), &Value::from("publish"), "2").unwrap();

        assert!(!dir.path().join("_indexes/posts/status.json").exists());
        assert_eq!(indexes.flush().unwrap(), 1);
        assert!(dir.path().join("_indexes/posts/status.json").exists());

        let mut reloaded = manager(&dir);
        assert_eq!(reloaded.find_by_value("posts", "status", &Value::from("draft")).unwrap(), vec!["1"]);
        assert_eq!(reloaded.find_by_value("posts", "status", &Value::from("publish")).unwrap(), vec!["2"]);
        assert!(reloaded.is_materialized("posts", "status").unwrap());
        assert!(!reloaded.is_materialized("posts", "author").unwrap());
    }

    #[test]
    fn test_drop_index_and_table() {
        let dir = TempDir::new().unwrap();
        let mut indexes = manager(&dir);
        indexes.add("t", "a", &Value::Integer(1), "1").unwrap();
        indexes.add("t", "b", &Value::Integer(1), "1").unwrap();
        indexes.flush().unwrap();

        indexes.drop_index("t", "a");
        assert!(indexes.find_by_value("t", "a", &Value::Integer(1)).unwrap().is_empty());
        indexes.flush().unwrap();
        assert!(!dir.path().join("_indexes/t/a.json").exists());

        indexes.drop_table("t").unwrap();
        assert!(!dir.path().join("_indexes/t").exists());
        assert!(indexes.find_by_value("t", "b", &Value::Integer(1)).unwrap().is_empty());
    }

    #[test]
    fn test_rebuild() {
        let dir = TempDir::new().unwrap();
        let mut indexes = manager(&dir);
        let (a, b) = (Value::from("x"), Value::from("y"));
        indexes.rebuild("t", "c", vec![("1", &a), ("2", &b), ("3", &a)]);
        assert_eq!(indexes.find_by_value("t", "c", &a).unwrap(), vec!["1", "3"]);
        assert!(indexes.is_materialized("t", "c").unwrap());
    }
}
