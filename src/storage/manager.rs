use super::format::{encode_stem, FormatHandler};
use super::schema::{PrimaryKeyRegistry, SchemaManager};
use super::serialization::SerializationHandler;
use super::table_store::TableStore;
use crate::config::EngineConfig;
use crate::core::{Column, DataType, DatabaseError, Row, TableMeta, TableSchema, Value};
use crate::index::{IndexKey, IndexManager};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of inserting one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedRow {
    pub key: String,
    /// Generated or supplied integer key, reported as the last insert id.
    pub id: Option<i64>,
}

/// Row-level storage over a directory tree:
///
/// ```text
/// <root>/tables/<table>/<rowKey>.<ext>
/// <root>/_schema/<table>.<ext>
/// <root>/_meta/<table>.<ext>
/// <root>/_indexes/<table>/<column>.<ext>
/// ```
///
/// Mutations stay in memory until `flush()`.
#[derive(Debug)]
pub struct StorageManager {
    root: PathBuf,
    format: FormatHandler,
    serializer: SerializationHandler,
    schemas: SchemaManager,
    indexes: IndexManager,
    tables: HashMap<String, TableStore>,
    extra_indexes: HashMap<String, Vec<String>>,
}

impl StorageManager {
    pub fn open(config: &EngineConfig) -> Result<Self, DatabaseError> {
        let root = config.data_dir.clone();
        for dir in ["tables", "_schema", "_meta", "_indexes"] {
            fs::create_dir_all(root.join(dir)).map_err(|e| {
                DatabaseError::Storage(format!("cannot create {}: {e}", root.join(dir).display()))
            })?;
        }
        let format = FormatHandler::new(config.format);
        debug!(root = %root.display(), format = ?config.format, "storage opened");
        Ok(Self {
            schemas: SchemaManager::new(&root, format, PrimaryKeyRegistry::from_config(config)),
            indexes: IndexManager::new(root.join("_indexes"), format),
            serializer: SerializationHandler::new(config.allowed_classes.iter().cloned()),
            extra_indexes: config.indexed_columns.clone(),
            tables: HashMap::new(),
            format,
            root,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn format(&self) -> &FormatHandler {
        &self.format
    }

    fn rows_dir(root: &Path, table: &str) -> PathBuf {
        root.join("tables").join(encode_stem(table))
    }

    fn store_for<'a>(
        tables: &'a mut HashMap<String, TableStore>,
        root: &Path,
        table: &str,
    ) -> &'a mut TableStore {
        tables
            .entry(table.to_string())
            .or_insert_with(|| TableStore::new(Self::rows_dir(root, table)))
    }

    pub fn table_exists(&mut self, table: &str) -> Result<bool, DatabaseError> {
        Ok(self.schemas.has_schema(table)? || Self::rows_dir(&self.root, table).is_dir())
    }

    /// Tables with a schema or a row directory, sorted.
    pub fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let mut names = self.schemas.list()?;
        match fs::read_dir(self.root.join("tables")) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    if entry.file_type()?.is_dir() {
                        if let Some(name) = entry.file_name().to_str() {
                            names.push(super::format::decode_stem(name));
                        }
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn schema(&mut self, table: &str) -> Result<Option<TableSchema>, DatabaseError> {
        self.schemas.schema(table)
    }

    pub fn save_schema(&mut self, table: &str, schema: TableSchema) -> Result<(), DatabaseError> {
        self.schemas.save_schema(table, schema)
    }

    pub fn primary_key(&mut self, table: &str) -> Result<Vec<String>, DatabaseError> {
        self.schemas.primary_key(table)
    }

    pub fn meta(&mut self, table: &str) -> Result<TableMeta, DatabaseError> {
        self.schemas.meta(table)
    }

    /// Columns with a maintained index: key columns, declared KEYs, configured extras.
    pub fn indexed_columns(&mut self, table: &str) -> Result<Vec<String>, DatabaseError> {
        let schema = self.schemas.schema(table)?.unwrap_or_default();
        let mut columns: Vec<String> = Vec::new();
        let key = self.schemas.primary_key(table)?;
        let declared = key
            .into_iter()
            .filter(|k| schema.columns.is_empty() || schema.column(k).is_some())
            .chain(schema.indexes.iter().cloned())
            .chain(self.extra_indexes.get(table).into_iter().flatten().cloned());
        for column in declared {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        Ok(columns)
    }

    pub fn is_indexed(&mut self, table: &str, column: &str) -> Result<bool, DatabaseError> {
        Ok(self.indexed_columns(table)?.iter().any(|c| c == column))
    }

    /// Row key from key column values: one value as text, several joined with `_`.
    /// `None` when a key column is missing or NULL.
    #[must_use]
    pub fn row_key(primary_key: &[String], row: &Row) -> Option<String> {
        let mut parts = Vec::with_capacity(primary_key.len());
        for column in primary_key {
            let value = row.get(column).or_else(|| row.get_ignore_case(column))?;
            if value.is_null() {
                return None;
            }
            parts.push(value.to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("_"))
        }
    }

    pub fn row_key_for(&mut self, table: &str, row: &Row) -> Result<Option<String>, DatabaseError> {
        let key = self.schemas.primary_key(table)?;
        Ok(Self::row_key(&key, row))
    }

    pub fn get_row(&mut self, table: &str, key: &str) -> Result<Option<Row>, DatabaseError> {
        let schema = self.schemas.schema(table)?;
        let store = Self::store_for(&mut self.tables, &self.root, table);
        let Some(row) = store.get(key, &self.format)? else {
            return Ok(None);
        };
        let mut row = row.clone();
        if let Some(schema) = &schema {
            schema.complete_row(&mut row);
        }
        Ok(Some(row))
    }

    /// Every row of a table in row-key order, completed with schema defaults.
    pub fn get_all_rows(&mut self, table: &str) -> Result<Vec<(String, Row)>, DatabaseError> {
        let schema = self.schemas.schema(table)?;
        let store = Self::store_for(&mut self.tables, &self.root, table);
        store.load_all(&self.format)?;
        Ok(store
            .rows()
            .into_iter()
            .map(|(key, row)| {
                let mut row = row.clone();
                if let Some(schema) = &schema {
                    schema.complete_row(&mut row);
                }
                (key.clone(), row)
            })
            .collect())
    }

    pub fn row_count(&mut self, table: &str) -> Result<usize, DatabaseError> {
        let store = Self::store_for(&mut self.tables, &self.root, table);
        store.load_all(&self.format)?;
        Ok(store.len())
    }

    fn infer_schema(&self, table: &str, row: &Row) -> TableSchema {
        let primary_key = self.schemas.registry().resolve(table);
        let mut columns: Vec<Column> = row
            .iter()
            .map(|(name, value)| Column::new(name, DataType::infer(value)))
            .collect();
        if let [key] = primary_key.as_slice() {
            if !row.contains(key) {
                columns.insert(0, Column::new(key.clone(), DataType::Integer).auto_increment());
            }
        }
        TableSchema::new(columns, primary_key)
    }

    /// Rebuilds an index from scratch when it has never been written and the table has rows.
    fn ensure_index(&mut self, table: &str, column: &str) -> Result<(), DatabaseError> {
        if !self.indexes.is_materialized(table, column)? && self.row_count(table)? > 0 {
            self.rebuild_index(table, column)?;
        }
        Ok(())
    }

    /// Inserts a new row. Fails with `DuplicateKey` if the row key is taken.
    ///
    /// Writing to an unknown table creates it with a schema inferred from the row.
    pub fn insert_row(&mut self, table: &str, row: Row) -> Result<InsertedRow, DatabaseError> {
        if !self.table_exists(table)? {
            let schema = self.infer_schema(table, &row);
            debug!(table, columns = schema.columns.len(), "table created on first write");
            self.create_table(table, schema)?;
        }
        let schema = self.schemas.schema(table)?.unwrap_or_default();
        let primary_key = self.schemas.primary_key(table)?;

        let mut row: Row = row
            .into_iter()
            .map(|(name, value)| {
                match schema.column(&name) {
                    Some(column) => (column.name.clone(), column.data_type.coerce(value)),
                    None => (name, value),
                }
            })
            .collect();
        schema.complete_row(&mut row);

        let mut id = None;
        let mut auto_assigned = false;
        for column in schema.auto_increment_columns() {
            let current = row.get(&column.name).cloned().unwrap_or(Value::Null);
            if is_unset_key(&current) {
                let next = self.schemas.next_auto_increment(table)?;
                row.insert(column.name.clone(), Value::Integer(next));
                id = Some(next);
                auto_assigned = true;
            } else if let Some(n) = current.as_i64() {
                self.schemas.observe_key(table, n)?;
                id = Some(n);
            }
        }

        let hidden_key = !schema.columns.is_empty()
            && primary_key.iter().all(|k| schema.column(k).is_none());
        let key = if hidden_key {
            let next = self.schemas.next_auto_increment(table)?;
            id = Some(next);
            next.to_string()
        } else {
            if let [column] = primary_key.as_slice() {
                let current = row.get(column).cloned().unwrap_or(Value::Null);
                if !auto_assigned && current.is_null() {
                    let next = self.schemas.next_auto_increment(table)?;
                    row.insert(column.clone(), Value::Integer(next));
                    id = Some(next);
                } else if let Value::Integer(n) = current {
                    self.schemas.observe_key(table, n)?;
                    id = id.or(Some(n));
                }
            }
            Self::row_key(&primary_key, &row).ok_or_else(|| {
                DatabaseError::Storage(format!(
                    "row for '{table}' has no value for key column(s) {}",
                    primary_key.join(", ")
                ))
            })?
        };

        let indexed = self.indexed_columns(table)?;
        for column in &indexed {
            self.ensure_index(table, column)?;
        }

        let store = Self::store_for(&mut self.tables, &self.root, table);
        if store.contains(&key, &self.format)? {
            return Err(DatabaseError::DuplicateKey {
                table: table.to_string(),
                key,
            });
        }
        for column in &indexed {
            let value = row.get(column).cloned().unwrap_or(Value::Null);
            self.indexes.add(table, column, &value, &key)?;
        }
        Self::store_for(&mut self.tables, &self.root, table).put(key.clone(), row);
        self.schemas.adjust_row_count(table, 1)?;
        Ok(InsertedRow { key, id })
    }

    /// Merges `changes` into an existing row. Key columns are never changed.
    /// Returns false when the row does not exist.
    pub fn update_row(&mut self, table: &str, key: &str, changes: &Row) -> Result<bool, DatabaseError> {
        let schema = self.schemas.schema(table)?.unwrap_or_default();
        let primary_key = self.schemas.primary_key(table)?;
        let indexed = self.indexed_columns(table)?;
        for column in &indexed {
            self.ensure_index(table, column)?;
        }

        let store = Self::store_for(&mut self.tables, &self.root, table);
        if !store.contains(key, &self.format)? {
            return Ok(false);
        }
        let Some(row) = store.get_mut(key) else {
            return Ok(false);
        };

        let mut index_changes = Vec::new();
        for (name, value) in changes.iter() {
            let name = row
                .keys()
                .find(|k| k.eq_ignore_ascii_case(name))
                .map(str::to_string)
                .or_else(|| schema.column(name).map(|c| c.name.clone()))
                .unwrap_or_else(|| name.to_string());
            let value = schema
                .column(&name)
                .map_or_else(|| value.clone(), |c| c.data_type.coerce(value.clone()));
            let old = row.get(&name).cloned().unwrap_or(Value::Null);

            if primary_key.contains(&name) {
                if old != value && !old.sql_eq(&value) {
                    warn!(table, column = %name, key, "ignoring update of primary key column");
                }
                continue;
            }
            row.insert(name.clone(), value.clone());
            if indexed.contains(&name) && old != value {
                index_changes.push((name, old, value));
            }
        }

        for (column, old, new) in index_changes {
            self.indexes.update(table, &column, &old, &new, key)?;
        }
        Ok(true)
    }

    /// Removes a row. Returns false when it does not exist.
    pub fn delete_row(&mut self, table: &str, key: &str) -> Result<bool, DatabaseError> {
        let indexed = self.indexed_columns(table)?;
        for column in &indexed {
            self.ensure_index(table, column)?;
        }
        let store = Self::store_for(&mut self.tables, &self.root, table);
        if !store.contains(key, &self.format)? {
            return Ok(false);
        }
        let Some(row) = store.remove(key) else {
            return Ok(false);
        };
        for column in &indexed {
            let value = row.get(column).cloned().unwrap_or(Value::Null);
            self.indexes.remove(table, column, &value, key)?;
        }
        self.schemas.adjust_row_count(table, -1)?;
        Ok(true)
    }

    /// Creates a table. Returns false if it already has a schema.
    pub fn create_table(&mut self, table: &str, schema: TableSchema) -> Result<bool, DatabaseError> {
        if self.schemas.has_schema(table)? {
            return Ok(false);
        }
        fs::create_dir_all(Self::rows_dir(&self.root, table))?;
        self.schemas.save_schema(table, schema)?;
        self.schemas.adjust_row_count(table, 0)?;
        Ok(true)
    }

    /// Removes rows, schema, meta and indexes. Returns false if the table does not exist.
    pub fn drop_table(&mut self, table: &str) -> Result<bool, DatabaseError> {
        if !self.table_exists(table)? {
            return Ok(false);
        }
        remove_dir(&Self::rows_dir(&self.root, table))?;
        self.tables.remove(table);
        self.schemas.remove(table)?;
        self.indexes.drop_table(table)?;
        Ok(true)
    }

    /// Removes every row and resets counters and indexes, keeping the schema.
    pub fn truncate_table(&mut self, table: &str) -> Result<bool, DatabaseError> {
        if !self.table_exists(table)? {
            return Ok(false);
        }
        let dir = Self::rows_dir(&self.root, table);
        remove_dir(&dir)?;
        fs::create_dir_all(&dir)?;
        Self::store_for(&mut self.tables, &self.root, table).clear();
        self.schemas.reset_meta(table)?;
        self.indexes.drop_table(table)?;
        Ok(true)
    }

    /// Row keys whose `column` equals `value`, through the index when there is one.
    pub fn find_by_value(&mut self, table: &str, column: &str, value: &Value) -> Result<Vec<String>, DatabaseError> {
        if self.is_indexed(table, column)? {
            self.ensure_index(table, column)?;
            return self.indexes.find_by_value(table, column, value);
        }
        let wanted = IndexKey::from(value);
        Ok(self
            .get_all_rows(table)?
            .into_iter()
            .filter(|(_, row)| IndexKey::from(row.get(column).unwrap_or(&Value::Null)) == wanted)
            .map(|(key, _)| key)
            .collect())
    }

    pub fn rebuild_index(&mut self, table: &str, column: &str) -> Result<(), DatabaseError> {
        let rows = self.get_all_rows(table)?;
        let pairs: Vec<(String, Value)> = rows
            .into_iter()
            .map(|(key, row)| {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                (key, value)
            })
            .collect();
        self.indexes
            .rebuild(table, column, pairs.iter().map(|(k, v)| (k.as_str(), v)));
        Ok(())
    }

    pub fn drop_index(&mut self, table: &str, column: &str) {
        self.indexes.drop_index(table, column);
    }

    /// Gives every stored row a value for a newly added column.
    pub fn add_column_to_rows(&mut self, table: &str, column: &Column) -> Result<(), DatabaseError> {
        self.for_each_row(table, |row| {
            if !row.contains(&column.name) {
                row.insert(column.name.clone(), column.default_value());
            }
        })
    }

    pub fn rename_column_in_rows(&mut self, table: &str, from: &str, to: &str) -> Result<(), DatabaseError> {
        if from != to {
            self.for_each_row(table, |row| row.rename(from, to))?;
            self.indexes.drop_index(table, from);
        }
        Ok(())
    }

    pub fn drop_column_from_rows(&mut self, table: &str, column: &str) -> Result<(), DatabaseError> {
        self.for_each_row(table, |row| {
            row.remove(column);
        })?;
        self.indexes.drop_index(table, column);
        Ok(())
    }

    fn for_each_row(&mut self, table: &str, mut f: impl FnMut(&mut Row)) -> Result<(), DatabaseError> {
        let store = Self::store_for(&mut self.tables, &self.root, table);
        store.load_all(&self.format)?;
        let keys: Vec<String> = store.rows().into_iter().map(|(k, _)| k.clone()).collect();
        for key in keys {
            if let Some(row) = store.get_mut(&key) {
                f(row);
            }
        }
        Ok(())
    }

    /// Persists pending rows, deletions, counters and indexes. Returns the number of files touched.
    pub fn flush(&mut self) -> Result<usize, DatabaseError> {
        let mut touched = 0;
        for store in self.tables.values_mut().filter(|s| s.has_pending()) {
            touched += store.flush(&self.format, &self.serializer)?;
        }
        touched += self.schemas.flush()?;
        touched += self.indexes.flush()?;
        if touched > 0 {
            debug!(files = touched, "storage flushed");
        }
        Ok(touched)
    }
}

/// NULL, empty text and zero ask for a generated key.
fn is_unset_key(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(s) => s.trim().is_empty() || s.trim() == "0",
        Value::Integer(0) => true,
        _ => false,
    }
}

fn remove_dir(dir: &Path) -> Result<(), DatabaseError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileFormat;
    use tempfile::TempDir;

    fn open(dir: &TempDir, format: FileFormat) -> StorageManager {
        StorageManager::open(&EngineConfig::new(dir.path()).with_format(format)).unwrap()
    }

    fn posts_schema() -> TableSchema {
        let mut schema = TableSchema::new(
            vec![
                Column::new("id", DataType::Integer).auto_increment(),
                Column::new("title", DataType::String),
                Column::new("status", DataType::String).with_default(Value::from("draft")),
                Column::new("views", DataType::Integer),
            ],
            vec!["id".to_string()],
        );
        schema.add_index("status");
        schema
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    #[test]
    fn test_insert_round_trip_in_both_formats() {
        for format in [FileFormat::Json, FileFormat::Binary] {
            let dir = TempDir::new().unwrap();
            let mut storage = open(&dir, format);
            storage.create_table("posts", posts_schema()).unwrap();

            let inserted = storage
                .insert_row("posts", row(&[("title", Value::from("Hello")), ("views", Value::from("12"))]))
                .unwrap();
            assert_eq!(inserted, InsertedRow { key: "1".to_string(), id: Some(1) });
            storage.flush().unwrap();

            let mut reopened = open(&dir, format);
            let stored = reopened.get_row("posts", "1").unwrap().unwrap();
            assert_eq!(
                stored,
                row(&[
                    ("id", Value::Integer(1)),
                    ("title", Value::from("Hello")),
                    ("status", Value::from("draft")),
                    ("views", Value::Integer(12)),
                ])
            );
        }
    }

    #[test]
    fn test_auto_increment_exceeds_explicit_keys() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir, FileFormat::Json);
        storage.create_table("posts", posts_schema()).unwrap();

        let a = storage.insert_row("posts", row(&[("title", Value::from("a"))])).unwrap();
        let b = storage
            .insert_row("posts", row(&[("id", Value::Integer(40)), ("title", Value::from("b"))]))
            .unwrap();
        let c = storage.insert_row("posts", row(&[("title", Value::from("c"))])).unwrap();
        assert_eq!((a.id, b.id, c.id), (Some(1), Some(40), Some(41)));

        let err = storage
            .insert_row("posts", row(&[("id", Value::Integer(40))]))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey { .. }));
    }

    #[test]
    fn test_index_follows_mutations() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir, FileFormat::Json);
        storage.create_table("posts", posts_schema()).unwrap();
        for status in ["publish", "draft", "publish"] {
            storage.insert_row("posts", row(&[("status", Value::from(status))])).unwrap();
        }
        storage.update_row("posts", "2", &row(&[("status", Value::from("publish"))])).unwrap();
        storage.delete_row("posts", "1").unwrap();
        storage.flush().unwrap();

        let mut reopened = open(&dir, FileFormat::Json);
        assert_eq!(
            reopened.find_by_value("posts", "status", &Value::from("publish")).unwrap(),
            vec!["3", "2"]
        );
        assert!(reopened.find_by_value("posts", "status", &Value::from("draft")).unwrap().is_empty());
        assert_eq!(reopened.meta("posts").unwrap().row_count, 2);
    }

    #[test]
    fn test_primary_key_is_immutable() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir, FileFormat::Json);
        storage.create_table("posts", posts_schema()).unwrap();
        storage.insert_row("posts", row(&[("title", Value::from("a"))])).unwrap();

        assert!(storage
            .update_row("posts", "1", &row(&[("id", Value::Integer(9)), ("title", Value::from("b"))]))
            .unwrap());
        let stored = storage.get_row("posts", "1").unwrap().unwrap();
        assert_eq!(stored.get("id"), Some(&Value::Integer(1)));
        assert_eq!(stored.get("title"), Some(&Value::from("b")));
        assert!(!storage.update_row("posts", "9", &Row::new()).unwrap());
    }

    #[test]
    fn test_unknown_table_is_created_on_first_write() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir, FileFormat::Json);
        let inserted = storage.insert_row("notes", row(&[("body", Value::from("x"))])).unwrap();
        assert_eq!(inserted.key, "1");

        let schema = storage.schema("notes").unwrap().unwrap();
        assert_eq!(schema.primary_key, vec!["id".to_string()]);
        assert!(schema.column("id").unwrap().auto_increment);
        assert_eq!(storage.list_tables().unwrap(), vec!["notes".to_string()]);
    }

    #[test]
    fn test_truncate_and_drop() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir, FileFormat::Json);
        storage.create_table("posts", posts_schema()).unwrap();
        for _ in 0..5 {
            storage.insert_row("posts", row(&[("title", Value::from("t"))])).unwrap();
        }
        storage.flush().unwrap();

        assert!(storage.truncate_table("posts").unwrap());
        storage.flush().unwrap();
        assert_eq!(storage.row_count("posts").unwrap(), 0);
        assert!(storage.find_by_value("posts", "id", &Value::Integer(3)).unwrap().is_empty());
        let next = storage.insert_row("posts", row(&[("title", Value::from("again"))])).unwrap();
        assert_eq!(next.id, Some(1));

        assert!(storage.drop_table("posts").unwrap());
        assert!(!storage.drop_table("posts").unwrap());
        assert!(!dir.path().join("_schema/posts.json").exists());
        assert!(!dir.path().join("tables/posts").exists());
    }

    #[test]
    fn test_composite_and_hidden_keys() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir, FileFormat::Json);
        let links = TableSchema::new(
            vec![Column::new("object_id", DataType::Integer), Column::new("term_id", DataType::Integer)],
            vec!["object_id".to_string(), "term_id".to_string()],
        );
        storage.create_table("links", links).unwrap();
        let inserted = storage
            .insert_row("links", row(&[("object_id", Value::Integer(4)), ("term_id", Value::Integer(2))]))
            .unwrap();
        assert_eq!(inserted.key, "4_2");

        let plain = TableSchema::new(vec![Column::new("body", DataType::String)], Vec::new());
        storage.create_table("log", plain).unwrap();
        let first = storage.insert_row("log", row(&[("body", Value::from("a"))])).unwrap();
        let second = storage.insert_row("log", row(&[("body", Value::from("a"))])).unwrap();
        assert_eq!((first.key.as_str(), second.key.as_str()), ("1", "2"));
        assert!(!storage.get_row("log", "1").unwrap().unwrap().contains("id"));
    }

    #[test]
    fn test_missing_index_file_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir, FileFormat::Json);
        storage.create_table("posts", posts_schema()).unwrap();
        storage.insert_row("posts", row(&[("views", Value::Integer(5))])).unwrap();
        storage.insert_row("posts", row(&[("views", Value::Integer(7))])).unwrap();
        storage.flush().unwrap();

        let config = EngineConfig::new(dir.path()).with_indexed_column("posts", "views");
        let mut reopened = StorageManager::open(&config).unwrap();
        assert_eq!(reopened.find_by_value("posts", "views", &Value::Integer(7)).unwrap(), vec!["2"]);
        reopened.flush().unwrap();
        assert!(dir.path().join("_indexes/posts/views.json").exists());
    }
}
