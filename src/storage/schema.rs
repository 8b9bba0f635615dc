use super::format::FormatHandler;
use crate::config::EngineConfig;
use crate::core::{DatabaseError, TableMeta, TableSchema};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Table → primary key columns for tables that do not declare one.
///
/// Lookup order: exact table name, longest matching name suffix, default.
#[derive(Debug, Clone)]
pub struct PrimaryKeyRegistry {
    exact: HashMap<String, Vec<String>>,
    suffixes: Vec<(String, Vec<String>)>,
    default: Vec<String>,
}

impl Default for PrimaryKeyRegistry {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            suffixes: Vec::new(),
            default: vec!["id".to_string()],
        }
    }
}

impl PrimaryKeyRegistry {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut suffixes: Vec<(String, Vec<String>)> = config
            .primary_key_suffixes
            .iter()
            .map(|(s, cols)| (s.to_ascii_lowercase(), cols.clone()))
            .collect();
        suffixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        let default = if config.default_primary_key.is_empty() {
            vec!["id".to_string()]
        } else {
            config.default_primary_key.clone()
        };
        Self {
            exact: config.primary_keys.clone(),
            suffixes,
            default,
        }
    }

    #[must_use]
    pub fn resolve(&self, table: &str) -> Vec<String> {
        if let Some(cols) = self.exact.get(table) {
            return cols.clone();
        }
        let lower = table.to_ascii_lowercase();
        self.suffixes
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix.as_str()))
            .map_or_else(|| self.default.clone(), |(_, cols)| cols.clone())
    }
}

/// Owns `_schema/<table>` and `_meta/<table>`.
///
/// Schemas are written as soon as they change; meta records (counters) are
/// cached and written on `flush()`.
#[derive(Debug)]
pub struct SchemaManager {
    schema_dir: PathBuf,
    meta_dir: PathBuf,
    format: FormatHandler,
    registry: PrimaryKeyRegistry,
    schemas: HashMap<String, Option<TableSchema>>,
    metas: HashMap<String, TableMeta>,
    dirty_meta: HashSet<String>,
}

impl SchemaManager {
    #[must_use]
    pub fn new(root: &std::path::Path, format: FormatHandler, registry: PrimaryKeyRegistry) -> Self {
        Self {
            schema_dir: root.join("_schema"),
            meta_dir: root.join("_meta"),
            format,
            registry,
            schemas: HashMap::new(),
            metas: HashMap::new(),
            dirty_meta: HashSet::new(),
        }
    }

    pub fn schema(&mut self, table: &str) -> Result<Option<TableSchema>, DatabaseError> {
        if let Some(cached) = self.schemas.get(table) {
            return Ok(cached.clone());
        }
        let path = self.format.path_for(&self.schema_dir, table);
        let schema: Option<TableSchema> = self.format.read_as(&path)?;
        self.schemas.insert(table.to_string(), schema.clone());
        Ok(schema)
    }

    pub fn has_schema(&mut self, table: &str) -> Result<bool, DatabaseError> {
        Ok(self.schema(table)?.is_some())
    }

    pub fn save_schema(&mut self, table: &str, schema: TableSchema) -> Result<(), DatabaseError> {
        let path = self.format.path_for(&self.schema_dir, table);
        self.format.write_as(&path, &schema)?;
        self.schemas.insert(table.to_string(), Some(schema));
        Ok(())
    }

    /// Removes schema and meta files for a table.
    pub fn remove(&mut self, table: &str) -> Result<(), DatabaseError> {
        self.format.remove(&self.format.path_for(&self.schema_dir, table))?;
        self.format.remove(&self.format.path_for(&self.meta_dir, table))?;
        self.schemas.insert(table.to_string(), None);
        self.metas.remove(table);
        self.dirty_meta.remove(table);
        Ok(())
    }

    /// Declared primary key, or the registry's answer when none is declared.
    pub fn primary_key(&mut self, table: &str) -> Result<Vec<String>, DatabaseError> {
        match self.schema(table)? {
            Some(schema) if !schema.primary_key.is_empty() => Ok(schema.primary_key),
            _ => Ok(self.registry.resolve(table)),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &PrimaryKeyRegistry {
        &self.registry
    }

    pub fn meta(&mut self, table: &str) -> Result<TableMeta, DatabaseError> {
        if let Some(meta) = self.metas.get(table) {
            return Ok(*meta);
        }
        let path = self.format.path_for(&self.meta_dir, table);
        let meta: TableMeta = self.format.read_as(&path)?.unwrap_or_default();
        self.metas.insert(table.to_string(), meta);
        Ok(meta)
    }

    fn update_meta(&mut self, table: &str, f: impl FnOnce(&mut TableMeta)) -> Result<TableMeta, DatabaseError> {
        let mut meta = self.meta(table)?;
        f(&mut meta);
        self.metas.insert(table.to_string(), meta);
        self.dirty_meta.insert(table.to_string());
        Ok(meta)
    }

    /// Reserves and returns the next auto-increment value.
    pub fn next_auto_increment(&mut self, table: &str) -> Result<i64, DatabaseError> {
        let meta = self.update_meta(table, |m| m.auto_increment += 1)?;
        Ok(meta.auto_increment)
    }

    /// Records an explicitly supplied key so later generated keys exceed it.
    pub fn observe_key(&mut self, table: &str, key: i64) -> Result<(), DatabaseError> {
        if key > self.meta(table)?.auto_increment {
            self.update_meta(table, |m| m.auto_increment = key)?;
        }
        Ok(())
    }

    pub fn adjust_row_count(&mut self, table: &str, delta: i64) -> Result<(), DatabaseError> {
        self.update_meta(table, |m| {
            m.row_count = m.row_count.saturating_add_signed(delta);
        })?;
        Ok(())
    }

    pub fn reset_meta(&mut self, table: &str) -> Result<(), DatabaseError> {
        self.update_meta(table, |m| *m = TableMeta::default())?;
        Ok(())
    }

    /// Tables that have a schema file.
    pub fn list(&self) -> Result<Vec<String>, DatabaseError> {
        self.format.list_stems(&self.schema_dir)
    }

    pub fn flush(&mut self) -> Result<usize, DatabaseError> {
        let mut dirty: Vec<String> = self.dirty_meta.drain().collect();
        dirty.sort();
        for table in &dirty {
            if let Some(meta) = self.metas.get(table) {
                self.format.write_as(&self.format.path_for(&self.meta_dir, table), meta)?;
            }
        }
        if !dirty.is_empty() {
            debug!(tables = dirty.len(), "meta records written");
        }
        Ok(dirty.len())
    }
}
