use crate::core::DatabaseError;
use crate::storage::FileFormat;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Engine configuration.
///
/// Loaded with priority: ENV (`FLATSQL_*`) > config file > defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage root holding `tables/`, `_schema/`, `_meta/` and `_indexes/`.
    pub data_dir: PathBuf,
    pub format: FileFormat,
    /// Answer for `SELECT DATABASE()`.
    pub database_name: String,
    /// Answer for `SELECT VERSION()` and `@@version`.
    pub server_version: String,
    /// Exact table name → primary key columns, for tables without a declared key.
    pub primary_keys: HashMap<String, Vec<String>>,
    /// Table-name suffix → primary key columns; the longest matching suffix wins.
    pub primary_key_suffixes: HashMap<String, Vec<String>>,
    pub default_primary_key: Vec<String>,
    /// Extra secondary indexes per table, on top of key columns and declared KEYs.
    pub indexed_columns: HashMap<String, Vec<String>>,
    /// Object classes that may be decomposed by the serialization handler.
    pub allowed_classes: Vec<String>,
    /// Propagate parse errors instead of answering with an empty result.
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            format: FileFormat::Json,
            database_name: "flatsql".to_string(),
            server_version: format!("8.0.35-flatsql-{}", env!("CARGO_PKG_VERSION")),
            primary_keys: HashMap::new(),
            primary_key_suffixes: HashMap::new(),
            default_primary_key: vec!["id".to_string()],
            indexed_columns: HashMap::new(),
            allowed_classes: vec!["stdClass".to_string()],
            strict: false,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from an optional TOML file and `FLATSQL_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, DatabaseError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        } else if Path::new("./flatsql.toml").exists() {
            builder = builder.add_source(File::with_name("./flatsql.toml"));
        }
        builder = builder.add_source(Environment::with_prefix("FLATSQL").try_parsing(true));

        let config = builder.build()?.try_deserialize::<Self>()?;
        tracing::debug!(data_dir = %config.data_dir.display(), format = ?config.format, "configuration loaded");
        Ok(config)
    }

    #[must_use]
    pub const fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_primary_key(mut self, table: &str, columns: &[&str]) -> Self {
        self.primary_keys
            .insert(table.to_string(), columns.iter().map(ToString::to_string).collect());
        self
    }

    #[must_use]
    pub fn with_primary_key_suffix(mut self, suffix: &str, columns: &[&str]) -> Self {
        self.primary_key_suffixes
            .insert(suffix.to_string(), columns.iter().map(ToString::to_string).collect());
        self
    }

    #[must_use]
    pub fn with_indexed_column(mut self, table: &str, column: &str) -> Self {
        self.indexed_columns
            .entry(table.to_string())
            .or_default()
            .push(column.to_string());
        self
    }

    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
