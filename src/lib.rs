// flatsql - embedded SQL engine over one-file-per-row storage
// Modular architecture: parser -> executor -> storage/index

// Clippy configuration
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::float_cmp)]

// Engine configuration (TOML file + FLATSQL_* environment)
pub mod config;

// Core types: values, rows, schemas, errors, the engine handle
pub mod core;

// SQL parser (nom)
pub mod parser;

// Statement executors and the expression evaluator
pub mod executor;

// File-per-row storage, schemas, format and serialization handlers
pub mod storage;

// Secondary hash indexes
pub mod index;

pub use config::EngineConfig;
pub use core::{Database, DatabaseError, ErrorKind, Row, Value};
pub use executor::{QueryExecutor, QueryResult};
pub use parser::{parse_statement, Statement};
pub use storage::{FileFormat, StorageManager};
