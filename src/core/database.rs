use super::error::DatabaseError;
use super::value::Value;
use super::row::Row;
use crate::config::EngineConfig;
use crate::executor::{DdlExecutor, QueryExecutor, QueryResult, Session};
use crate::parser::{self, MetaQuery, Statement};
use crate::storage::StorageManager;
use tracing::{debug, warn};

/// The engine handle: storage, session state and the transaction counter.
///
/// Transactions only nest a counter. `commit` flushes when the outermost level
/// closes; `roll_back` closes a level without undoing cached writes.
#[derive(Debug)]
pub struct Database {
    config: EngineConfig,
    storage: StorageManager,
    session: Session,
    transaction_depth: u32,
}

impl Database {
    pub fn open(config: EngineConfig) -> Result<Self, DatabaseError> {
        let storage = StorageManager::open(&config)?;
        let session = Session::new(&config);
        Ok(Self {
            config,
            storage,
            session,
            transaction_depth: 0,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct access for hosts that read or write rows without SQL.
    pub fn storage(&mut self) -> &mut StorageManager {
        &mut self.storage
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn last_insert_id(&self) -> i64 {
        self.session.last_insert_id
    }

    #[must_use]
    pub const fn found_rows(&self) -> u64 {
        self.session.found_rows
    }

    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.transaction_depth > 0
    }

    pub fn begin_transaction(&mut self) {
        self.transaction_depth += 1;
        debug!(depth = self.transaction_depth, "begin");
    }

    pub fn commit(&mut self) -> Result<(), DatabaseError> {
        self.transaction_depth = self.transaction_depth.saturating_sub(1);
        debug!(depth = self.transaction_depth, "commit");
        if self.transaction_depth == 0 {
            self.storage.flush()?;
        }
        Ok(())
    }

    /// Closes one level. Cached writes are kept and reach disk on the next flush.
    pub fn roll_back(&mut self) {
        self.transaction_depth = self.transaction_depth.saturating_sub(1);
        debug!(depth = self.transaction_depth, "rollback has nothing to undo");
    }

    pub fn flush(&mut self) -> Result<usize, DatabaseError> {
        self.storage.flush()
    }

    /// Executes one SQL statement.
    ///
    /// Session chatter is answered before parsing. Text the grammar rejects
    /// yields an empty result, or a `ParseError` when the engine is strict.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult, DatabaseError> {
        if let Some(meta) = parser::parse_meta(sql) {
            return self.execute_meta(meta);
        }
        let statement = match parser::parse_statement(sql) {
            Ok(statement) => statement,
            Err(e) if self.config.strict => return Err(e),
            Err(e) => {
                warn!(error = %e, sql, "statement not understood, returning an empty result");
                Statement::Unknown(sql.to_string())
            }
        };
        self.execute_statement(&statement)
    }

    pub fn execute_statement(&mut self, statement: &Statement) -> Result<QueryResult, DatabaseError> {
        QueryExecutor::execute(
            &mut self.storage,
            &mut self.session,
            statement,
            self.transaction_depth > 0,
        )
    }

    fn execute_meta(&mut self, meta: MetaQuery) -> Result<QueryResult, DatabaseError> {
        let single = |label: String, value: Value| {
            let row: Row = [(label.clone(), value)].into_iter().collect();
            QueryResult::rows(vec![label], vec![row])
        };
        Ok(match meta {
            MetaQuery::Begin => {
                self.begin_transaction();
                QueryResult::empty()
            }
            MetaQuery::Commit => {
                self.commit()?;
                QueryResult::empty()
            }
            MetaQuery::Rollback => {
                self.roll_back();
                QueryResult::empty()
            }
            MetaQuery::Set(assignment) => {
                debug!(assignment = %assignment, "SET ignored");
                QueryResult::empty()
            }
            MetaQuery::Version { label } => single(label, Value::Text(self.session.server_version.clone())),
            MetaQuery::DatabaseName { label } => single(label, Value::Text(self.session.database_name.clone())),
            MetaQuery::FoundRows { label } => single(label, Value::Integer(self.session.found_rows as i64)),
            MetaQuery::LastInsertId { label } => single(label, Value::Integer(self.session.last_insert_id)),
            MetaQuery::Variables(variables) => {
                let row: Row = variables
                    .iter()
                    .map(|v| (v.label.clone(), self.session.variable(&v.name)))
                    .collect();
                QueryResult::rows(variables.into_iter().map(|v| v.label).collect(), vec![row])
            }
            MetaQuery::Describe(table) => DdlExecutor::show_columns(&mut self.storage, &table, false)?,
        })
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.storage.flush() {
            warn!(error = %e, "flush on close failed");
        }
    }
}
