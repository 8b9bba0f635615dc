/// Statement dispatcher
///
/// Routes a parsed statement to its executor and applies the flush policy:
/// writes from INSERT/REPLACE are persisted at the end of the statement only
/// outside a transaction; UPDATE, DELETE and DDL always flush.
use super::ddl::DdlExecutor;
use super::dml::DmlExecutor;
use super::queries::SelectExecutor;
use super::session::Session;
use crate::core::{DatabaseError, Row};
use crate::parser::Statement;
use crate::storage::StorageManager;
use tracing::debug;

/// Rows plus the affected-row count of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub affected_rows: u64,
}

impl QueryResult {
    #[must_use]
    pub fn rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: 0,
        }
    }

    #[must_use]
    pub fn affected(count: u64) -> Self {
        Self {
            affected_rows: count,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

pub struct QueryExecutor;

impl QueryExecutor {
    pub fn execute(
        storage: &mut StorageManager,
        session: &mut Session,
        statement: &Statement,
        in_transaction: bool,
    ) -> Result<QueryResult, DatabaseError> {
        debug!(kind = statement.kind(), "dispatch");
        let (result, flush) = match statement {
            Statement::Select(select) => (SelectExecutor::execute(storage, session, select)?, false),
            Statement::Insert(insert) => (DmlExecutor::insert(storage, session, insert, false)?, !in_transaction),
            Statement::Replace(insert) => (DmlExecutor::insert(storage, session, insert, true)?, !in_transaction),
            Statement::Update(update) => (DmlExecutor::update(storage, session, update)?, true),
            Statement::Delete(delete) => (DmlExecutor::delete(storage, session, delete)?, true),
            Statement::Create(create) => (DdlExecutor::create_table(storage, create)?, true),
            Statement::Alter(alter) => (DdlExecutor::alter_table(storage, alter)?, true),
            Statement::Drop(drop) => (DdlExecutor::drop_table(storage, drop)?, true),
            Statement::Truncate(table) => (DdlExecutor::truncate_table(storage, table)?, true),
            Statement::Show(show) => (DdlExecutor::show(storage, session, show)?, false),
            Statement::Set(assignment) => {
                debug!(assignment = %assignment, "SET ignored");
                (QueryResult::empty(), false)
            }
            Statement::Unknown(sql) => {
                debug!(sql = %sql, "unrecognised statement answered with an empty result");
                (QueryResult::empty(), false)
            }
        };
        if flush {
            storage.flush()?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::parser::parse_statement;
    use tempfile::TempDir;

    #[test]
    fn test_insert_flush_follows_transaction_state() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::new(dir.path());
        let mut storage = StorageManager::open(&config).unwrap();
        let mut session = Session::new(&config);
        let row_file = dir.path().join("tables").join("t").join("1.json");

        let create = parse_statement("CREATE TABLE t (id INT AUTO_INCREMENT, name TEXT)").unwrap();
        QueryExecutor::execute(&mut storage, &mut session, &create, false).unwrap();

        let insert = parse_statement("INSERT INTO t (name) VALUES ('a')").unwrap();
        QueryExecutor::execute(&mut storage, &mut session, &insert, true).unwrap();
        assert!(!row_file.exists());

        storage.flush().unwrap();
        assert!(row_file.exists());

        let update = parse_statement("UPDATE t SET name = 'b'").unwrap();
        let result = QueryExecutor::execute(&mut storage, &mut session, &update, true).unwrap();
        assert_eq!(result.affected_rows, 1);
        let stored = std::fs::read_to_string(&row_file).unwrap();
        assert!(stored.contains("\"b\""));
    }

    #[test]
    fn test_set_and_unknown_are_empty() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::new(dir.path());
        let mut storage = StorageManager::open(&config).unwrap();
        let mut session = Session::new(&config);
        for statement in [Statement::Set("NAMES utf8".into()), Statement::Unknown("FLUSH".into())] {
            let result = QueryExecutor::execute(&mut storage, &mut session, &statement, false).unwrap();
            assert_eq!(result, QueryResult::empty());
        }
    }
}
