/// DML (Data Manipulation Language) operations
///
/// INSERT, REPLACE, UPDATE and DELETE against the storage manager. Values are
/// evaluated with the expression evaluator; persistence is left to the caller,
/// which flushes according to the transaction depth.
use super::conditions::ExpressionEvaluator;
use super::dispatcher::QueryResult;
use super::queries::SelectExecutor;
use super::session::Session;
use super::storage_adapter::RowSource;
use crate::core::{DatabaseError, Row, Value};
use crate::parser::{Condition, DeleteStatement, InsertStatement, OrderItem, UpdateStatement};
use crate::storage::StorageManager;
use tracing::{debug, warn};

pub struct DmlExecutor;

impl DmlExecutor {
    /// INSERT (and REPLACE when `replace` is set).
    ///
    /// REPLACE deletes an existing row with the same key before inserting, and
    /// counts both the deletion and the insertion as affected rows.
    pub fn insert(
        storage: &mut StorageManager,
        session: &mut Session,
        stmt: &InsertStatement,
        replace: bool,
    ) -> Result<QueryResult, DatabaseError> {
        let columns = Self::target_columns(storage, stmt)?;
        let rows = Self::build_rows(session, stmt, &columns)?;

        let mut affected = 0;
        let mut last_id = None;
        let mut inserted_keys = Vec::new();
        for row in rows {
            if replace {
                if let Some(key) = storage.row_key_for(&stmt.table, &row)? {
                    if storage.delete_row(&stmt.table, &key)? {
                        debug!(table = %stmt.table, key = %key, "replace removed existing row");
                        affected += 1;
                    }
                }
            }
            match storage.insert_row(&stmt.table, row) {
                Ok(inserted) => {
                    affected += 1;
                    last_id = inserted.id.or(last_id);
                    inserted_keys.push(inserted.key);
                }
                Err(DatabaseError::DuplicateKey { table, key }) if stmt.ignore => {
                    debug!(table = %table, key = %key, "insert ignore skipped duplicate");
                }
                Err(e) => {
                    Self::undo_inserts(storage, &stmt.table, &inserted_keys)?;
                    return Err(e);
                }
            }
        }

        if let Some(id) = last_id {
            session.last_insert_id = id;
        }
        Ok(QueryResult::affected(affected))
    }

    /// Drops the still-cached rows of a failed multi-row INSERT so none of it is flushed.
    /// Rows removed by REPLACE stay removed.
    fn undo_inserts(storage: &mut StorageManager, table: &str, keys: &[String]) -> Result<(), DatabaseError> {
        if keys.is_empty() {
            return Ok(());
        }
        warn!(table, rows = keys.len(), "insert failed part way, dropping rows already added");
        for key in keys.iter().rev() {
            storage.delete_row(table, key)?;
        }
        Ok(())
    }

    /// Column names for the VALUES tuples: the listed ones, or the schema order.
    fn target_columns(storage: &mut StorageManager, stmt: &InsertStatement) -> Result<Vec<String>, DatabaseError> {
        if !stmt.columns.is_empty() {
            return Ok(stmt.columns.clone());
        }
        match storage.schema(&stmt.table)? {
            Some(schema) if !schema.columns.is_empty() => Ok(schema.columns.into_iter().map(|c| c.name).collect()),
            _ => Err(DatabaseError::TableNotFound(stmt.table.clone())),
        }
    }

    fn build_rows(session: &Session, stmt: &InsertStatement, columns: &[String]) -> Result<Vec<Row>, DatabaseError> {
        let evaluator = ExpressionEvaluator::new(session);
        let empty = Row::new();
        stmt.rows
            .iter()
            .enumerate()
            .map(|(n, values)| {
                if values.len() != columns.len() {
                    return Err(DatabaseError::ParseError(format!(
                        "column count doesn't match value count at row {}",
                        n + 1
                    )));
                }
                Ok(columns
                    .iter()
                    .zip(values)
                    .map(|(column, expr)| (column.clone(), evaluator.evaluate_value(expr, &empty)))
                    .collect())
            })
            .collect()
    }

    /// Rows of `table` matching `filter`, ordered and limited.
    fn matching_rows(
        storage: &mut StorageManager,
        session: &Session,
        table: &str,
        filter: Option<&Condition>,
        order_by: &[OrderItem],
        limit: Option<usize>,
    ) -> Result<Vec<(String, Row)>, DatabaseError> {
        if !storage.table_exists(table)? {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }
        let evaluator = ExpressionEvaluator::new(session);
        let mut rows: Vec<(String, Row)> = RowSource::candidates(storage, table, filter)?
            .into_iter()
            .filter(|(_, row)| filter.is_none_or(|f| evaluator.evaluate_where(f, row)))
            .collect();

        if !order_by.is_empty() {
            let mut keyed: Vec<(Vec<Value>, (String, Row))> = rows
                .into_iter()
                .map(|entry| (SelectExecutor::order_values(order_by, &[], &evaluator, &entry.1), entry))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| SelectExecutor::compare_order(a, b, order_by));
            rows = keyed.into_iter().map(|(_, entry)| entry).collect();
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    /// UPDATE. Assignments see the values set by earlier assignments of the
    /// same row. Affected rows are the rows matched.
    pub fn update(
        storage: &mut StorageManager,
        session: &Session,
        stmt: &UpdateStatement,
    ) -> Result<QueryResult, DatabaseError> {
        let table = &stmt.table.name;
        let rows = Self::matching_rows(
            storage,
            session,
            table,
            stmt.filter.as_ref(),
            &stmt.order_by,
            stmt.limit,
        )?;
        let evaluator = ExpressionEvaluator::new(session);

        let mut affected = 0;
        for (key, mut row) in rows {
            let mut changes = Row::new();
            for (column, expr) in &stmt.assignments {
                let value = evaluator.evaluate_value(expr, &row);
                row.insert(column.clone(), value.clone());
                changes.insert(column.clone(), value);
            }
            if storage.update_row(table, &key, &changes)? {
                affected += 1;
            }
        }
        debug!(table = %table, affected, "update");
        Ok(QueryResult::affected(affected))
    }

    pub fn delete(
        storage: &mut StorageManager,
        session: &Session,
        stmt: &DeleteStatement,
    ) -> Result<QueryResult, DatabaseError> {
        let table = &stmt.table.name;
        let rows = Self::matching_rows(
            storage,
            session,
            table,
            stmt.filter.as_ref(),
            &stmt.order_by,
            stmt.limit,
        )?;

        let mut affected = 0;
        for (key, _) in rows {
            if storage.delete_row(table, &key)? {
                affected += 1;
            }
        }
        debug!(table = %table, affected, "delete");
        Ok(QueryResult::affected(affected))
    }
}
