/// Row fetching for single-table statements.
///
/// SELECT, UPDATE and DELETE all start from the candidate rows of one table.
/// When the WHERE clause is exactly `column = literal` on an indexed column, and
/// the index's text keys agree with SQL equality for that literal, the candidates
/// come from the index; otherwise every row is scanned. Callers always re-apply
/// the full WHERE clause to the candidates.
use super::conditions::decode_literal;
use crate::core::{Column, DataType, DatabaseError, Row, Value};
use crate::index::NULL_KEY;
use crate::parser::{CompareOp, Condition, Expr, Predicate};
use crate::storage::table_store::compare_row_keys;
use crate::storage::StorageManager;
use tracing::debug;

/// Integers below this magnitude survive a round trip through `f64`.
const EXACT_INTEGER_LIMIT: u64 = 1 << 53;

pub struct RowSource;

impl RowSource {
    /// The `(column, value)` of a WHERE that an index might answer.
    #[must_use]
    pub fn index_probe(filter: Option<&Condition>) -> Option<(&str, Value)> {
        let Predicate::Compare {
            left,
            op: CompareOp::Eq,
            right,
        } = filter?.as_single()?
        else {
            return None;
        };
        let (column, literal) = match (left, right) {
            (Expr::Column { name, .. }, Expr::Literal(raw)) | (Expr::Literal(raw), Expr::Column { name, .. }) => {
                (name.as_str(), raw)
            }
            _ => return None,
        };
        match decode_literal(literal) {
            Value::Null => None,
            value => Some((column, value)),
        }
    }

    /// The value to look up for `literal` in an index over a `data_type` column.
    ///
    /// Index keys are the text form of the stored value, while comparison treats
    /// two numeric-looking values as numbers. A numeric literal is only looked up
    /// where coercion leaves one spelling per number: integer columns within the
    /// exact `f64` range and non-zero values in float columns. Non-numeric text
    /// matches by text on any column except binary ones.
    #[must_use]
    pub fn lookup_value(data_type: DataType, literal: Value) -> Option<Value> {
        let value = data_type.coerce(literal);
        if value.as_f64().is_none() {
            let by_text =
                data_type != DataType::Binary && matches!(&value, Value::Text(s) if s.as_str() != NULL_KEY);
            return by_text.then_some(value);
        }
        match (data_type, value) {
            (DataType::Integer, Value::Integer(n)) if n.unsigned_abs() < EXACT_INTEGER_LIMIT => {
                Some(Value::Integer(n))
            }
            (DataType::Float, Value::Real(f)) if f != 0.0 => Some(Value::Real(f)),
            _ => None,
        }
    }

    /// Candidate `(row key, row)` pairs of `table` for `filter`, in row-key order.
    pub fn candidates(
        storage: &mut StorageManager,
        table: &str,
        filter: Option<&Condition>,
    ) -> Result<Vec<(String, Row)>, DatabaseError> {
        if let Some((column, literal)) = Self::index_probe(filter) {
            if let Some(column) = Self::schema_column(storage, table, column)? {
                if storage.is_indexed(table, &column.name)? {
                    match Self::lookup_value(column.data_type, literal) {
                        Some(value) => return Self::fetch_indexed(storage, table, &column.name, &value),
                        None => debug!(table, column = %column.name, "literal not index-comparable, scanning"),
                    }
                }
            }
        }
        storage.get_all_rows(table)
    }

    fn fetch_indexed(
        storage: &mut StorageManager,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Vec<(String, Row)>, DatabaseError> {
        let mut keys = storage.find_by_value(table, column, value)?;
        keys.sort_by(|a, b| compare_row_keys(a, b));
        keys.dedup();
        debug!(table, column, hits = keys.len(), "index lookup");
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(row) = storage.get_row(table, &key)? {
                rows.push((key, row));
            }
        }
        Ok(rows)
    }

    /// Declared column, matched case-insensitively so `WHERE ID = 1` finds the `id` index.
    fn schema_column(
        storage: &mut StorageManager,
        table: &str,
        column: &str,
    ) -> Result<Option<Column>, DatabaseError> {
        Ok(storage
            .schema(table)?
            .and_then(|schema| schema.column(column).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_statement, Statement};

    fn filter(sql: &str) -> Condition {
        match parse_statement(sql) {
            Ok(Statement::Select(select)) => select.filter.expect("filter"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_index_probe_shapes() {
        let f = filter("SELECT * FROM t WHERE id = 5");
        assert_eq!(RowSource::index_probe(Some(&f)), Some(("id", Value::Integer(5))));

        let f = filter("SELECT * FROM t WHERE 'x' = slug");
        assert_eq!(RowSource::index_probe(Some(&f)), Some(("slug", Value::from("x"))));

        for sql in [
            "SELECT * FROM t WHERE id > 5",
            "SELECT * FROM t WHERE id = 5 AND name = 'a'",
            "SELECT * FROM t WHERE id = NULL",
            "SELECT * FROM t WHERE a = b",
        ] {
            let f = filter(sql);
            assert_eq!(RowSource::index_probe(Some(&f)), None, "{sql}");
        }
        assert_eq!(RowSource::index_probe(None), None);
    }

    #[test]
    fn test_lookup_value_on_integer_columns() {
        let lookup = |v: Value| RowSource::lookup_value(DataType::Integer, v);
        assert_eq!(lookup(Value::Integer(5)), Some(Value::Integer(5)));
        for text in ["01", "1.0", " 1", "+1"] {
            assert_eq!(lookup(Value::from(text)), Some(Value::Integer(1)), "{text:?}");
        }
        assert_eq!(lookup(Value::Real(2.0)), Some(Value::Integer(2)));
        assert_eq!(lookup(Value::from("abc")), Some(Value::from("abc")));
        assert_eq!(lookup(Value::from("1.5")), None);
        assert_eq!(lookup(Value::Integer(1 << 53)), None);
        assert_eq!(lookup(Value::from(NULL_KEY)), None);
    }

    #[test]
    fn test_lookup_value_on_text_columns() {
        let lookup = |v: Value| RowSource::lookup_value(DataType::String, v);
        assert_eq!(lookup(Value::from("siteurl")), Some(Value::from("siteurl")));
        assert_eq!(lookup(Value::Integer(7)), None);
        assert_eq!(lookup(Value::from("7")), None);
        assert_eq!(lookup(Value::from(" 7.0")), None);
        assert_eq!(RowSource::lookup_value(DataType::Float, Value::Integer(3)), Some(Value::Real(3.0)));
        assert_eq!(RowSource::lookup_value(DataType::Float, Value::Integer(0)), None);
        assert_eq!(RowSource::lookup_value(DataType::Binary, Value::from("abc")), None);
    }
}
