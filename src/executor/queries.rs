/// SELECT execution
///
/// Stages run in a fixed order: FROM and JOINs, WHERE, GROUP BY with
/// aggregates, HAVING, ORDER BY, projection, DISTINCT, LIMIT.
use super::conditions::{decode_literal, resolve_column, ExpressionEvaluator};
use super::dispatcher::QueryResult;
use super::session::Session;
use super::storage_adapter::RowSource;
use crate::core::{DatabaseError, Row, Value};
use crate::parser::{Condition, Expr, JoinKind, OrderItem, SelectItem, SelectStatement, SortOrder, TableRef};
use crate::storage::StorageManager;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Joined rows before the unqualified aliases are added: `reference.column` entries only.
type Qualified = Vec<(String, Value)>;

/// One table of the FROM clause with its rows loaded.
struct Source {
    reference: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Source {
    fn load(
        storage: &mut StorageManager,
        table: &TableRef,
        filter: Option<&Condition>,
    ) -> Result<Self, DatabaseError> {
        if !storage.table_exists(&table.name)? {
            return Err(DatabaseError::TableNotFound(table.name.clone()));
        }
        let rows: Vec<Row> = RowSource::candidates(storage, &table.name, filter)?
            .into_iter()
            .map(|(_, row)| row)
            .collect();
        let mut columns: Vec<String> = storage
            .schema(&table.name)?
            .map(|schema| schema.columns.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.to_string());
                }
            }
        }
        Ok(Self {
            reference: table.reference().to_string(),
            columns,
            rows,
        })
    }

    fn qualify(&self, row: Option<&Row>) -> Qualified {
        self.columns
            .iter()
            .map(|column| {
                let value = row.and_then(|r| r.get(column)).cloned().unwrap_or(Value::Null);
                (format!("{}.{column}", self.reference), value)
            })
            .collect()
    }
}

/// Adds unqualified keys to a joined row; the left-most table wins a shared name.
fn assemble(entries: &[(String, Value)]) -> Row {
    let mut row: Row = entries.iter().cloned().collect();
    for (key, value) in entries {
        if let Some((_, column)) = key.split_once('.') {
            if !row.contains(column) {
                row.insert(column.to_string(), value.clone());
            }
        }
    }
    row
}

fn concat(left: &[(String, Value)], right: &[(String, Value)]) -> Qualified {
    left.iter().chain(right).cloned().collect()
}

pub struct SelectExecutor;

impl SelectExecutor {
    pub fn execute(
        storage: &mut StorageManager,
        session: &mut Session,
        select: &SelectStatement,
    ) -> Result<QueryResult, DatabaseError> {
        let (result, found_rows) = Self::run(storage, session, select)?;
        session.found_rows = found_rows;
        Ok(result)
    }

    fn run(
        storage: &mut StorageManager,
        session: &Session,
        select: &SelectStatement,
    ) -> Result<(QueryResult, u64), DatabaseError> {
        let evaluator = ExpressionEvaluator::new(session);
        let (rows, sources) = Self::load_rows(storage, &evaluator, select)?;
        let joined = !select.joins.is_empty();

        let mut rows: Vec<Row> = match &select.filter {
            Some(filter) => rows
                .into_iter()
                .filter(|row| evaluator.evaluate_where(filter, row))
                .collect(),
            None => rows,
        };

        let aggregates = Self::aggregate_calls(select);
        if !select.group_by.is_empty() || !aggregates.is_empty() {
            rows = Self::group(rows, select, &aggregates, &evaluator);
        }
        let hidden: HashSet<String> = aggregates.iter().map(ToString::to_string).collect();

        let evaluator = evaluator.with_aliases(&select.columns);
        if let Some(having) = &select.having {
            rows.retain(|row| evaluator.evaluate_where(having, row));
        }
        if !select.order_by.is_empty() {
            rows = Self::sort(rows, &select.order_by, &select.columns, &evaluator);
        }

        let mut projected: Vec<Row> = rows
            .iter()
            .map(|row| Self::project(row, &select.columns, &evaluator, joined, &hidden))
            .collect();

        if select.distinct {
            let mut seen = HashSet::new();
            projected.retain(|row| seen.insert(row.fingerprint()));
        }

        let total = projected.len();
        if let Some(limit) = select.limit {
            projected = projected.into_iter().skip(limit.offset).take(limit.count).collect();
        }
        let found_rows = if select.calc_found_rows { total } else { projected.len() };

        let columns = match projected.first() {
            Some(row) => row.keys().map(str::to_string).collect(),
            None => Self::column_labels(&select.columns, &sources),
        };
        Ok((QueryResult::rows(columns, projected), found_rows as u64))
    }

    /// FROM plus JOINs. A table-less SELECT evaluates against one empty row.
    fn load_rows(
        storage: &mut StorageManager,
        evaluator: &ExpressionEvaluator<'_>,
        select: &SelectStatement,
    ) -> Result<(Vec<Row>, Vec<Source>), DatabaseError> {
        let Some(from) = &select.from else {
            return Ok((vec![Row::new()], Vec::new()));
        };
        if select.joins.is_empty() {
            let source = Source::load(storage, from, select.filter.as_ref())?;
            let rows = source.rows.clone();
            return Ok((rows, vec![source]));
        }

        let base = Source::load(storage, from, None)?;
        let mut left_rows: Vec<Qualified> = base.rows.iter().map(|r| base.qualify(Some(r))).collect();
        let mut left_null: Qualified = base.qualify(None);
        let mut sources = vec![base];

        for join in &select.joins {
            let right = Source::load(storage, &join.table, None)?;
            let right_rows: Vec<Qualified> = right.rows.iter().map(|r| right.qualify(Some(r))).collect();
            let right_null = right.qualify(None);
            let matches = |left: &Qualified, right: &Qualified| {
                join.on
                    .as_ref()
                    .is_none_or(|on| evaluator.evaluate_where(on, &assemble(&concat(left, right))))
            };

            let mut next = Vec::new();
            if join.kind == JoinKind::Right {
                for r in &right_rows {
                    let before = next.len();
                    next.extend(left_rows.iter().filter(|&l| matches(l, r)).map(|l| concat(l, r)));
                    if next.len() == before {
                        next.push(concat(&left_null, r));
                    }
                }
            } else {
                for l in &left_rows {
                    let before = next.len();
                    next.extend(right_rows.iter().filter(|&r| matches(l, r)).map(|r| concat(l, r)));
                    if next.len() == before && join.kind == JoinKind::Left {
                        next.push(concat(l, &right_null));
                    }
                }
            }
            left_rows = next;
            left_null.extend(right_null);
            sources.push(right);
        }

        Ok((left_rows.iter().map(|entries| assemble(entries)).collect(), sources))
    }

    /// Distinct aggregate calls referenced anywhere in the statement.
    fn aggregate_calls(select: &SelectStatement) -> Vec<&Expr> {
        let mut found = Vec::new();
        for item in &select.columns {
            if let SelectItem::Expr { expr, .. } = item {
                expr.collect_aggregates(&mut found);
            }
        }
        if let Some(having) = &select.having {
            having.collect_aggregates(&mut found);
        }
        for item in &select.order_by {
            item.expr.collect_aggregates(&mut found);
        }
        let mut seen = HashSet::new();
        found.retain(|expr| seen.insert(expr.to_string()));
        found
    }

    /// Collapses rows into one row per group. Each group keeps its first row's
    /// columns and carries every aggregate under the call's text.
    fn group(
        rows: Vec<Row>,
        select: &SelectStatement,
        aggregates: &[&Expr],
        evaluator: &ExpressionEvaluator<'_>,
    ) -> Vec<Row> {
        let mut groups: Vec<Vec<Row>> = Vec::new();
        if select.group_by.is_empty() {
            groups.push(rows);
        } else {
            let mut positions: HashMap<String, usize> = HashMap::new();
            for row in rows {
                let key = select
                    .group_by
                    .iter()
                    .map(|expr| Self::group_key_value(expr, &select.columns, evaluator, &row).to_json().to_string())
                    .collect::<Vec<_>>()
                    .join("\u{1f}");
                match positions.get(&key) {
                    Some(&idx) => groups[idx].push(row),
                    None => {
                        positions.insert(key, groups.len());
                        groups.push(vec![row]);
                    }
                }
            }
        }

        groups
            .into_iter()
            .map(|members| {
                let mut grouped = members.first().cloned().unwrap_or_default();
                for aggregate in aggregates {
                    let value = Aggregate::compute(aggregate, &members, evaluator);
                    grouped.insert(aggregate.to_string(), value);
                }
                grouped
            })
            .collect()
    }

    /// GROUP BY accepts select-list positions and aliases as well as expressions.
    fn group_key_value(
        expr: &Expr,
        items: &[SelectItem],
        evaluator: &ExpressionEvaluator<'_>,
        row: &Row,
    ) -> Value {
        let target = Self::positional(expr, items).or_else(|| match expr {
            Expr::Column { table: None, name } if resolve_column(row, None, name).is_none() => {
                items.iter().find_map(|item| match item {
                    SelectItem::Expr { expr, alias: Some(alias) } if alias.eq_ignore_ascii_case(name) => Some(expr),
                    _ => None,
                })
            }
            _ => None,
        });
        evaluator.evaluate_value(target.unwrap_or(expr), row)
    }

    /// `ORDER BY 2` / `GROUP BY 1`: the n-th select expression.
    fn positional<'a>(expr: &Expr, items: &'a [SelectItem]) -> Option<&'a Expr> {
        let Expr::Literal(raw) = expr else {
            return None;
        };
        let Value::Integer(position) = decode_literal(raw) else {
            return None;
        };
        let index = usize::try_from(position).ok()?.checked_sub(1)?;
        match items.get(index)? {
            SelectItem::Expr { expr, .. } => Some(expr),
            _ => None,
        }
    }

    fn sort(
        rows: Vec<Row>,
        order_by: &[OrderItem],
        items: &[SelectItem],
        evaluator: &ExpressionEvaluator<'_>,
    ) -> Vec<Row> {
        let mut keyed: Vec<(Vec<Value>, Row)> = rows
            .into_iter()
            .map(|row| (Self::order_values(order_by, items, evaluator, &row), row))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| Self::compare_order(a, b, order_by));
        keyed.into_iter().map(|(_, row)| row).collect()
    }

    /// Sort key of one row for an ORDER BY list.
    pub(super) fn order_values(
        order_by: &[OrderItem],
        items: &[SelectItem],
        evaluator: &ExpressionEvaluator<'_>,
        row: &Row,
    ) -> Vec<Value> {
        order_by
            .iter()
            .map(|item| {
                let expr = Self::positional(&item.expr, items).unwrap_or(&item.expr);
                evaluator.evaluate_value(expr, row)
            })
            .collect()
    }

    /// Multi-key comparison; NULL sorts first ascending.
    pub(super) fn compare_order(a: &[Value], b: &[Value], order_by: &[OrderItem]) -> Ordering {
        for ((x, y), item) in a.iter().zip(b).zip(order_by) {
            let ordering = match item.order {
                SortOrder::Asc => x.sort_cmp(y),
                SortOrder::Desc => y.sort_cmp(x),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn project(
        row: &Row,
        items: &[SelectItem],
        evaluator: &ExpressionEvaluator<'_>,
        joined: bool,
        hidden: &HashSet<String>,
    ) -> Row {
        let mut out = Row::new();
        for item in items {
            match item {
                SelectItem::Wildcard => {
                    for (key, value) in row.iter() {
                        if !(joined && key.contains('.')) && !hidden.contains(key) {
                            out.insert(key.to_string(), value.clone());
                        }
                    }
                }
                SelectItem::TableWildcard(reference) => {
                    let prefix = format!("{reference}.");
                    let mut matched = false;
                    for (key, value) in row.iter() {
                        if let Some(column) = key.strip_prefix(&prefix) {
                            out.insert(column.to_string(), value.clone());
                            matched = true;
                        }
                    }
                    if !matched && !joined {
                        for (key, value) in row.iter().filter(|(k, _)| !hidden.contains(*k)) {
                            out.insert(key.to_string(), value.clone());
                        }
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    out.insert(Self::label(expr, alias.as_deref()), evaluator.evaluate_value(expr, row));
                }
            }
        }
        out
    }

    /// Result column name of an expression: its alias, a bare column's name, or the text of the expression.
    fn label(expr: &Expr, alias: Option<&str>) -> String {
        match (alias, expr) {
            (Some(alias), _) => alias.to_string(),
            (None, Expr::Column { name, .. }) => name.clone(),
            (None, other) => other.to_string(),
        }
    }

    fn column_labels(items: &[SelectItem], sources: &[Source]) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        let mut push = |label: &str| {
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        };
        for item in items {
            match item {
                SelectItem::Wildcard => sources.iter().flat_map(|s| &s.columns).for_each(|c| push(c)),
                SelectItem::TableWildcard(reference) => sources
                    .iter()
                    .filter(|s| s.reference == *reference || sources.len() == 1)
                    .flat_map(|s| &s.columns)
                    .for_each(|c| push(c)),
                SelectItem::Expr { expr, alias } => push(&Self::label(expr, alias.as_deref())),
            }
        }
        labels
    }
}

/// Aggregate functions over the rows of one group.
struct Aggregate;

impl Aggregate {
    fn compute(call: &Expr, rows: &[Row], evaluator: &ExpressionEvaluator<'_>) -> Value {
        let Expr::Function {
            name,
            args,
            distinct,
            separator,
        } = call
        else {
            return Value::Null;
        };
        let name = name.to_ascii_uppercase();
        if name == "COUNT" && matches!(args.as_slice(), [] | [Expr::Wildcard]) {
            return Value::Integer(rows.len() as i64);
        }

        let mut values: Vec<Value> = if name == "GROUP_CONCAT" {
            rows.iter()
                .filter_map(|row| {
                    args.iter()
                        .map(|arg| evaluator.evaluate_value(arg, row).to_text())
                        .collect::<Option<String>>()
                        .map(Value::Text)
                })
                .collect()
        } else {
            let Some(arg) = args.first() else {
                return Value::Null;
            };
            rows.iter()
                .map(|row| evaluator.evaluate_value(arg, row))
                .filter(|v| !v.is_null())
                .collect()
        };
        if *distinct {
            let mut seen = HashSet::new();
            values.retain(|v| seen.insert(v.to_json().to_string()));
        }

        match name.as_str() {
            "COUNT" => Value::Integer(values.len() as i64),
            "SUM" => Self::sum(&values),
            "AVG" if values.is_empty() => Value::Null,
            "AVG" => {
                let total: f64 = values.iter().map(|v| v.as_f64().unwrap_or(0.0)).sum();
                Value::Real(total / values.len() as f64)
            }
            "MIN" => values.into_iter().min_by(Value::sort_cmp).unwrap_or(Value::Null),
            "MAX" => values.into_iter().max_by(Value::sort_cmp).unwrap_or(Value::Null),
            "GROUP_CONCAT" if values.is_empty() => Value::Null,
            "GROUP_CONCAT" => {
                let parts: Vec<String> = values.iter().filter_map(Value::to_text).collect();
                Value::Text(parts.join(separator.as_deref().unwrap_or(",")))
            }
            _ => Value::Null,
        }
    }

    /// Integer when every input is an integer and the sum fits; NULL over no rows.
    fn sum(values: &[Value]) -> Value {
        if values.is_empty() {
            return Value::Null;
        }
        let exact = values
            .iter()
            .try_fold(0_i64, |acc, v| v.as_int().and_then(|i| acc.checked_add(i)));
        exact.map_or_else(
            || Value::Real(values.iter().map(|v| v.as_f64().unwrap_or(0.0)).sum()),
            Value::Integer,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::parser::{parse_statement, Statement};
    use tempfile::TempDir;

    fn setup() -> (TempDir, StorageManager, Session) {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::new(dir.path());
        let mut storage = StorageManager::open(&config).unwrap();
        for (id, status, author) in [
            (1, "publish", "ann"),
            (2, "draft", "bob"),
            (3, "publish", "ann"),
            (4, "trash", "cid"),
            (5, "private", "bob"),
        ] {
            let row: Row = [
                ("id", Value::Integer(id)),
                ("status", Value::from(status)),
                ("author", Value::from(author)),
            ]
            .into_iter()
            .collect();
            storage.insert_row("posts", row).unwrap();
        }
        let session = Session::new(&config);
        (dir, storage, session)
    }

    fn query(storage: &mut StorageManager, session: &mut Session, sql: &str) -> QueryResult {
        let Ok(Statement::Select(select)) = parse_statement(sql) else {
            panic!("not a select: {sql}");
        };
        SelectExecutor::execute(storage, session, &select).unwrap()
    }

    fn column(result: &QueryResult, name: &str) -> Vec<Value> {
        result.rows.iter().map(|r| r.get(name).cloned().unwrap_or(Value::Null)).collect()
    }

    #[test]
    fn test_where_order_limit() {
        let (_dir, mut storage, mut session) = setup();
        let result = query(
            &mut storage,
            &mut session,
            "SELECT id FROM posts WHERE status != 'trash' ORDER BY id DESC LIMIT 1, 2",
        );
        assert_eq!(result.columns, vec!["id"]);
        assert_eq!(column(&result, "id"), vec![Value::Integer(3), Value::Integer(2)]);
    }

    #[test]
    fn test_group_by_having() {
        let (_dir, mut storage, mut session) = setup();
        let result = query(
            &mut storage,
            &mut session,
            "SELECT status, COUNT(*) FROM posts GROUP BY status HAVING COUNT(*) >= 2",
        );
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("status"), Some(&Value::from("publish")));
        assert_eq!(result.rows[0].get("COUNT(*)"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_aggregates_without_group_by() {
        let (_dir, mut storage, mut session) = setup();
        let result = query(
            &mut storage,
            &mut session,
            "SELECT COUNT(*) AS n, SUM(id) AS s, AVG(id) AS a, MAX(author) AS m, \
             COUNT(DISTINCT author) AS d, GROUP_CONCAT(DISTINCT author SEPARATOR '|') AS g FROM posts",
        );
        let row = &result.rows[0];
        assert_eq!(row.get("n"), Some(&Value::Integer(5)));
        assert_eq!(row.get("s"), Some(&Value::Integer(15)));
        assert_eq!(row.get("a"), Some(&Value::Real(3.0)));
        assert_eq!(row.get("m"), Some(&Value::from("cid")));
        assert_eq!(row.get("d"), Some(&Value::Integer(3)));
        assert_eq!(row.get("g"), Some(&Value::from("ann|bob|cid")));
    }

    #[test]
    fn test_empty_table_aggregate_yields_one_row() {
        let (_dir, mut storage, mut session) = setup();
        let result = query(&mut storage, &mut session, "SELECT COUNT(*), SUM(id) FROM posts WHERE id > 100");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("COUNT(*)"), Some(&Value::Integer(0)));
        assert_eq!(result.rows[0].get("SUM(id)"), Some(&Value::Null));
    }

    #[test]
    fn test_distinct_and_found_rows() {
        let (_dir, mut storage, mut session) = setup();
        let result = query(
            &mut storage,
            &mut session,
            "SELECT SQL_CALC_FOUND_ROWS DISTINCT author FROM posts ORDER BY author LIMIT 2",
        );
        assert_eq!(column(&result, "author"), vec![Value::from("ann"), Value::from("bob")]);
        assert_eq!(session.found_rows, 3);
    }

    #[test]
    fn test_order_by_alias_and_position() {
        let (_dir, mut storage, mut session) = setup();
        let result = query(
            &mut storage,
            &mut session,
            "SELECT author, COUNT(*) AS c FROM posts GROUP BY author ORDER BY c DESC, 1 ASC",
        );
        assert_eq!(
            column(&result, "author"),
            vec![Value::from("ann"), Value::from("bob"), Value::from("cid")]
        );
    }

    #[test]
    fn test_tableless_select() {
        let (_dir, mut storage, mut session) = setup();
        let result = query(&mut storage, &mut session, "SELECT 1 + 1 AS two, UPPER('x')");
        assert_eq!(result.columns, vec!["two", "UPPER('x')"]);
        assert_eq!(result.rows[0].get("two"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_empty_result_keeps_column_names() {
        let (_dir, mut storage, mut session) = setup();
        let result = query(&mut storage, &mut session, "SELECT * FROM posts WHERE id = 99");
        assert!(result.rows.is_empty());
        assert_eq!(result.columns, vec!["id", "status", "author"]);
    }

    #[test]
    fn test_missing_table_is_not_found() {
        let (_dir, mut storage, mut session) = setup();
        let Ok(Statement::Select(select)) = parse_statement("SELECT * FROM nope") else {
            panic!();
        };
        let err = SelectExecutor::execute(&mut storage, &mut session, &select).unwrap_err();
        assert!(matches!(err, DatabaseError::TableNotFound(t) if t == "nope"));
    }

    #[test]
    fn test_left_join_null_fills() {
        let (_dir, mut storage, mut session) = setup();
        let meta: Row = [("post_id", Value::Integer(1)), ("meta_value", Value::from("x"))]
            .into_iter()
            .collect();
        storage.insert_row("postmeta", meta).unwrap();
        let result = query(
            &mut storage,
            &mut session,
            "SELECT p.id, m.meta_value FROM posts p LEFT JOIN postmeta m ON m.post_id = p.id \
             WHERE p.id <= 2 ORDER BY p.id",
        );
        assert_eq!(column(&result, "meta_value"), vec![Value::from("x"), Value::Null]);

        let result = query(
            &mut storage,
            &mut session,
            "SELECT p.id FROM posts p INNER JOIN postmeta m ON m.post_id = p.id",
        );
        assert_eq!(column(&result, "id"), vec![Value::Integer(1)]);
    }
}
