use super::common::{identifier, keyword, keywords, table_name, ws};
use super::expression::{value_expr, value_list};
use super::queries::{order_by, row_limit, table_ref, where_clause};
use super::statement::{DeleteStatement, Expr, InsertStatement, Statement, UpdateStatement};
use nom::{
    branch::alt,
    character::complete::char,
    combinator::{map, opt},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair},
    IResult,
};

fn assignment(input: &str) -> IResult<&str, (String, Expr)> {
    separated_pair(
        ws(map(
            // `t.col = ..` assigns `col`
            pair(identifier, opt(preceded(char('.'), identifier))),
            |(first, second)| second.unwrap_or(first),
        )),
        ws(char('=')),
        ws(value_expr),
    )(input)
}

fn assignments(input: &str) -> IResult<&str, Vec<(String, Expr)>> {
    separated_list1(ws(char(',')), assignment)(input)
}

fn values_rows(input: &str) -> IResult<&str, Vec<Vec<Expr>>> {
    preceded(
        ws(alt((keyword("VALUES"), keyword("VALUE")))),
        separated_list1(
            ws(char(',')),
            map(
                delimited(ws(char('(')), opt(value_list), ws(char(')'))),
                Option::unwrap_or_default,
            ),
        ),
    )(input)
}

/// Shared body of INSERT and REPLACE after the leading verb.
fn insert_body(input: &str) -> IResult<&str, InsertStatement> {
    let (input, modifiers) = many0(ws(alt((
        keyword("IGNORE"),
        keyword("LOW_PRIORITY"),
        keyword("DELAYED"),
        keyword("HIGH_PRIORITY"),
    ))))(input)?;
    let ignore = modifiers.iter().any(|m| m.eq_ignore_ascii_case("IGNORE"));
    let (input, _) = opt(ws(keyword("INTO")))(input)?;
    let (input, table) = ws(table_name)(input)?;

    // INSERT INTO t SET a = 1, b = 2
    if let Ok((input, pairs)) = preceded(ws(keyword("SET")), assignments)(input) {
        let (columns, values) = pairs.into_iter().unzip();
        return Ok((
            input,
            InsertStatement {
                table,
                ignore,
                columns,
                rows: vec![values],
            },
        ));
    }

    let (input, columns) = opt(delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), ws(identifier)),
        ws(char(')')),
    ))(input)?;
    let (input, rows) = values_rows(input)?;

    // ON DUPLICATE KEY UPDATE is accepted and ignored
    let (input, _) = opt(preceded(
        ws(keywords("ON DUPLICATE KEY UPDATE")),
        assignments,
    ))(input)?;

    Ok((
        input,
        InsertStatement {
            table,
            ignore,
            columns: columns.unwrap_or_default(),
            rows,
        },
    ))
}

pub fn insert(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("INSERT"))(input)?;
    map(insert_body, Statement::Insert)(input)
}

pub fn replace(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("REPLACE"))(input)?;
    map(insert_body, Statement::Replace)(input)
}

pub fn update(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("UPDATE"))(input)?;
    let (input, _) = many0(ws(alt((keyword("LOW_PRIORITY"), keyword("IGNORE")))))(input)?;
    let (input, table) = table_ref(input)?;
    let (input, _) = ws(keyword("SET"))(input)?;
    let (input, assignments) = assignments(input)?;
    let (input, filter) = where_clause(input)?;
    let (input, order_by) = order_by(input)?;
    let (input, limit) = row_limit(input)?;

    Ok((
        input,
        Statement::Update(UpdateStatement {
            table,
            assignments,
            filter,
            order_by,
            limit,
        }),
    ))
}

pub fn delete(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("DELETE"))(input)?;
    let (input, _) = many0(ws(alt((keyword("LOW_PRIORITY"), keyword("QUICK"), keyword("IGNORE")))))(input)?;
    let (input, _) = ws(keyword("FROM"))(input)?;
    let (input, table) = table_ref(input)?;
    let (input, filter) = where_clause(input)?;
    let (input, order_by) = order_by(input)?;
    let (input, limit) = row_limit(input)?;

    Ok((
        input,
        Statement::Delete(DeleteStatement {
            table,
            filter,
            order_by,
            limit,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_multi_row() {
        let (rest, stmt) =
            insert("INSERT IGNORE INTO `wp_options` (option_name, option_value) VALUES ('a', 1), ('b', NULL)")
                .unwrap();
        assert!(rest.is_empty());
        let Statement::Insert(insert) = stmt else {
            panic!("expected insert");
        };
        assert!(insert.ignore);
        assert_eq!(insert.table, "wp_options");
        assert_eq!(insert.columns, vec!["option_name", "option_value"]);
        assert_eq!(insert.rows.len(), 2);
        assert_eq!(insert.rows[1][1], Expr::Literal("NULL".into()));
    }

    #[test]
    fn test_insert_set_form() {
        let (_, stmt) = insert("INSERT INTO t SET name = 'x', n = 2").unwrap();
        let Statement::Insert(insert) = stmt else {
            panic!("expected insert");
        };
        assert_eq!(insert.columns, vec!["name", "n"]);
        assert_eq!(insert.rows, vec![vec![Expr::Literal("'x'".into()), Expr::Literal("2".into())]]);
    }

    #[test]
    fn test_replace_without_columns() {
        let (_, stmt) = replace("REPLACE INTO t VALUES (1, 'a')").unwrap();
        let Statement::Replace(insert) = stmt else {
            panic!("expected replace");
        };
        assert!(insert.columns.is_empty());
        assert!(!insert.ignore);
    }

    #[test]
    fn test_update_with_limit() {
        let (rest, stmt) = update("UPDATE t SET n = n + 1, t.name = 'z' WHERE id > 2 ORDER BY id DESC LIMIT 1").unwrap();
        assert!(rest.is_empty());
        let Statement::Update(update) = stmt else {
            panic!("expected update");
        };
        assert_eq!(update.assignments[1].0, "name");
        assert!(update.filter.is_some());
        assert_eq!(update.order_by.len(), 1);
        assert_eq!(update.limit, Some(1));
    }

    #[test]
    fn test_delete() {
        let (rest, stmt) = delete("DELETE FROM t WHERE name LIKE 'a%' LIMIT 5").unwrap();
        assert!(rest.is_empty());
        let Statement::Delete(delete) = stmt else {
            panic!("expected delete");
        };
        assert_eq!(delete.table.name, "t");
        assert_eq!(delete.limit, Some(5));
    }
}
