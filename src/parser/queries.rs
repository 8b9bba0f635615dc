use super::common::{alias, identifier, keyword, keywords, table_name, unsigned, ws};
use super::expression::{condition, value_expr};
use super::statement::{
    Condition, Join, JoinKind, Limit, OrderItem, SelectItem, SelectStatement, SortOrder, Statement,
    TableRef,
};
use nom::{
    branch::alt,
    character::complete::char,
    combinator::{map, opt, value},
    multi::{many0, separated_list1},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

fn select_item(input: &str) -> IResult<&str, SelectItem> {
    alt((
        value(SelectItem::Wildcard, ws(char('*'))),
        map(
            ws(terminated(identifier, tuple((char('.'), char('*'))))),
            SelectItem::TableWildcard,
        ),
        map(pair(ws(value_expr), opt(alias)), |(expr, alias)| SelectItem::Expr { expr, alias }),
    ))(input)
}

/// `name [AS] alias`
pub fn table_ref(input: &str) -> IResult<&str, TableRef> {
    map(pair(ws(table_name), opt(alias)), |(name, alias)| TableRef { name, alias })(input)
}

fn join_kind(input: &str) -> IResult<&str, JoinKind> {
    ws(alt((
        value(JoinKind::Inner, keywords("INNER JOIN")),
        value(JoinKind::Left, keywords("LEFT OUTER JOIN")),
        value(JoinKind::Left, keywords("LEFT JOIN")),
        value(JoinKind::Right, keywords("RIGHT OUTER JOIN")),
        value(JoinKind::Right, keywords("RIGHT JOIN")),
        value(JoinKind::Cross, keywords("CROSS JOIN")),
        value(JoinKind::Inner, keywords("STRAIGHT_JOIN")),
        value(JoinKind::Inner, keywords("JOIN")),
    )))(input)
}

fn join_clause(input: &str) -> IResult<&str, Join> {
    alt((
        map(
            tuple((join_kind, table_ref, opt(preceded(ws(keyword("ON")), condition)))),
            |(kind, table, on)| Join { kind, table, on },
        ),
        // comma join
        map(preceded(ws(char(',')), table_ref), |table| Join {
            kind: JoinKind::Cross,
            table,
            on: None,
        }),
    ))(input)
}

pub fn where_clause(input: &str) -> IResult<&str, Option<Condition>> {
    opt(preceded(ws(keyword("WHERE")), condition))(input)
}

pub fn order_by(input: &str) -> IResult<&str, Vec<OrderItem>> {
    map(
        opt(preceded(
            ws(keywords("ORDER BY")),
            separated_list1(
                ws(char(',')),
                map(
                    pair(
                        ws(value_expr),
                        opt(ws(alt((
                            value(SortOrder::Asc, keyword("ASC")),
                            value(SortOrder::Desc, keyword("DESC")),
                        )))),
                    ),
                    |(expr, order)| OrderItem {
                        expr,
                        order: order.unwrap_or(SortOrder::Asc),
                    },
                ),
            ),
        )),
        Option::unwrap_or_default,
    )(input)
}

fn group_by(input: &str) -> IResult<&str, Vec<super::statement::Expr>> {
    map(
        opt(preceded(
            ws(keywords("GROUP BY")),
            separated_list1(
                ws(char(',')),
                terminated(
                    ws(value_expr),
                    opt(ws(alt((keyword("ASC"), keyword("DESC"))))),
                ),
            ),
        )),
        Option::unwrap_or_default,
    )(input)
}

/// `LIMIT n`, `LIMIT offset, n` or `LIMIT n OFFSET offset`.
pub fn limit(input: &str) -> IResult<&str, Option<Limit>> {
    opt(preceded(
        ws(keyword("LIMIT")),
        alt((
            map(
                tuple((ws(unsigned), ws(char(',')), ws(unsigned))),
                |(offset, _, count)| Limit { count, offset },
            ),
            map(
                pair(ws(unsigned), opt(preceded(ws(keyword("OFFSET")), ws(unsigned)))),
                |(count, offset)| Limit {
                    count,
                    offset: offset.unwrap_or(0),
                },
            ),
        )),
    ))(input)
}

/// Row limit for UPDATE/DELETE (no offset).
pub fn row_limit(input: &str) -> IResult<&str, Option<usize>> {
    opt(preceded(ws(keyword("LIMIT")), ws(unsigned)))(input)
}

pub fn select(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("SELECT"))(input)?;

    let mut distinct = false;
    let mut calc_found_rows = false;
    let (input, modifiers) = many0(ws(alt((
        keyword("DISTINCT"),
        keyword("DISTINCTROW"),
        keyword("ALL"),
        keyword("SQL_CALC_FOUND_ROWS"),
        keyword("SQL_NO_CACHE"),
        keyword("SQL_CACHE"),
        keyword("HIGH_PRIORITY"),
        keyword("STRAIGHT_JOIN"),
    ))))(input)?;
    for modifier in modifiers {
        match modifier.to_ascii_uppercase().as_str() {
            "DISTINCT" | "DISTINCTROW" => distinct = true,
            "SQL_CALC_FOUND_ROWS" => calc_found_rows = true,
            _ => {}
        }
    }

    let (input, columns) = separated_list1(ws(char(',')), select_item)(input)?;
    let (input, from) = opt(preceded(ws(keyword("FROM")), table_ref))(input)?;
    let (input, joins) = if from.is_some() {
        many0(join_clause)(input)?
    } else {
        (input, Vec::new())
    };
    let (input, filter) = where_clause(input)?;
    let (input, group_by) = group_by(input)?;
    let (input, having) = opt(preceded(ws(keyword("HAVING")), condition))(input)?;
    let (input, order_by) = order_by(input)?;
    let (input, limit) = limit(input)?;
    let (input, _) = opt(ws(alt((keywords("FOR UPDATE"), keywords("LOCK IN SHARE MODE")))))(input)?;

    Ok((
        input,
        Statement::Select(Box::new(SelectStatement {
            distinct,
            calc_found_rows,
            columns,
            from,
            joins,
            filter,
            group_by,
            having,
            order_by,
            limit,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::statement::Expr;

    fn parse(sql: &str) -> SelectStatement {
        match select(sql) {
            Ok((rest, Statement::Select(s))) if rest.trim().is_empty() => *s,
            other => panic!("failed to parse {sql}: {other:?}"),
        }
    }

    #[test]
    fn test_full_select() {
        let s = parse(
            "SELECT SQL_CALC_FOUND_ROWS DISTINCT p.*, t.name AS term, COUNT(*) c \
             FROM wp_posts AS p \
             LEFT JOIN wp_terms t ON p.id = t.object_id AND t.kind = 'tag' \
             WHERE p.status = 'publish' \
             GROUP BY p.id HAVING c > 1 \
             ORDER BY p.date DESC, term \
             LIMIT 10, 5",
        );
        assert!(s.distinct && s.calc_found_rows);
        assert_eq!(s.columns.len(), 3);
        assert_eq!(s.columns[0], SelectItem::TableWildcard("p".into()));
        assert!(matches!(&s.columns[1], SelectItem::Expr { alias: Some(a), .. } if a == "term"));
        assert!(matches!(&s.columns[2], SelectItem::Expr { alias: Some(a), .. } if a == "c"));
        assert_eq!(s.from.as_ref().unwrap().reference(), "p");
        assert_eq!(s.joins.len(), 1);
        assert_eq!(s.joins[0].kind, JoinKind::Left);
        assert_eq!(s.joins[0].on.as_ref().unwrap().tokens.len(), 3);
        assert!(s.filter.is_some());
        assert_eq!(s.group_by, vec![Expr::Column { table: Some("p".into()), name: "id".into() }]);
        assert!(s.having.is_some());
        assert_eq!(s.order_by.len(), 2);
        assert_eq!(s.order_by[0].order, SortOrder::Desc);
        assert_eq!(s.limit, Some(Limit { count: 5, offset: 10 }));
    }

    #[test]
    fn test_select_without_from() {
        let s = parse("SELECT 1 + 1, NOW()");
        assert!(s.from.is_none());
        assert_eq!(s.columns.len(), 2);
    }

    #[test]
    fn test_comma_join_and_limit_offset() {
        let s = parse("SELECT * FROM a, b WHERE a.id = b.a_id LIMIT 3 OFFSET 6");
        assert_eq!(s.joins[0].kind, JoinKind::Cross);
        assert_eq!(s.limit, Some(Limit { count: 3, offset: 6 }));
        assert_eq!(s.columns, vec![SelectItem::Wildcard]);
    }

    #[test]
    fn test_table_alias_is_not_a_keyword() {
        let s = parse("SELECT * FROM posts WHERE id = 1");
        assert_eq!(s.from.unwrap().alias, None);
        let s = parse("SELECT * FROM posts ORDER BY id");
        assert_eq!(s.order_by.len(), 1);
    }
}
