use super::common::{alias, identifier, keyword, keywords, string_body, table_name, ws};
use super::statement::{ShowStatement, Statement};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, opt, rest, value},
    multi::separated_list1,
    sequence::{preceded, terminated, tuple},
    IResult,
};

/// Session and introspection chatter answered without touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaQuery {
    Begin,
    Commit,
    Rollback,
    Set(String),
    /// `SELECT VERSION()`; the label is the alias or the call as written.
    Version { label: String },
    DatabaseName { label: String },
    FoundRows { label: String },
    LastInsertId { label: String },
    Variables(Vec<VariableRef>),
    Describe(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    /// Lowercased, scope stripped.
    pub name: String,
    /// Column heading: the alias, or `@@name` as written.
    pub label: String,
}

fn from_or_in(input: &str) -> IResult<&str, &str> {
    ws(alt((keyword("FROM"), keyword("IN"))))(input)
}

/// `FROM tbl [FROM db]`
fn show_target(input: &str) -> IResult<&str, String> {
    terminated(
        preceded(from_or_in, ws(table_name)),
        opt(preceded(from_or_in, ws(identifier))),
    )(input)
}

fn show_tables(input: &str) -> IResult<&str, ShowStatement> {
    let (input, _) = opt(ws(keyword("FULL")))(input)?;
    let (input, _) = ws(keyword("TABLES"))(input)?;
    let (input, _) = opt(preceded(from_or_in, ws(identifier)))(input)?;
    let (input, like) = opt(preceded(ws(keyword("LIKE")), ws(string_body)))(input)?;
    Ok((input, ShowStatement::Tables { like }))
}

fn show_columns(input: &str) -> IResult<&str, ShowStatement> {
    let (input, full) = opt(ws(keyword("FULL")))(input)?;
    let (input, _) = ws(alt((keyword("COLUMNS"), keyword("FIELDS"))))(input)?;
    let (input, table) = show_target(input)?;
    let (input, _) = opt(preceded(ws(keyword("LIKE")), ws(string_body)))(input)?;
    Ok((
        input,
        ShowStatement::Columns {
            table,
            full: full.is_some(),
        },
    ))
}

fn show_index(input: &str) -> IResult<&str, ShowStatement> {
    let (input, _) = ws(alt((keyword("INDEXES"), keyword("INDEX"), keyword("KEYS"))))(input)?;
    let (input, table) = show_target(input)?;
    Ok((input, ShowStatement::Index { table }))
}

fn show_create_table(input: &str) -> IResult<&str, ShowStatement> {
    let (input, _) = ws(keywords("CREATE TABLE"))(input)?;
    let (input, table) = ws(table_name)(input)?;
    Ok((input, ShowStatement::CreateTable { table }))
}

pub fn show(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("SHOW"))(input)?;
    let (input, show) = alt((
        show_tables,
        show_columns,
        show_index,
        show_create_table,
        map(rest, |other: &str| ShowStatement::Other(other.trim().to_string())),
    ))(input)?;
    Ok((input, Statement::Show(show)))
}

fn set_body(input: &str) -> IResult<&str, String> {
    let (input, _) = ws(keyword("SET"))(input)?;
    let (input, assignment) = rest(input)?;
    Ok((input, assignment.trim().to_string()))
}

pub fn set_statement(input: &str) -> IResult<&str, Statement> {
    map(set_body, Statement::Set)(input)
}

/// `name()` with an optional alias; returns the heading.
fn niladic_call<'a>(name: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    move |input: &'a str| {
        let (input, _) = ws(keyword(name))(input)?;
        let (input, _) = tuple((ws(char('(')), ws(char(')'))))(input)?;
        let (input, label) = opt(alias)(input)?;
        Ok((input, label.unwrap_or_else(|| format!("{name}()"))))
    }
}

fn variable_ref(input: &str) -> IResult<&str, VariableRef> {
    let (input, _) = ws(tag("@@"))(input)?;
    let (input, scope) = opt(terminated(
        alt((keyword("SESSION"), keyword("GLOBAL"), keyword("LOCAL"))),
        char('.'),
    ))(input)?;
    let (input, name) = identifier(input)?;
    let (input, label) = opt(alias)(input)?;
    let written = match scope {
        Some(scope) => format!("@@{scope}.{name}"),
        None => format!("@@{name}"),
    };
    Ok((
        input,
        VariableRef {
            name: name.to_ascii_lowercase(),
            label: label.unwrap_or(written),
        },
    ))
}

fn select_meta(input: &str) -> IResult<&str, MetaQuery> {
    let (input, _) = ws(keyword("SELECT"))(input)?;
    alt((
        map(niladic_call("VERSION"), |label| MetaQuery::Version { label }),
        map(niladic_call("DATABASE"), |label| MetaQuery::DatabaseName { label }),
        map(niladic_call("SCHEMA"), |label| MetaQuery::DatabaseName { label }),
        map(niladic_call("FOUND_ROWS"), |label| MetaQuery::FoundRows { label }),
        map(niladic_call("LAST_INSERT_ID"), |label| MetaQuery::LastInsertId { label }),
        map(separated_list1(ws(char(',')), variable_ref), MetaQuery::Variables),
    ))(input)
}

fn describe(input: &str) -> IResult<&str, MetaQuery> {
    let (input, _) = ws(alt((keyword("DESCRIBE"), keyword("DESC"), keyword("EXPLAIN"))))(input)?;
    map(ws(table_name), MetaQuery::Describe)(input)
}

pub fn meta_query(input: &str) -> IResult<&str, MetaQuery> {
    alt((
        value(MetaQuery::Begin, super::transaction::begin_transaction),
        value(MetaQuery::Commit, super::transaction::commit_transaction),
        value(MetaQuery::Rollback, super::transaction::rollback_transaction),
        map(set_body, MetaQuery::Set),
        select_meta,
        describe,
    ))(input)
}
