mod common;
mod ddl;
mod dml;
mod expression;
mod meta;
mod queries;
mod statement;
mod transaction;

pub use common::unescape_quoted;
pub use meta::{MetaQuery, VariableRef};
pub use statement::{
    AlterOperation, AlterTableStatement, BinaryOp, ColumnDef, CompareOp, Condition, ConditionToken,
    CreateTableStatement, DeleteStatement, DropTableStatement, Expr, IndexDef, InsertStatement, Join,
    JoinKind, Limit, OrderItem, Predicate, SelectItem, SelectStatement, ShowStatement, SortOrder,
    Statement, TableRef, UpdateStatement,
};

use crate::core::DatabaseError;
use nom::branch::alt;

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// Parses one SQL statement. The whole input must be consumed.
pub fn parse_statement(sql: &str) -> Result<Statement, DatabaseError> {
    let input = strip_terminator(sql);

    let result = alt((
        queries::select,
        dml::insert,
        dml::replace,
        dml::update,
        dml::delete,
        ddl::create_table,
        ddl::create_index,
        ddl::alter_table,
        ddl::drop_table,
        ddl::truncate_table,
        meta::show,
        meta::set_statement,
    ))(input);

    match result {
        Ok((remaining, stmt)) => {
            if remaining.trim().is_empty() {
                Ok(stmt)
            } else {
                Err(DatabaseError::ParseError(format!(
                    "unexpected input after statement: {}",
                    remaining.trim()
                )))
            }
        }
        Err(e) => Err(DatabaseError::ParseError(format!("{e:?}"))),
    }
}

/// Recognises session/introspection queries that are answered without the grammar.
#[must_use]
pub fn parse_meta(sql: &str) -> Option<MetaQuery> {
    match meta::meta_query(strip_terminator(sql)) {
        Ok((remaining, query)) if remaining.trim().is_empty() => Some(query),
        _ => None,
    }
}
