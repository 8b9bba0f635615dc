/// Executor module - runs parsed statements against storage
///
/// Structure:
/// - dispatcher: statement routing, flush policy and `QueryResult`
/// - conditions: expression and WHERE/HAVING evaluation
/// - functions: built-in SQL function library
/// - queries: SELECT (joins, grouping, aggregates, ordering)
/// - dml: INSERT/REPLACE/UPDATE/DELETE
/// - ddl: CREATE/ALTER/DROP/TRUNCATE and SHOW
/// - storage_adapter: candidate-row fetching with the index fast path
/// - session: per-connection state (`LAST_INSERT_ID`, `FOUND_ROWS`, variables)
pub mod conditions;
pub mod ddl;
pub mod dispatcher;
pub mod dml;
pub mod functions;
pub mod queries;
pub mod session;
pub mod storage_adapter;

pub use conditions::{decode_literal, like_matches, ExpressionEvaluator};
pub use ddl::DdlExecutor;
pub use dispatcher::{QueryExecutor, QueryResult};
pub use dml::DmlExecutor;
pub use functions::SqlFunctions;
pub use queries::SelectExecutor;
pub use session::Session;
pub use storage_adapter::RowSource;
