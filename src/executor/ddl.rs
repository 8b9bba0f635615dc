/// DDL (Data Definition Language) operations
///
/// CREATE/ALTER/DROP/TRUNCATE TABLE and the SHOW family. Statements against a
/// missing table degrade to no-ops instead of errors, except SHOW COLUMNS,
/// SHOW INDEX and SHOW CREATE TABLE which report the table as not found.
use super::conditions::{decode_literal, like_matches};
use super::dispatcher::QueryResult;
use super::session::Session;
use crate::core::{Column, DatabaseError, Row, TableSchema, Value};
use crate::parser::{
    AlterOperation, AlterTableStatement, ColumnDef, CreateTableStatement, DropTableStatement, Expr,
    ShowStatement,
};
use crate::storage::StorageManager;
use tracing::{debug, warn};

pub struct DdlExecutor;

impl DdlExecutor {
    fn column_from_def(def: &ColumnDef) -> Column {
        let mut column = Column::new(def.name.clone(), def.data_type);
        column.nullable = def.nullable && !def.primary_key;
        if def.auto_increment {
            column = column.auto_increment();
        }
        // only literal defaults are stored; CURRENT_TIMESTAMP and friends are left to the writer
        if let Some(Expr::Literal(raw)) = &def.default {
            let value = decode_literal(raw);
            if !value.is_null() {
                column = column.with_default(def.data_type.coerce(value));
            }
        }
        column
    }

    pub fn create_table(storage: &mut StorageManager, stmt: &CreateTableStatement) -> Result<QueryResult, DatabaseError> {
        if storage.schema(&stmt.name)?.is_some() {
            debug!(table = %stmt.name, if_not_exists = stmt.if_not_exists, "create skipped, table exists");
            return Ok(QueryResult::affected(0));
        }

        let columns: Vec<Column> = stmt.columns.iter().map(Self::column_from_def).collect();
        let primary_key = if !stmt.primary_key.is_empty() {
            stmt.primary_key.clone()
        } else if let Some(def) = stmt.columns.iter().find(|c| c.primary_key) {
            vec![def.name.clone()]
        } else {
            // an AUTO_INCREMENT column stands in for an undeclared key
            columns
                .iter()
                .find(|c| c.auto_increment)
                .map(|c| vec![c.name.clone()])
                .unwrap_or_default()
        };

        let mut schema = TableSchema::new(columns, primary_key);
        for index in &stmt.indexes {
            for column in &index.columns {
                schema.add_index(column);
            }
        }
        for def in stmt.columns.iter().filter(|c| c.unique) {
            schema.add_index(&def.name);
        }

        debug!(table = %stmt.name, columns = schema.columns.len(), key = ?schema.primary_key, "create table");
        storage.create_table(&stmt.name, schema)?;
        Ok(QueryResult::affected(0))
    }

    pub fn alter_table(storage: &mut StorageManager, stmt: &AlterTableStatement) -> Result<QueryResult, DatabaseError> {
        let table = stmt.name.as_str();
        if !storage.table_exists(table)? {
            debug!(table, "alter skipped, table does not exist");
            return Ok(QueryResult::affected(0));
        }
        let mut schema = storage.schema(table)?.unwrap_or_default();
        let mut new_indexes: Vec<String> = Vec::new();

        for operation in &stmt.operations {
            match operation {
                AlterOperation::AddColumn(def) => {
                    let column = Self::column_from_def(def);
                    storage.add_column_to_rows(table, &column)?;
                    schema.add_column(column);
                    if def.primary_key {
                        schema.primary_key = vec![def.name.clone()];
                    }
                    if def.unique {
                        schema.add_index(&def.name);
                        new_indexes.push(def.name.clone());
                    }
                }
                AlterOperation::DropColumn(name) => {
                    let name = Self::declared_name(&schema, name);
                    schema.drop_column(&name);
                    storage.drop_column_from_rows(table, &name)?;
                }
                AlterOperation::ModifyColumn(def) => {
                    let name = Self::declared_name(&schema, &def.name);
                    let mut column = Self::column_from_def(def);
                    column.name.clone_from(&name);
                    schema.change_column(&name, column);
                }
                AlterOperation::ChangeColumn { old_name, column } => {
                    let old_name = Self::declared_name(&schema, old_name);
                    schema.change_column(&old_name, Self::column_from_def(column));
                    storage.rename_column_in_rows(table, &old_name, &column.name)?;
                    if schema.indexes.contains(&column.name) || schema.primary_key.contains(&column.name) {
                        new_indexes.push(column.name.clone());
                    }
                }
                AlterOperation::AddIndex(index) => {
                    for column in &index.columns {
                        let column = Self::declared_name(&schema, column);
                        schema.add_index(&column);
                        new_indexes.push(column);
                    }
                }
                AlterOperation::AddPrimaryKey(columns) => {
                    schema.primary_key = columns.iter().map(|c| Self::declared_name(&schema, c)).collect();
                    new_indexes.extend(schema.primary_key.iter().cloned());
                }
                AlterOperation::DropIndex(name) => {
                    // index names are not stored; a KEY named after its column is the common case
                    let column = Self::declared_name(&schema, name);
                    if schema.indexes.contains(&column) {
                        schema.indexes.retain(|c| *c != column);
                        storage.drop_index(table, &column);
                    } else {
                        debug!(table, index = %name, "drop of unknown index ignored");
                    }
                }
                AlterOperation::DropPrimaryKey => schema.primary_key.clear(),
            }
        }

        storage.save_schema(table, schema)?;
        for column in new_indexes {
            storage.rebuild_index(table, &column)?;
        }
        Ok(QueryResult::affected(0))
    }

    /// The schema's spelling of a column name, matched case-insensitively.
    fn declared_name(schema: &TableSchema, name: &str) -> String {
        schema
            .column(name)
            .map_or_else(|| name.to_string(), |c| c.name.clone())
    }

    pub fn drop_table(storage: &mut StorageManager, stmt: &DropTableStatement) -> Result<QueryResult, DatabaseError> {
        for name in &stmt.names {
            if !storage.drop_table(name)? {
                if stmt.if_exists {
                    debug!(table = %name, "drop skipped, table does not exist");
                } else {
                    warn!(table = %name, "drop of missing table ignored");
                }
            }
        }
        Ok(QueryResult::affected(0))
    }

    pub fn truncate_table(storage: &mut StorageManager, table: &str) -> Result<QueryResult, DatabaseError> {
        if !storage.truncate_table(table)? {
            warn!(table, "truncate of missing table ignored");
        }
        Ok(QueryResult::affected(0))
    }

    pub fn show(
        storage: &mut StorageManager,
        session: &Session,
        stmt: &ShowStatement,
    ) -> Result<QueryResult, DatabaseError> {
        match stmt {
            ShowStatement::Tables { like } => Self::show_tables(storage, session, like.as_deref()),
            ShowStatement::Columns { table, full } => Self::show_columns(storage, table, *full),
            ShowStatement::Index { table } => Self::show_index(storage, table),
            ShowStatement::CreateTable { table } => Self::show_create_table(storage, table),
            ShowStatement::Other(what) => {
                debug!(what = %what, "unsupported SHOW answered with an empty result");
                Ok(QueryResult::rows(Vec::new(), Vec::new()))
            }
        }
    }

    fn show_tables(storage: &StorageManager, session: &Session, like: Option<&str>) -> Result<QueryResult, DatabaseError> {
        let label = format!("Tables_in_{}", session.database_name);
        let rows: Vec<Row> = storage
            .list_tables()?
            .into_iter()
            .filter(|name| like.is_none_or(|pattern| like_matches(name, pattern)))
            .map(|name| [(label.as_str(), Value::Text(name))].into_iter().collect::<Row>())
            .collect();
        Ok(QueryResult::rows(vec![label], rows))
    }

    fn existing_schema(storage: &mut StorageManager, table: &str) -> Result<TableSchema, DatabaseError> {
        if !storage.table_exists(table)? {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }
        let mut schema = storage.schema(table)?.unwrap_or_default();
        if schema.primary_key.is_empty() {
            schema.primary_key = storage.primary_key(table)?;
        }
        Ok(schema)
    }

    /// Also answers `DESCRIBE t`.
    pub fn show_columns(storage: &mut StorageManager, table: &str, full: bool) -> Result<QueryResult, DatabaseError> {
        let schema = Self::existing_schema(storage, table)?;
        let indexed = storage.indexed_columns(table)?;
        let mut labels = vec!["Field", "Type"];
        if full {
            labels.push("Collation");
        }
        labels.extend(["Null", "Key", "Default", "Extra"]);
        if full {
            labels.extend(["Privileges", "Comment"]);
        }

        let rows = schema
            .columns
            .iter()
            .map(|column| {
                let key = if schema.primary_key.contains(&column.name) {
                    "PRI"
                } else if indexed.contains(&column.name) {
                    "MUL"
                } else {
                    ""
                };
                let mut row = Row::new();
                row.insert("Field".into(), Value::Text(column.name.clone()));
                row.insert("Type".into(), Value::from(column.data_type.sql_name()));
                if full {
                    let collation = match column.data_type {
                        crate::core::DataType::String | crate::core::DataType::Json => Value::from("utf8mb4_unicode_ci"),
                        _ => Value::Null,
                    };
                    row.insert("Collation".into(), collation);
                }
                row.insert("Null".into(), Value::from(if column.nullable { "YES" } else { "NO" }));
                row.insert("Key".into(), Value::from(key));
                row.insert("Default".into(), column.default.clone().unwrap_or(Value::Null));
                row.insert(
                    "Extra".into(),
                    Value::from(if column.auto_increment { "auto_increment" } else { "" }),
                );
                if full {
                    row.insert("Privileges".into(), Value::from("select,insert,update,references"));
                    row.insert("Comment".into(), Value::from(""));
                }
                row
            })
            .collect();
        Ok(QueryResult::rows(labels.into_iter().map(String::from).collect(), rows))
    }

    fn show_index(storage: &mut StorageManager, table: &str) -> Result<QueryResult, DatabaseError> {
        let schema = Self::existing_schema(storage, table)?;
        let labels = ["Table", "Non_unique", "Key_name", "Seq_in_index", "Column_name", "Index_type"];
        let mut rows = Vec::new();
        let mut push = |key_name: &str, non_unique: i64, seq: usize, column: &str| {
            let row: Row = [
                ("Table", Value::from(table)),
                ("Non_unique", Value::Integer(non_unique)),
                ("Key_name", Value::from(key_name)),
                ("Seq_in_index", Value::Integer(seq as i64 + 1)),
                ("Column_name", Value::from(column)),
                ("Index_type", Value::from("HASH")),
            ]
            .into_iter()
            .collect();
            rows.push(row);
        };
        for (seq, column) in schema.primary_key.iter().enumerate() {
            push("PRIMARY", 0, seq, column);
        }
        for column in storage.indexed_columns(table)? {
            if !schema.primary_key.contains(&column) {
                push(&column, 1, 0, &column);
            }
        }
        Ok(QueryResult::rows(labels.iter().map(|l| (*l).to_string()).collect(), rows))
    }

    fn show_create_table(storage: &mut StorageManager, table: &str) -> Result<QueryResult, DatabaseError> {
        let schema = Self::existing_schema(storage, table)?;
        let mut lines: Vec<String> = schema
            .columns
            .iter()
            .map(|column| {
                let mut line = format!("  `{}` {}", column.name, column.data_type.sql_name());
                if !column.nullable {
                    line.push_str(" NOT NULL");
                }
                if let Some(default) = &column.default {
                    match default {
                        Value::Integer(_) | Value::Real(_) => line.push_str(&format!(" DEFAULT {default}")),
                        other => line.push_str(&format!(" DEFAULT '{}'", other.to_string().replace('\'', "''"))),
                    }
                }
                if column.auto_increment {
                    line.push_str(" AUTO_INCREMENT");
                }
                line
            })
            .collect();
        let quoted = |columns: &[String]| {
            columns.iter().map(|c| format!("`{c}`")).collect::<Vec<_>>().join(",")
        };
        if !schema.primary_key.is_empty() {
            lines.push(format!("  PRIMARY KEY ({})", quoted(&schema.primary_key)));
        }
        for column in &schema.indexes {
            lines.push(format!("  KEY `{column}` (`{column}`)"));
        }
        let ddl = format!(
            "CREATE TABLE `{table}` (\n{}\n) ENGINE=FlatFile DEFAULT CHARSET=utf8mb4",
            lines.join(",\n")
        );
        let row: Row = [("Table", Value::from(table)), ("Create Table", Value::Text(ddl))]
            .into_iter()
            .collect();
        Ok(QueryResult::rows(vec!["Table".into(), "Create Table".into()], vec![row]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::DataType;
    use crate::parser::{parse_statement, Statement};
    use tempfile::TempDir;

    fn setup() -> (TempDir, StorageManager, Session) {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::new(dir.path());
        let storage = StorageManager::open(&config).unwrap();
        (dir, storage, Session::new(&config))
    }

    fn run(storage: &mut StorageManager, session: &Session, sql: &str) -> QueryResult {
        match parse_statement(sql).unwrap() {
            Statement::Create(stmt) => DdlExecutor::create_table(storage, &stmt),
            Statement::Alter(stmt) => DdlExecutor::alter_table(storage, &stmt),
            Statement::Drop(stmt) => DdlExecutor::drop_table(storage, &stmt),
            Statement::Truncate(table) => DdlExecutor::truncate_table(storage, &table),
            Statement::Show(stmt) => DdlExecutor::show(storage, session, &stmt),
            other => panic!("unexpected {other:?}"),
        }
        .unwrap()
    }

    const POSTS: &str = "CREATE TABLE wp_posts (
        ID bigint(20) unsigned NOT NULL AUTO_INCREMENT,
        post_title text NOT NULL,
        post_status varchar(20) NOT NULL DEFAULT 'publish',
        menu_order int(11) NOT NULL DEFAULT '0',
        PRIMARY KEY (ID),
        KEY post_status (post_status)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

    #[test]
    fn test_create_table_schema() {
        let (_dir, mut storage, session) = setup();
        run(&mut storage, &session, POSTS);
        let schema = storage.schema("wp_posts").unwrap().unwrap();
        assert_eq!(schema.primary_key, vec!["ID"]);
        assert_eq!(schema.indexes, vec!["post_status"]);
        assert!(schema.columns[0].auto_increment);
        assert_eq!(schema.columns[2].default, Some(Value::from("publish")));
        assert_eq!(schema.columns[3].data_type, DataType::Integer);
        assert_eq!(schema.columns[3].default, Some(Value::Integer(0)));

        // a second CREATE leaves the schema alone
        run(&mut storage, &session, "CREATE TABLE IF NOT EXISTS wp_posts (x int)");
        assert_eq!(storage.schema("wp_posts").unwrap().unwrap().columns.len(), 4);
    }

    #[test]
    fn test_auto_increment_column_becomes_key() {
        let (_dir, mut storage, session) = setup();
        run(&mut storage, &session, "CREATE TABLE t (n INT AUTO_INCREMENT, name VARCHAR(10))");
        assert_eq!(storage.schema("t").unwrap().unwrap().primary_key, vec!["n"]);
    }

    #[test]
    fn test_alter_columns_and_rows() {
        let (_dir, mut storage, session) = setup();
        run(&mut storage, &session, "CREATE TABLE t (id INT AUTO_INCREMENT, name VARCHAR(10))");
        let row: Row = [("name", Value::from("a"))].into_iter().collect();
        storage.insert_row("t", row).unwrap();

        run(&mut storage, &session, "ALTER TABLE t ADD COLUMN age INT DEFAULT 7");
        run(&mut storage, &session, "ALTER TABLE t CHANGE name title VARCHAR(20)");
        let row = storage.get_row("t", "1").unwrap().unwrap();
        assert_eq!(row.get("age"), Some(&Value::Integer(7)));
        assert_eq!(row.get("title"), Some(&Value::from("a")));
        assert!(row.get("name").is_none());

        run(&mut storage, &session, "ALTER TABLE t ADD INDEX title (title)");
        assert_eq!(storage.find_by_value("t", "title", &Value::from("a")).unwrap(), vec!["1"]);

        run(&mut storage, &session, "ALTER TABLE t DROP COLUMN age");
        let schema = storage.schema("t").unwrap().unwrap();
        assert!(schema.column("age").is_none());
        assert!(storage.get_row("t", "1").unwrap().unwrap().get("age").is_none());

        // missing tables are left alone
        run(&mut storage, &session, "ALTER TABLE missing ADD x INT");
        assert!(!storage.table_exists("missing").unwrap());
    }

    #[test]
    fn test_drop_and_truncate() {
        let (_dir, mut storage, session) = setup();
        run(&mut storage, &session, "CREATE TABLE t (id INT AUTO_INCREMENT, name VARCHAR(10))");
        for name in ["a", "b"] {
            storage.insert_row("t", [("name", Value::from(name))].into_iter().collect()).unwrap();
        }
        run(&mut storage, &session, "TRUNCATE TABLE t");
        assert_eq!(storage.row_count("t").unwrap(), 0);
        let inserted = storage.insert_row("t", [("name", Value::from("c"))].into_iter().collect()).unwrap();
        assert_eq!(inserted.id, Some(1));

        run(&mut storage, &session, "DROP TABLE IF EXISTS t, missing");
        assert!(!storage.table_exists("t").unwrap());
        run(&mut storage, &session, "TRUNCATE missing");
    }

    #[test]
    fn test_show_statements() {
        let (_dir, mut storage, session) = setup();
        run(&mut storage, &session, POSTS);
        run(&mut storage, &session, "CREATE TABLE wp_options (option_id INT AUTO_INCREMENT)");
        run(&mut storage, &session, "CREATE TABLE other (id INT)");

        let tables = run(&mut storage, &session, "SHOW TABLES LIKE 'wp\\_%'");
        assert_eq!(tables.columns, vec!["Tables_in_flatsql"]);
        assert_eq!(tables.rows.len(), 2);

        let columns = run(&mut storage, &session, "SHOW COLUMNS FROM wp_posts");
        assert_eq!(columns.columns, vec!["Field", "Type", "Null", "Key", "Default", "Extra"]);
        let id = &columns.rows[0];
        assert_eq!(id.get("Key"), Some(&Value::from("PRI")));
        assert_eq!(id.get("Extra"), Some(&Value::from("auto_increment")));
        assert_eq!(id.get("Null"), Some(&Value::from("NO")));
        assert_eq!(columns.rows[2].get("Key"), Some(&Value::from("MUL")));

        let index = run(&mut storage, &session, "SHOW INDEX FROM wp_posts");
        assert_eq!(index.rows.len(), 2);
        assert_eq!(index.rows[0].get("Key_name"), Some(&Value::from("PRIMARY")));

        let create = run(&mut storage, &session, "SHOW CREATE TABLE wp_posts");
        let ddl = create.rows[0].get("Create Table").and_then(Value::as_text).unwrap().to_string();
        assert!(ddl.contains("PRIMARY KEY (`ID`)"));
        assert!(ddl.contains("KEY `post_status`"));

        assert!(run(&mut storage, &session, "SHOW VARIABLES").rows.is_empty());
    }

    #[test]
    fn test_show_columns_of_missing_table() {
        let (_dir, mut storage, _session) = setup();
        let err = DdlExecutor::show_columns(&mut storage, "missing", false).unwrap_err();
        assert!(matches!(err, DatabaseError::TableNotFound(_)));
    }
}
