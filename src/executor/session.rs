/// Per-connection state the evaluator can read: identity strings and the
/// counters behind `LAST_INSERT_ID()` and `FOUND_ROWS()`.
use crate::config::EngineConfig;
use crate::core::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub database_name: String,
    pub server_version: String,
    pub last_insert_id: i64,
    pub found_rows: u64,
}

impl Session {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            database_name: config.database_name.clone(),
            server_version: config.server_version.clone(),
            last_insert_id: 0,
            found_rows: 0,
        }
    }

    /// Value of `@@name`. Unknown variables are NULL.
    #[must_use]
    pub fn variable(&self, name: &str) -> Value {
        match name.to_ascii_lowercase().as_str() {
            "version" => Value::Text(self.server_version.clone()),
            "version_comment" => Value::Text("flatsql file-backed engine".to_string()),
            "sql_mode" => Value::Text("NO_ENGINE_SUBSTITUTION".to_string()),
            "character_set_client" | "character_set_connection" | "character_set_results"
            | "character_set_server" | "character_set_database" => Value::Text("utf8mb4".to_string()),
            "collation_connection" | "collation_server" | "collation_database" => {
                Value::Text("utf8mb4_unicode_ci".to_string())
            }
            "time_zone" | "system_time_zone" => Value::Text("+00:00".to_string()),
            "transaction_isolation" | "tx_isolation" => Value::Text("REPEATABLE-READ".to_string()),
            "autocommit" => Value::Integer(1),
            "lower_case_table_names" => Value::Integer(0),
            "max_allowed_packet" => Value::Integer(64 * 1024 * 1024),
            "wait_timeout" | "interactive_timeout" => Value::Integer(28_800),
            "last_insert_id" | "identity" => Value::Integer(self.last_insert_id),
            "database" => Value::Text(self.database_name.clone()),
            _ => Value::Null,
        }
    }
}
