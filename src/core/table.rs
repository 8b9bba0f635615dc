use serde::{Deserialize, Serialize};
use super::column::Column;
use super::row::Row;

/// Column layout of one table, persisted as `_schema/<table>`.
///
/// `columns` is written as a name-keyed object so the file reads naturally;
/// insertion order is preserved and is the column order of `SELECT *`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    #[serde(with = "column_map")]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<String>,
}

impl TableSchema {
    #[must_use]
    pub const fn new(columns: Vec<Column>, primary_key: Vec<String>) -> Self {
        Self {
            columns,
            primary_key,
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn auto_increment_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.auto_increment)
    }

    /// Adds a column, replacing an existing definition with the same name.
    pub fn add_column(&mut self, column: Column) {
        match self.column_index(&column.name) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
    }

    /// Removes a column and every key/index reference to it. Returns false if absent.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        let removed = self.columns.remove(idx);
        self.primary_key.retain(|k| k != &removed.name);
        self.indexes.retain(|k| k != &removed.name);
        true
    }

    /// Replaces `old_name` with `column`, keeping its position and renaming key references.
    pub fn change_column(&mut self, old_name: &str, column: Column) {
        let Some(idx) = self.column_index(old_name) else {
            self.columns.push(column);
            return;
        };
        let old = self.columns[idx].name.clone();
        for key in self.primary_key.iter_mut().chain(self.indexes.iter_mut()) {
            if *key == old {
                key.clone_from(&column.name);
            }
        }
        self.columns[idx] = column;
    }

    pub fn add_index(&mut self, column: &str) {
        if !self.indexes.iter().any(|c| c == column) {
            self.indexes.push(column.to_string());
        }
    }

    /// Fills every declared column missing from `row` and puts the row in schema order.
    pub fn complete_row(&self, row: &mut Row) {
        if self.columns.is_empty() {
            return;
        }
        let mut ordered = Row::new();
        for column in &self.columns {
            let value = row.remove(&column.name).unwrap_or_else(|| column.default_value());
            ordered.insert(column.name.clone(), value);
        }
        for (name, value) in row.drain() {
            ordered.insert(name, value);
        }
        *row = ordered;
    }
}

/// Per-table counters, persisted as `_meta/<table>`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableMeta {
    /// Highest key value ever seen; the next generated key is one more.
    pub auto_increment: i64,
    pub row_count: u64,
}

mod column_map {
    use super::Column;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(columns: &[Column], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(columns.len()))?;
        for column in columns {
            map.serialize_entry(&column.name, column)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Column>, D::Error> {
        struct ColumnsVisitor;

        impl<'de> Visitor<'de> for ColumnsVisitor {
            type Value = Vec<Column>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of column name to column definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut columns = Vec::new();
                while let Some((name, mut column)) = access.next_entry::<String, Column>()? {
                    column.name = name;
                    columns.push(column);
                }
                Ok(columns)
            }
        }

        deserializer.deserialize_map(ColumnsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Value};

    fn schema() -> TableSchema {
        TableSchema::new(
            vec![
                Column::new("id", DataType::Integer).auto_increment(),
                Column::new("name", DataType::String),
                Column::new("status", DataType::String).with_default(Value::from("draft")),
            ],
            vec!["id".to_string()],
        )
    }

    #[test]
    fn test_schema_json_layout() {
        let json = serde_json::to_value(schema()).unwrap();
        assert_eq!(json["primaryKey"], serde_json::json!(["id"]));
        assert_eq!(json["columns"]["id"]["autoIncrement"], serde_json::json!(true));
        assert_eq!(json["columns"]["status"]["default"], serde_json::json!("draft"));
        assert!(json.get("indexes").is_none());

        let back: TableSchema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema());
    }

    #[test]
    fn test_complete_row_orders_and_fills_defaults() {
        let mut row = Row::new();
        row.insert("extra".to_string(), Value::Integer(7));
        row.insert("name".to_string(), Value::from("a"));
        schema().complete_row(&mut row);

        let names: Vec<&str> = row.keys().collect();
        assert_eq!(names, vec!["id", "name", "status", "extra"]);
        assert_eq!(row.get("status"), Some(&Value::from("draft")));
        assert_eq!(row.get("id"), Some(&Value::Null));
    }

    #[test]
    fn test_change_column_renames_key_references() {
        let mut s = schema();
        s.add_index("name");
        s.change_column("name", Column::new("title", DataType::String));
        assert_eq!(s.columns[1].name, "title");
        assert_eq!(s.indexes, vec!["title".to_string()]);

        assert!(s.drop_column("id"));
        assert!(s.primary_key.is_empty());
        assert!(!s.drop_column("missing"));
    }
}
