use serde::{Deserialize, Serialize};
use super::value::Value;

/// Logical column type. Every SQL type name collapses onto one of these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    #[default]
    String,
    Datetime,
    Binary,
    Boolean,
    Json,
}

impl DataType {
    /// Normalizes a SQL type name (`BIGINT`, `varchar`, `LONGTEXT`...) to a logical type.
    /// Unknown names are treated as strings.
    #[must_use]
    pub fn from_sql_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" | "BIT"
            | "SERIAL" => Self::Integer,
            "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" => Self::Float,
            "DATE" | "DATETIME" | "TIMESTAMP" | "TIME" | "YEAR" => Self::Datetime,
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
                Self::Binary
            }
            "BOOL" | "BOOLEAN" => Self::Boolean,
            "JSON" => Self::Json,
            _ => Self::String,
        }
    }

    /// Type name reported by DESCRIBE / SHOW COLUMNS.
    #[must_use]
    pub const fn sql_name(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Float => "double",
            Self::String => "text",
            Self::Datetime => "datetime",
            Self::Binary => "blob",
            Self::Boolean => "tinyint(1)",
            Self::Json => "json",
        }
    }

    /// Converts an incoming value to the column's logical type where that is lossless.
    #[must_use]
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (Self::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Integer(i),
                Err(_) => match s.trim().parse::<f64>() {
                    Ok(f) if is_whole(f) => Value::Integer(f as i64),
                    _ => Value::Text(s),
                },
            },
            (Self::Integer, Value::Real(f)) if is_whole(f) => Value::Integer(f as i64),
            (Self::Integer, Value::Boolean(b)) => Value::Integer(i64::from(b)),
            (Self::Float, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Value::Real(f),
                _ => Value::Text(s),
            },
            (Self::Float, Value::Integer(i)) => Value::Real(i as f64),
            (Self::Boolean, Value::Integer(i)) => Value::Boolean(i != 0),
            (_, value) => value,
        }
    }

    /// Best-effort type of a value seen on a table that has no declared schema.
    #[must_use]
    pub const fn infer(value: &Value) -> Self {
        match value {
            Value::Integer(_) => Self::Integer,
            Value::Real(_) => Self::Float,
            Value::Boolean(_) => Self::Boolean,
            Value::Bytes(_) => Self::Binary,
            Value::Null | Value::Text(_) => Self::String,
        }
    }
}

/// A finite float with no fractional part that fits in an `i64`.
fn is_whole(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_coercion_is_canonical() {
        for text in ["7", " 7", "07", "+7", "7.0", "7.", "7e0"] {
            assert_eq!(DataType::Integer.coerce(Value::from(text)), Value::Integer(7), "{text:?}");
        }
        assert_eq!(DataType::Integer.coerce(Value::Real(-0.0)), Value::Integer(0));
        assert_eq!(DataType::Integer.coerce(Value::Boolean(true)), Value::Integer(1));
        assert_eq!(DataType::Integer.coerce(Value::from("7.5")), Value::from("7.5"));
        assert_eq!(DataType::Integer.coerce(Value::Real(7.5)), Value::Real(7.5));
        assert_eq!(DataType::Integer.coerce(Value::from("abc")), Value::from("abc"));
        assert_eq!(DataType::Integer.coerce(Value::from("1e30")), Value::from("1e30"));
    }

    #[test]
    fn test_other_coercions() {
        assert_eq!(DataType::Float.coerce(Value::Integer(2)), Value::Real(2.0));
        assert_eq!(DataType::Float.coerce(Value::from(" 2.5")), Value::Real(2.5));
        assert_eq!(DataType::Boolean.coerce(Value::Integer(3)), Value::Boolean(true));
        assert_eq!(DataType::String.coerce(Value::Integer(3)), Value::Integer(3));
    }

    #[test]
    fn test_sql_names() {
        assert_eq!(DataType::from_sql_name("bigint"), DataType::Integer);
        assert_eq!(DataType::from_sql_name("LONGTEXT"), DataType::String);
        assert_eq!(DataType::from_sql_name("decimal"), DataType::Float);
    }
}
