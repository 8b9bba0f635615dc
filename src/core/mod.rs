// Module declarations
pub mod error;
pub mod value;
pub mod data_type;
pub mod column;
pub mod row;
pub mod table;
pub mod database;

// Re-exports for convenience
pub use error::{DatabaseError, ErrorKind};
pub use value::Value;
pub use data_type::DataType;
pub use column::Column;
pub use row::Row;
pub use table::{TableMeta, TableSchema};
pub use database::Database;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::Text("hello".to_string()).to_string(), "hello");
        assert_eq!(Value::Boolean(true).to_string(), "1");
        assert_eq!(Value::Bytes(vec![0xab]).to_string(), "0xab");
    }

    #[test]
    fn test_value_comparison() {
        use std::cmp::Ordering;
        assert_eq!(Value::Integer(10).compare(&Value::from("9")), Some(Ordering::Greater));
        assert_eq!(Value::from("abc").compare(&Value::from("abd")), Some(Ordering::Less));
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::Null.sort_cmp(&Value::Integer(1)), Ordering::Less);
        assert!(Value::Real(1.0).sql_eq(&Value::Integer(1)));
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::from("1abc").is_truthy());
        assert!(!Value::from("abc").is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Real(0.5).is_truthy());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(DatabaseError::TableNotFound("t".into()).kind(), ErrorKind::NotFound);
        assert_eq!(DatabaseError::ParseError("x".into()).kind(), ErrorKind::Syntax);
        assert_eq!(
            DatabaseError::DuplicateKey { table: "t".into(), key: "1".into() }.kind(),
            ErrorKind::Constraint
        );
        assert_eq!(DatabaseError::Storage("disk".into()).kind(), ErrorKind::Storage);
    }
}
