use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("Duplicate entry '{key}' for table '{table}'")]
    DuplicateKey { table: String, key: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Binary Serialization error: {0}")]
    BinarySerialization(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Coarse error families a host maps onto its own error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Syntax,
    Storage,
    Constraint,
}

impl DatabaseError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TableNotFound(_) => ErrorKind::NotFound,
            Self::ParseError(_) => ErrorKind::Syntax,
            Self::DuplicateKey { .. } => ErrorKind::Constraint,
            Self::Io(_)
            | Self::Serialization(_)
            | Self::BinarySerialization(_)
            | Self::Storage(_)
            | Self::Config(_) => ErrorKind::Storage,
        }
    }
}

impl From<bincode::Error> for DatabaseError {
    fn from(err: bincode::Error) -> Self {
        Self::BinarySerialization(err.to_string())
    }
}

impl From<config::ConfigError> for DatabaseError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
