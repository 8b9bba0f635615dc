// Storage module - file-per-row persistence

pub mod format;
pub mod manager;
pub mod schema;
pub mod serialization;
pub mod table_store;

pub use format::{decode_stem, encode_stem, Document, FileFormat, FormatHandler};
pub use manager::{InsertedRow, StorageManager};
pub use schema::{PrimaryKeyRegistry, SchemaManager};
pub use serialization::{SerializationHandler, SerializedValue};
pub use table_store::TableStore;
