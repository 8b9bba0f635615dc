/// Secondary indexes: one hash index per (table, column), persisted under
/// `_indexes/<table>/<column>`.
pub mod hash;
pub mod manager;

pub use hash::{HashIndex, IndexKey, NULL_KEY};
pub use manager::IndexManager;
