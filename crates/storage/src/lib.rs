pub mod error;
pub mod records;
pub mod schema;
pub mod sqlite;

pub use error::StoreError;
pub use records::{ClaimKind, EntityRecord, View};
pub use sqlite::{SqliteStore, Txn};
