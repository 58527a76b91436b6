use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("core error: {0}")]
    Core(#[from] rackline_core::CoreError),

    #[error("transaction committed no changes")]
    EmptyCommit,

    #[error("entity name already in use: {0}")]
    NameInUse(String),

    #[error("resource already claimed: {0}")]
    ResourceTaken(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}
