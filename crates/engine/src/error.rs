use rackline_core::CoreError;
use rackline_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("entity name already in use: {0}")]
    NameInUse(String),

    #[error("ambiguous attribute match for key {key:?} on entity {entity}")]
    AmbiguousAttr { entity: String, key: String },

    #[error("driver not registered: {0}")]
    DriverNotRegistered(String),

    #[error("driver already registered: {0}")]
    DuplicateDriver(String),

    #[error("entity {name} uses driver {actual:?}, expected {expected:?}")]
    DriverMismatch {
        name: String,
        actual: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("{member} is already in pool {pool}")]
    AlreadyMember { pool: String, member: String },

    #[error("{member} is not in pool {pool}")]
    NotAMember { pool: String, member: String },

    #[error("pool {pool} is exclusive and {member} is already pooled")]
    ExclusiveConflict { pool: String, member: String },

    #[error("{member} is already in unique pool {other}")]
    UniqueConflict { member: String, other: String },
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not available: {0}")]
    NotAvailable(String),

    #[error("wrong resource type: {0}")]
    WrongType(String),

    #[error("no matching allocation: {0}")]
    NotAllocated(String),
}
