use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("value type mismatch: expected {expected}, got {got}")]
    ValueType {
        expected: &'static str,
        got: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}
