use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend error: {0}")]
    Backend(String),

    #[error("lock '{name}' is not held by {holder}")]
    NotHeld { name: String, holder: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
