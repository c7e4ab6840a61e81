use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        LmdbError::Heed(e.to_string())
    }
}

impl From<LmdbError> for relay_store::StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::NotFound(key) => relay_store::StoreError::NotFound(key),
            LmdbError::Serialization(msg) => relay_store::StoreError::Serialization(msg),
            other => relay_store::StoreError::Backend(other.to_string()),
        }
    }
}

impl From<LmdbError> for relay_store::LockError {
    fn from(e: LmdbError) -> Self {
        relay_store::LockError::Backend(e.to_string())
    }
}
