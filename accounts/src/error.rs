use relay_chain::ChainError;
use relay_store::{LockError, StoreError};
use relay_types::TypesError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    /// A required collaborator was missing at startup. Fatal.
    #[error("dependency not ready: {0}")]
    NotReady(String),

    /// An event that cannot be applied. The event is dropped.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The chain accessor could not resolve a value or address.
    #[error("accessor lookup failed: {0}")]
    AccessorLookup(#[from] ChainError),

    /// Caller-supplied address is not a well-formed chain address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// The cluster lease was lost; this process may no longer write.
    #[error("cluster lease '{0}' lost")]
    LeaseLost(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("shut down before {0}")]
    Shutdown(&'static str),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

impl From<TypesError> for AccountError {
    fn from(e: TypesError) -> Self {
        match e {
            TypesError::InvalidAddress(addr) => AccountError::InvalidAddress(addr),
        }
    }
}

impl AccountError {
    /// Whether the event router must stop on this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AccountError::NotReady(_) | AccountError::LeaseLost(_))
    }
}
