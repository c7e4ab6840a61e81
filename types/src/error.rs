//! Error type for value-level validation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid chain address: {0}")]
    InvalidAddress(String),
}
