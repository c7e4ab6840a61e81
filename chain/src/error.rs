use relay_types::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain node unreachable: {0}")]
    Unreachable(String),

    #[error("no spender registered for {0}")]
    UnknownSpender(Address),
}
