//! Cache keys for balance and allowance entries.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one cached balance: `owner`'s holding of `token`.
///
/// `token` is [`crate::NATIVE_ASSET`] for the chain's native asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub owner: Address,
    pub token: Address,
}

impl BalanceKey {
    pub fn new(owner: Address, token: Address) -> Self {
        Self { owner, token }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.token)
    }
}

/// Identifies one cached allowance: how much of `owner`'s `token` the
/// `spender` may move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AllowanceKey {
    pub owner: Address,
    pub token: Address,
    pub spender: Address,
}

impl AllowanceKey {
    pub fn new(owner: Address, token: Address, spender: Address) -> Self {
        Self {
            owner,
            token,
            spender,
        }
    }
}

impl fmt::Display for AllowanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.token, self.spender)
    }
}
