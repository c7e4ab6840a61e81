//! Block numbering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Height of a block on the chain.
pub type BlockNumber = u64;

/// The chain state an authoritative read is taken against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockTag {
    /// State as of the end of a specific block.
    Number(BlockNumber),
    /// State at the current canonical head.
    Latest,
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Number(n) => write!(f, "{n}"),
            BlockTag::Latest => f.write_str("latest"),
        }
    }
}
