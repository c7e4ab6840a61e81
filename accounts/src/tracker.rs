//! Per-block accumulator of keys touched since the last reconciliation.

use std::collections::BTreeSet;

use relay_types::{Address, AllowanceKey, BalanceKey, BlockNumber};

/// Keys touched by in-flight events plus the block being accumulated.
///
/// Owned by exactly one engine. Sets are ordered so reconciliation visits
/// keys deterministically.
#[derive(Debug, Default)]
pub struct DirtyKeyTracker {
    balances: BTreeSet<BalanceKey>,
    allowances: BTreeSet<AllowanceKey>,
    cursor: Option<BlockNumber>,
}

impl DirtyKeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `(owner, token)` changed. Returns whether the key was new.
    pub fn mark_balance_dirty(&mut self, owner: Address, token: Address) -> bool {
        self.balances.insert(BalanceKey::new(owner, token))
    }

    /// Record that `(owner, token, spender)` changed. Returns whether the key
    /// was new.
    pub fn mark_allowance_dirty(
        &mut self,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> bool {
        self.allowances.insert(AllowanceKey::new(owner, token, spender))
    }

    pub fn cursor(&self) -> Option<BlockNumber> {
        self.cursor
    }

    /// Move the cursor forward to `block`.
    ///
    /// Returns `false` and leaves the cursor untouched when `block` is behind
    /// it. Re-announcing the current block is accepted.
    pub fn advance_to(&mut self, block: BlockNumber) -> bool {
        match self.cursor {
            Some(current) if block < current => false,
            _ => {
                self.cursor = Some(block);
                true
            }
        }
    }

    /// Force the cursor to `block`, in either direction. Only fork replay
    /// moves the cursor backward.
    pub fn rewind_to(&mut self, block: BlockNumber) {
        self.cursor = Some(block);
    }

    pub fn balances(&self) -> &BTreeSet<BalanceKey> {
        &self.balances
    }

    pub fn allowances(&self) -> &BTreeSet<AllowanceKey> {
        &self.allowances
    }

    pub fn pending_count(&self) -> usize {
        self.balances.len() + self.allowances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty() && self.allowances.is_empty()
    }

    /// Drain both dirty sets, keeping the cursor.
    pub fn take(&mut self) -> (BTreeSet<BalanceKey>, BTreeSet<AllowanceKey>) {
        (
            std::mem::take(&mut self.balances),
            std::mem::take(&mut self.allowances),
        )
    }

    /// Empty both dirty sets, keeping the cursor.
    pub fn clear(&mut self) {
        self.balances.clear();
        self.allowances.clear();
    }
}
