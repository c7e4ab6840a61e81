//! Persistence of per-block [`BlockChanges`] and the retention watermark.

use std::collections::BTreeSet;
use std::sync::Arc;

use relay_store::layout::{self, block_changes_key, RETENTION_WATERMARK_KEY};
use relay_store::{BlockChanges, KvStore, StoreError};
use relay_types::BlockNumber;

/// Reads and writes block-scoped bookkeeping in the shared store.
///
/// Records never expire on their own; the retention sweep owns their
/// lifetime. The watermark is the lowest block that may still have a record.
#[derive(Clone)]
pub struct BlockBook {
    store: Arc<dyn KvStore>,
}

impl BlockBook {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Persist `changes`, merging with any record already stored for the
    /// same block.
    pub fn record(&self, changes: &BlockChanges) -> Result<(), StoreError> {
        let merged = match self.load(changes.block)? {
            Some(existing) => merge(existing, changes),
            None => changes.clone(),
        };
        self.store.set(
            &block_changes_key(changes.block),
            &layout::encode(&merged)?,
            None,
        )?;

        match self.watermark()? {
            Some(mark) if mark <= changes.block => Ok(()),
            _ => self.set_watermark(changes.block),
        }
    }

    pub fn load(&self, block: BlockNumber) -> Result<Option<BlockChanges>, StoreError> {
        self.store
            .get(&block_changes_key(block))?
            .map(|bytes| layout::decode(&bytes))
            .transpose()
    }

    pub fn remove(&self, block: BlockNumber) -> Result<(), StoreError> {
        self.store.delete(&block_changes_key(block))
    }

    pub fn watermark(&self) -> Result<Option<BlockNumber>, StoreError> {
        self.store
            .get(RETENTION_WATERMARK_KEY)?
            .map(|bytes| layout::decode(&bytes))
            .transpose()
    }

    pub fn set_watermark(&self, block: BlockNumber) -> Result<(), StoreError> {
        self.store
            .set(RETENTION_WATERMARK_KEY, &layout::encode(&block)?, None)
    }
}

fn merge(existing: BlockChanges, incoming: &BlockChanges) -> BlockChanges {
    let balances: BTreeSet<_> = existing
        .balances
        .into_iter()
        .chain(incoming.balances.iter().copied())
        .collect();
    let allowances: BTreeSet<_> = existing
        .allowances
        .into_iter()
        .chain(incoming.allowances.iter().copied())
        .collect();
    BlockChanges {
        block: incoming.block,
        balances: balances.into_iter().collect(),
        allowances: allowances.into_iter().collect(),
    }
}
