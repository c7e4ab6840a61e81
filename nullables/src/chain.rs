//! Nullable chain accessor: a scripted ledger for testing.

use relay_chain::{ChainAccessor, ChainError};
use relay_types::{Address, AllowanceKey, BalanceKey, BlockTag, U256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// One recorded accessor call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainCall {
    Balance(BalanceKey, BlockTag),
    Allowance(AllowanceKey, BlockTag),
    Spender(Address),
}

/// An in-memory [`ChainAccessor`].
///
/// Values are the same at every block; unknown keys read as zero. Unknown
/// spender targets fail, mirroring contracts with no registered delegate.
#[derive(Default)]
pub struct NullChain {
    balances: Mutex<HashMap<BalanceKey, U256>>,
    allowances: Mutex<HashMap<AllowanceKey, U256>>,
    spenders: Mutex<HashMap<Address, Address>>,
    failing_owners: Mutex<HashSet<Address>>,
    read_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<ChainCall>>,
}

impl NullChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, owner: Address, token: Address, value: U256) {
        self.balances
            .lock()
            .unwrap()
            .insert(BalanceKey::new(owner, token), value);
    }

    pub fn set_allowance(&self, owner: Address, token: Address, spender: Address, value: U256) {
        self.allowances
            .lock()
            .unwrap()
            .insert(AllowanceKey::new(owner, token, spender), value);
    }

    pub fn set_spender(&self, target: Address, spender: Address) {
        self.spenders.lock().unwrap().insert(target, spender);
    }

    /// Make every balance and allowance read for `owner` fail.
    pub fn fail_reads_for(&self, owner: Address) {
        self.failing_owners.lock().unwrap().insert(owner);
    }

    /// Block the calling thread for `delay` on every balance and allowance
    /// read, like a slow node.
    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn check_owner(&self, owner: &Address) -> Result<(), ChainError> {
        if let Some(delay) = *self.read_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        if self.failing_owners.lock().unwrap().contains(owner) {
            return Err(ChainError::Unreachable(format!(
                "injected read failure for {owner}"
            )));
        }
        Ok(())
    }
}

impl ChainAccessor for NullChain {
    fn balance(&self, owner: &Address, token: &Address, at: BlockTag) -> Result<U256, ChainError> {
        let key = BalanceKey::new(*owner, *token);
        self.calls.lock().unwrap().push(ChainCall::Balance(key, at));
        self.check_owner(owner)?;
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    fn allowance(
        &self,
        owner: &Address,
        token: &Address,
        spender: &Address,
        at: BlockTag,
    ) -> Result<U256, ChainError> {
        let key = AllowanceKey::new(*owner, *token, *spender);
        self.calls.lock().unwrap().push(ChainCall::Allowance(key, at));
        self.check_owner(owner)?;
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    fn spender_for(&self, target: &Address) -> Result<Address, ChainError> {
        self.calls.lock().unwrap().push(ChainCall::Spender(*target));
        self.spenders
            .lock()
            .unwrap()
            .get(target)
            .copied()
            .ok_or(ChainError::UnknownSpender(*target))
    }
}
