//! Chain events consumed by the account cache.
//!
//! Token-level events carry the envelope of the transaction that produced
//! them: `from` is the externally owned account that paid for the
//! transaction, `to` is the contract it called and `protocol` is the token
//! contract that emitted the log.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::BlockNumber;

/// Execution outcome of the transaction behind an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TxStatus::Success)
    }
}

/// A token `Transfer` log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub protocol: Address,
    pub sender: Address,
    pub receiver: Address,
    pub value: U256,
    pub status: TxStatus,
    pub block_number: BlockNumber,
}

/// A token `Approval` log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub from: Address,
    pub protocol: Address,
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub status: TxStatus,
    pub block_number: BlockNumber,
}

/// A wrapped-native `Deposit` or `Withdrawal` log.
///
/// `account` is the deposit destination or the withdrawal source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapEvent {
    pub from: Address,
    pub protocol: Address,
    pub account: Address,
    pub value: U256,
    pub status: TxStatus,
    pub block_number: BlockNumber,
}

/// A plain native-asset value transfer with no token contract involved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub status: TxStatus,
    pub block_number: BlockNumber,
}

/// A chain reorganization: blocks `fork_block..=detected_block` were
/// discarded in favour of another branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkEvent {
    pub detected_block: BlockNumber,
    pub fork_block: BlockNumber,
}

/// Every event the account cache reacts to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    Transfer(TransferEvent),
    Approval(ApprovalEvent),
    WrapDeposit(WrapEvent),
    WrapWithdrawal(WrapEvent),
    NativeTransfer(NativeTransferEvent),
    BlockNew { number: BlockNumber },
    BlockEnd { number: BlockNumber },
    ForkDetected(ForkEvent),
}

impl ChainEvent {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::Transfer(_) => "transfer",
            ChainEvent::Approval(_) => "approval",
            ChainEvent::WrapDeposit(_) => "wrap_deposit",
            ChainEvent::WrapWithdrawal(_) => "wrap_withdrawal",
            ChainEvent::NativeTransfer(_) => "native_transfer",
            ChainEvent::BlockNew { .. } => "block_new",
            ChainEvent::BlockEnd { .. } => "block_end",
            ChainEvent::ForkDetected(_) => "fork_detected",
        }
    }
}
