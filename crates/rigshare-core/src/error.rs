//! Error types for the Rigshare ledger.
use thiserror::Error;

use crate::types::RigId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("rig {0} is not registered")] NotRegistered(RigId),
    #[error("rig {0} is already registered")] AlreadyRegistered(RigId),
    #[error("invalid rig config: {0}")] InvalidConfig(String),
    #[error("amount must be greater than zero")] InvalidAmount,
    #[error("oversell: minted {minted} + {requested} > total {total}")] Oversell { minted: u64, requested: u64, total: u64 },
    #[error("incorrect payment: got {paid}, expected {expected}")] BadPayment { paid: u128, expected: u128 },
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u64, need: u64 },
    #[error("no value")] NoValue,
    #[error("rig {0} has no minted shares to reward")] NoSupply(RigId),
    #[error("no rewards")] NoRewards,
    #[error("caller is not the administrator")] Unauthorized,
    #[error("reentrant call")] ReentrantCall,
    #[error("payout rejected: {0}")] PayoutRejected(String),
    #[error("operator is not approved by the holder")] NotApproved,
    #[error("an owner cannot set approval for itself")] SelfApproval,
    #[error("recipient rejected the transfer")] TransferRejected,
    #[error("shares cannot be sent to the zero address")] ZeroAddress,
    #[error("length mismatch: {ids} ids, {amounts} amounts")] LengthMismatch { ids: usize, amounts: usize },
    #[error("batch too large: {len} > {max}")] BatchTooLarge { len: usize, max: usize },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("missing 0x prefix")] MissingPrefix,
    #[error("invalid length: {0} hex chars")] InvalidLength(usize),
    #[error("invalid hex")] InvalidHex,
}

#[derive(Error, Debug)]
pub enum RigshareError {
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error("storage: {0}")] Storage(String),
    #[error("config: {0}")] Config(String),
    #[error("codec: {0}")] Codec(String),
    #[error("corrupt snapshot: {0}")] CorruptSnapshot(String),
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u128, need: u128 },
}
