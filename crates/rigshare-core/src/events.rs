//! Observable ledger events, one per committed state change.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Address, RigId};

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum LedgerEvent {
    RigRegistered {
        rig_id: RigId,
        total_shares: u64,
        price_per_share: u128,
    },
    SharesPurchased {
        rig_id: RigId,
        buyer: Address,
        amount: u64,
        paid: u128,
    },
    RewardsDeposited {
        rig_id: RigId,
        depositor: Address,
        value: u128,
    },
    RewardsClaimed {
        rig_id: RigId,
        holder: Address,
        amount: u128,
    },
    SharesTransferred {
        operator: Address,
        from: Address,
        to: Address,
        rig_id: RigId,
        amount: u64,
    },
    SharesTransferredBatch {
        operator: Address,
        from: Address,
        to: Address,
        rig_ids: Vec<RigId>,
        amounts: Vec<u64>,
    },
    ApprovalForAll {
        owner: Address,
        operator: Address,
        approved: bool,
    },
}

impl LedgerEvent {
    /// Short event name for logs and RPC output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RigRegistered { .. } => "RigRegistered",
            Self::SharesPurchased { .. } => "SharesPurchased",
            Self::RewardsDeposited { .. } => "RewardsDeposited",
            Self::RewardsClaimed { .. } => "RewardsClaimed",
            Self::SharesTransferred { .. } => "SharesTransferred",
            Self::SharesTransferredBatch { .. } => "SharesTransferredBatch",
            Self::ApprovalForAll { .. } => "ApprovalForAll",
        }
    }

    /// Rigs touched by this event.
    pub fn rig_ids(&self) -> Vec<RigId> {
        match self {
            Self::RigRegistered { rig_id, .. }
            | Self::SharesPurchased { rig_id, .. }
            | Self::RewardsDeposited { rig_id, .. }
            | Self::RewardsClaimed { rig_id, .. }
            | Self::SharesTransferred { rig_id, .. } => vec![*rig_id],
            Self::SharesTransferredBatch { rig_ids, .. } => rig_ids.clone(),
            Self::ApprovalForAll { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RigRegistered { rig_id, total_shares, price_per_share } => {
                write!(f, "rig {rig_id} registered: {total_shares} shares at {price_per_share}")
            }
            Self::SharesPurchased { rig_id, buyer, amount, paid } => {
                write!(f, "{buyer} bought {amount} of rig {rig_id} for {paid}")
            }
            Self::RewardsDeposited { rig_id, depositor, value } => {
                write!(f, "{depositor} deposited {value} into rig {rig_id}")
            }
            Self::RewardsClaimed { rig_id, holder, amount } => {
                write!(f, "{holder} claimed {amount} from rig {rig_id}")
            }
            Self::SharesTransferred { operator, from, to, rig_id, amount } => {
                write!(f, "{operator} moved {amount} of rig {rig_id} from {from} to {to}")
            }
            Self::SharesTransferredBatch { operator, from, to, rig_ids, amounts } => {
                write!(f, "{operator} moved {amounts:?} of rigs {rig_ids:?} from {from} to {to}")
            }
            Self::ApprovalForAll { owner, operator, approved } => {
                write!(f, "{owner} set approval of {operator} to {approved}")
            }
        }
    }
}
