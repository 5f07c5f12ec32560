//! Core ledger types: addresses, rigs, holdings.
//!
//! Share counts are u64; value amounts and the scaled accumulator are u128.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Identifier of a registered rig.
pub type RigId = u64;

/// A 20-byte account identity.
///
/// Rendered as `0x`-prefixed lowercase hex, in text and in serde formats.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if body.len() != 40 {
            return Err(AddressError::InvalidLength(body.len()));
        }
        let bytes = hex::decode(body).map_err(|_| AddressError::InvalidHex)?;
        let arr: [u8; 20] = bytes.try_into().map_err(|_| AddressError::InvalidHex)?;
        Ok(Self(arr))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

/// One independently configured fractional-ownership asset.
///
/// `total_shares` and `price_per_share` never change after registration.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Rig {
    /// Rig identifier.
    pub id: RigId,
    /// Share supply cap.
    pub total_shares: u64,
    /// Price of one share in base units.
    pub price_per_share: u128,
    /// Shares sold so far. Never exceeds `total_shares`.
    pub minted_shares: u64,
    /// Cumulative reward per share, scaled by [`PRECISION`](crate::constants::PRECISION).
    pub acc_reward_per_share: u128,
}

impl Rig {
    /// A freshly registered rig with nothing sold and nothing deposited.
    pub fn new(id: RigId, total_shares: u64, price_per_share: u128) -> Self {
        Self {
            id,
            total_shares,
            price_per_share,
            minted_shares: 0,
            acc_reward_per_share: 0,
        }
    }

    /// Shares still available for purchase.
    pub fn unsold_shares(&self) -> u64 {
        self.total_shares - self.minted_shares
    }
}

/// Key of a per-(rig, holder) record.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct HoldingKey {
    pub rig_id: RigId,
    pub holder: Address,
}

impl HoldingKey {
    pub fn new(rig_id: RigId, holder: Address) -> Self {
        Self { rig_id, holder }
    }
}

impl fmt::Display for HoldingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rig_id, self.holder)
    }
}

/// A holder's full position in one rig.
///
/// A zero-valued holding is indistinguishable from an absent one.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Holding {
    /// Shares held.
    pub balance: u64,
    /// Accrual already folded into this holder's baseline, in base units.
    pub reward_debt: u128,
    /// Banked, unclaimed reward in base units.
    pub pending_credit: u128,
}

impl Holding {
    /// Whether this record carries no information.
    pub fn is_empty(&self) -> bool {
        self.balance == 0 && self.reward_debt == 0 && self.pending_credit == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_roundtrips_through_from_str() {
        let addr = Address([0xAB; 20]);
        let s = addr.to_string();
        assert_eq!(s, format!("0x{}", "ab".repeat(20)));
        assert_eq!(s.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn address_parse_rejects_missing_prefix() {
        let err = "ab".repeat(20).parse::<Address>().unwrap_err();
        assert_eq!(err, AddressError::MissingPrefix);
    }

    #[test]
    fn address_parse_rejects_short_input() {
        let err = "0xabcd".parse::<Address>().unwrap_err();
        assert_eq!(err, AddressError::InvalidLength(4));
    }

    #[test]
    fn address_parse_rejects_non_hex() {
        let err = format!("0x{}", "zz".repeat(20)).parse::<Address>().unwrap_err();
        assert_eq!(err, AddressError::InvalidHex);
    }

    #[test]
    fn address_parse_accepts_uppercase_prefix_and_digits() {
        let addr: Address = format!("0X{}", "AB".repeat(20)).parse().unwrap();
        assert_eq!(addr, Address([0xAB; 20]));
    }

    #[test]
    fn address_serde_is_hex_string() {
        let addr = Address([0x01; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "01".repeat(20)));
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addr);
        assert!(serde_json::from_str::<Address>("\"0x12\"").is_err());
    }

    #[test]
    fn zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address([1; 20]).is_zero());
    }

    #[test]
    fn new_rig_starts_empty() {
        let rig = Rig::new(3, 100, 5);
        assert_eq!(rig.minted_shares, 0);
        assert_eq!(rig.acc_reward_per_share, 0);
        assert_eq!(rig.unsold_shares(), 100);
    }

    #[test]
    fn default_holding_is_empty() {
        assert!(Holding::default().is_empty());
        let h = Holding { balance: 1, ..Holding::default() };
        assert!(!h.is_empty());
    }

    #[test]
    fn holding_key_orders_by_rig_first() {
        let a = HoldingKey::new(1, Address([9; 20]));
        let b = HoldingKey::new(2, Address([0; 20]));
        assert!(a < b);
    }
}
