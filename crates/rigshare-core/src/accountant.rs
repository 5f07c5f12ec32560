//! Reward accountant: per-(rig, holder) reward debt and banked credit.
//!
//! A holder's entitlement at any moment is
//!
//! ```text
//! pending = pending_credit + balance * acc / PRECISION - reward_debt
//! ```
//!
//! `reward_debt` is the accrual already folded into the holder's baseline.
//! Settling moves the middle term into `pending_credit` and re-baselines the
//! debt, so it must run against the balance that was held while the reward
//! accrued, before that balance changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::fixed;
use crate::journal::{Journal, Undo};
use crate::types::{HoldingKey, Rig};

/// Reward bookkeeping for one holder in one rig.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct RewardAccount {
    pub reward_debt: u128,
    pub pending_credit: u128,
}

impl RewardAccount {
    pub fn is_empty(&self) -> bool {
        self.reward_debt == 0 && self.pending_credit == 0
    }
}

#[derive(Debug, Default, Clone)]
pub struct RewardAccountant {
    accounts: BTreeMap<HoldingKey, RewardAccount>,
}

impl RewardAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-default lookup.
    pub fn account(&self, key: &HoldingKey) -> RewardAccount {
        self.accounts.get(key).copied().unwrap_or_default()
    }

    /// Accrued but not yet banked reward for `balance` shares at `acc`.
    pub fn unsettled(&self, key: &HoldingKey, balance: u64, acc: u128) -> Result<u128, LedgerError> {
        fixed::accrued(balance, acc)?
            .checked_sub(self.account(key).reward_debt)
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Banked credit plus unsettled accrual. Read-only.
    pub fn pending(&self, key: &HoldingKey, balance: u64, acc: u128) -> Result<u128, LedgerError> {
        self.unsettled(key, balance, acc)?
            .checked_add(self.account(key).pending_credit)
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Bank the unsettled accrual and re-baseline the debt.
    ///
    /// Returns the amount newly banked. A second call with no intervening
    /// deposit or balance change banks zero and writes nothing.
    pub fn settle(
        &mut self,
        key: HoldingKey,
        balance: u64,
        acc: u128,
        journal: &mut Journal,
    ) -> Result<u128, LedgerError> {
        let prev = self.account(&key);
        let accrued = fixed::accrued(balance, acc)?;
        let banked = accrued
            .checked_sub(prev.reward_debt)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let next = RewardAccount {
            reward_debt: accrued,
            pending_credit: prev
                .pending_credit
                .checked_add(banked)
                .ok_or(LedgerError::ArithmeticOverflow)?,
        };
        self.write(key, prev, next, journal);
        Ok(banked)
    }

    /// Set the debt to the accrual of `balance` shares at `acc`.
    ///
    /// Used right after a balance change whose prior accrual was settled.
    pub fn rebaseline(
        &mut self,
        key: HoldingKey,
        balance: u64,
        acc: u128,
        journal: &mut Journal,
    ) -> Result<(), LedgerError> {
        let prev = self.account(&key);
        let next = RewardAccount {
            reward_debt: fixed::accrued(balance, acc)?,
            ..prev
        };
        self.write(key, prev, next, journal);
        Ok(())
    }

    /// Zero the banked credit, returning what it held.
    pub fn take_credit(&mut self, key: HoldingKey, journal: &mut Journal) -> u128 {
        let prev = self.account(&key);
        let next = RewardAccount {
            pending_credit: 0,
            ..prev
        };
        self.write(key, prev, next, journal);
        prev.pending_credit
    }

    fn write(&mut self, key: HoldingKey, prev: RewardAccount, next: RewardAccount, journal: &mut Journal) {
        if prev == next {
            return;
        }
        journal.record(Undo::Account { key, prev });
        self.put(key, next);
    }

    fn put(&mut self, key: HoldingKey, account: RewardAccount) {
        if account.is_empty() {
            self.accounts.remove(&key);
        } else {
            self.accounts.insert(key, account);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HoldingKey, &RewardAccount)> {
        self.accounts.iter()
    }

    pub(crate) fn restore(&mut self, key: HoldingKey, prev: RewardAccount) {
        self.put(key, prev);
    }
}

/// Accumulator increment for a deposit of `value` into `rig`.
///
/// The denominator is the rig's minted shares: unsold shares neither dilute
/// holders nor earn anything.
///
/// # Errors
///
/// - [`LedgerError::NoValue`] if `value == 0`
/// - [`LedgerError::NoSupply`] if no shares have been minted
pub fn deposit_increment(rig: &Rig, value: u128) -> Result<u128, LedgerError> {
    if value == 0 {
        return Err(LedgerError::NoValue);
    }
    if rig.minted_shares == 0 {
        return Err(LedgerError::NoSupply(rig.id));
    }
    fixed::per_share(value, rig.minted_shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PRECISION;
    use crate::types::Address;

    fn key() -> HoldingKey {
        HoldingKey::new(1, Address([1; 20]))
    }

    #[test]
    fn fresh_account_has_nothing_pending() {
        let acct = RewardAccountant::new();
        assert_eq!(acct.pending(&key(), 0, 0).unwrap(), 0);
        assert_eq!(acct.pending(&key(), 10, 0).unwrap(), 0);
    }

    #[test]
    fn pending_tracks_accumulator_growth() {
        let acct = RewardAccountant::new();
        // 10 shares at 3 units/share.
        assert_eq!(acct.pending(&key(), 10, 3 * PRECISION).unwrap(), 30);
    }

    #[test]
    fn settle_banks_and_rebaselines() {
        let mut acct = RewardAccountant::new();
        let mut j = Journal::new();
        assert_eq!(acct.settle(key(), 10, 3 * PRECISION, &mut j).unwrap(), 30);
        let a = acct.account(&key());
        assert_eq!(a.pending_credit, 30);
        assert_eq!(a.reward_debt, 30);
        // Still 30 pending: credit 30 + (30 - 30).
        assert_eq!(acct.pending(&key(), 10, 3 * PRECISION).unwrap(), 30);
    }

    #[test]
    fn settle_is_idempotent() {
        let mut acct = RewardAccountant::new();
        let mut j = Journal::new();
        acct.settle(key(), 10, 3 * PRECISION, &mut j).unwrap();
        let before = acct.account(&key());

        let cp = j.begin(0);
        assert_eq!(acct.settle(key(), 10, 3 * PRECISION, &mut j).unwrap(), 0);
        assert_eq!(j.pending_entries(), 0, "second settle must not write");
        j.commit(cp);
        assert_eq!(acct.account(&key()), before);
    }

    #[test]
    fn rebaseline_after_balance_change_preserves_pending() {
        let mut acct = RewardAccountant::new();
        let mut j = Journal::new();
        let acc = 5 * PRECISION;
        acct.settle(key(), 10, acc, &mut j).unwrap();
        // Balance drops to 4; rebaseline at new balance.
        acct.rebaseline(key(), 4, acc, &mut j).unwrap();
        assert_eq!(acct.account(&key()).reward_debt, 20);
        assert_eq!(acct.pending(&key(), 4, acc).unwrap(), 50);
    }

    #[test]
    fn take_credit_zeroes() {
        let mut acct = RewardAccountant::new();
        let mut j = Journal::new();
        acct.settle(key(), 2, 7 * PRECISION, &mut j).unwrap();
        assert_eq!(acct.take_credit(key(), &mut j), 14);
        assert_eq!(acct.account(&key()).pending_credit, 0);
        assert_eq!(acct.pending(&key(), 2, 7 * PRECISION).unwrap(), 0);
        assert_eq!(acct.take_credit(key(), &mut j), 0);
    }

    #[test]
    fn empty_accounts_are_not_stored() {
        let mut acct = RewardAccountant::new();
        let mut j = Journal::new();
        acct.settle(key(), 0, 9 * PRECISION, &mut j).unwrap();
        assert_eq!(acct.iter().count(), 0);
    }

    #[test]
    fn deposit_increment_rules() {
        let mut rig = Rig::new(1, 100, 1);
        assert_eq!(deposit_increment(&rig, 10).unwrap_err(), LedgerError::NoSupply(1));
        rig.minted_shares = 40;
        assert_eq!(deposit_increment(&rig, 0).unwrap_err(), LedgerError::NoValue);
        // Denominator is minted (40), not total (100).
        assert_eq!(deposit_increment(&rig, 200).unwrap(), 5 * PRECISION);
    }
}
