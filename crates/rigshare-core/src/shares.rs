//! Share ledger: per-(rig, holder) balances and operator approvals.
//!
//! Zero balances are not stored; a missing entry reads as zero.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::LedgerError;
use crate::journal::{Journal, Undo};
use crate::types::{Address, HoldingKey, RigId};

#[derive(Debug, Default, Clone)]
pub struct ShareLedger {
    balances: BTreeMap<HoldingKey, u64>,
    approvals: BTreeSet<(Address, Address)>,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, key: &HoldingKey) -> u64 {
        self.balances.get(key).copied().unwrap_or(0)
    }

    /// Increase a balance.
    pub fn credit(
        &mut self,
        key: HoldingKey,
        amount: u64,
        journal: &mut Journal,
    ) -> Result<u64, LedgerError> {
        let prev = self.balance_of(&key);
        let next = prev
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.write(key, prev, next, journal);
        Ok(next)
    }

    /// Decrease a balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] if the balance is below `amount`.
    pub fn debit(
        &mut self,
        key: HoldingKey,
        amount: u64,
        journal: &mut Journal,
    ) -> Result<u64, LedgerError> {
        let prev = self.balance_of(&key);
        let next = prev
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance { have: prev, need: amount })?;
        self.write(key, prev, next, journal);
        Ok(next)
    }

    fn write(&mut self, key: HoldingKey, prev: u64, next: u64, journal: &mut Journal) {
        if prev == next {
            return;
        }
        journal.record(Undo::Balance { key, prev });
        self.set(key, next);
    }

    fn set(&mut self, key: HoldingKey, balance: u64) {
        if balance == 0 {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, balance);
        }
    }

    pub fn is_approved(&self, owner: &Address, operator: &Address) -> bool {
        self.approvals.contains(&(*owner, *operator))
    }

    /// Grant or revoke `operator`'s right to move all of `owner`'s shares.
    pub fn set_approval(
        &mut self,
        owner: Address,
        operator: Address,
        approved: bool,
        journal: &mut Journal,
    ) {
        let prev = self.is_approved(&owner, &operator);
        if prev == approved {
            return;
        }
        journal.record(Undo::Approval { owner, operator, prev });
        self.put_approval(owner, operator, approved);
    }

    fn put_approval(&mut self, owner: Address, operator: Address, approved: bool) {
        if approved {
            self.approvals.insert((owner, operator));
        } else {
            self.approvals.remove(&(owner, operator));
        }
    }

    /// `operator` may move `owner`'s shares if it is the owner or approved.
    pub fn may_operate(&self, owner: &Address, operator: &Address) -> bool {
        owner == operator || self.is_approved(owner, operator)
    }

    /// Sum of all balances for one rig.
    pub fn total_held(&self, rig_id: RigId) -> u128 {
        self.holders(rig_id).map(|(_, b)| b as u128).sum()
    }

    /// Non-zero holders of one rig.
    pub fn holders(&self, rig_id: RigId) -> impl Iterator<Item = (Address, u64)> + '_ {
        let start = HoldingKey::new(rig_id, Address([0x00; 20]));
        let end = HoldingKey::new(rig_id, Address([0xFF; 20]));
        self.balances
            .range(start..=end)
            .map(|(k, b)| (k.holder, *b))
    }

    pub fn iter_balances(&self) -> impl Iterator<Item = (&HoldingKey, &u64)> {
        self.balances.iter()
    }

    pub fn iter_approvals(&self) -> impl Iterator<Item = &(Address, Address)> {
        self.approvals.iter()
    }

    pub(crate) fn restore_balance(&mut self, key: HoldingKey, prev: u64) {
        self.set(key, prev);
    }

    pub(crate) fn restore_approval(&mut self, owner: Address, operator: Address, prev: bool) {
        self.put_approval(owner, operator, prev);
    }
}
