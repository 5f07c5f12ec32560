//! Rig registry: static per-rig configuration plus the running accumulator.
//!
//! Only `minted_shares` and `acc_reward_per_share` change after registration,
//! and only through [`RigRegistry::add_minted`] and [`RigRegistry::add_reward`].

use std::collections::BTreeMap;

use crate::error::LedgerError;
use crate::journal::{Journal, Undo};
use crate::types::{Rig, RigId};

#[derive(Debug, Default, Clone)]
pub struct RigRegistry {
    rigs: BTreeMap<RigId, Rig>,
}

impl RigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new rig.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadyRegistered`] if `rig_id` exists
    /// - [`LedgerError::InvalidConfig`] if `total_shares == 0`
    pub fn register(
        &mut self,
        rig_id: RigId,
        total_shares: u64,
        price_per_share: u128,
        journal: &mut Journal,
    ) -> Result<&Rig, LedgerError> {
        if self.rigs.contains_key(&rig_id) {
            return Err(LedgerError::AlreadyRegistered(rig_id));
        }
        if total_shares == 0 {
            return Err(LedgerError::InvalidConfig("total_shares must be > 0".into()));
        }
        journal.record(Undo::Rig { id: rig_id, prev: None });
        Ok(self
            .rigs
            .entry(rig_id)
            .or_insert_with(|| Rig::new(rig_id, total_shares, price_per_share)))
    }

    pub fn exists(&self, rig_id: RigId) -> bool {
        self.rigs.contains_key(&rig_id)
    }

    /// Look up a rig, mapping absence to [`LedgerError::NotRegistered`].
    pub fn get(&self, rig_id: RigId) -> Result<&Rig, LedgerError> {
        self.rigs.get(&rig_id).ok_or(LedgerError::NotRegistered(rig_id))
    }

    /// Mint `amount` more shares, enforcing the supply cap.
    pub fn add_minted(
        &mut self,
        rig_id: RigId,
        amount: u64,
        journal: &mut Journal,
    ) -> Result<(), LedgerError> {
        let rig = self
            .rigs
            .get_mut(&rig_id)
            .ok_or(LedgerError::NotRegistered(rig_id))?;
        let minted = rig
            .minted_shares
            .checked_add(amount)
            .filter(|m| *m <= rig.total_shares)
            .ok_or(LedgerError::Oversell {
                minted: rig.minted_shares,
                requested: amount,
                total: rig.total_shares,
            })?;
        journal.record(Undo::Rig { id: rig_id, prev: Some(rig.clone()) });
        rig.minted_shares = minted;
        Ok(())
    }

    /// Raise the accumulator by `increment`. Returns the new value.
    pub fn add_reward(
        &mut self,
        rig_id: RigId,
        increment: u128,
        journal: &mut Journal,
    ) -> Result<u128, LedgerError> {
        let rig = self
            .rigs
            .get_mut(&rig_id)
            .ok_or(LedgerError::NotRegistered(rig_id))?;
        let acc = rig
            .acc_reward_per_share
            .checked_add(increment)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        journal.record(Undo::Rig { id: rig_id, prev: Some(rig.clone()) });
        rig.acc_reward_per_share = acc;
        Ok(acc)
    }

    /// Restore a slot to a journaled prior value.
    pub(crate) fn restore(&mut self, rig_id: RigId, prev: Option<Rig>) {
        match prev {
            Some(rig) => {
                self.rigs.insert(rig_id, rig);
            }
            None => {
                self.rigs.remove(&rig_id);
            }
        }
    }

    /// Insert a rig verbatim (snapshot restore).
    pub(crate) fn load(&mut self, rig: Rig) {
        self.rigs.insert(rig.id, rig);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rig> {
        self.rigs.values()
    }

    pub fn len(&self) -> usize {
        self.rigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rigs.is_empty()
    }
}
