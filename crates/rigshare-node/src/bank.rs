//! Value book: spendable balances of external accounts and the ledger treasury.
//!
//! The ledger itself only counts shares and reward entitlements. Actual value
//! moves here: purchases and deposits flow from an account into the treasury,
//! claims flow back out through [`ValueBook`]'s [`PayoutSink`] impl.
//!
//! Plain receipts ([`ValueBook::receive`]) raise the treasury without touching
//! any reward accumulator, so they are never distributed.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use rigshare_core::{Address, LedgerError, PayoutSink, RigLedger, RigshareError};

#[derive(Debug, Default, Clone)]
pub struct ValueBook {
    treasury: u128,
    accounts: BTreeMap<Address, u128>,
    dirty: BTreeSet<Address>,
}

impl ValueBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted balances.
    pub fn restore(treasury: u128, accounts: BTreeMap<Address, u128>) -> Self {
        Self {
            treasury,
            accounts,
            dirty: BTreeSet::new(),
        }
    }

    pub fn treasury(&self) -> u128 {
        self.treasury
    }

    pub fn balance(&self, account: &Address) -> u128 {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.accounts.iter()
    }

    /// Fail with `InsufficientFunds` unless `account` can spend `amount`.
    pub fn ensure_funds(&self, account: &Address, amount: u128) -> Result<(), RigshareError> {
        let have = self.balance(account);
        if have < amount {
            return Err(RigshareError::InsufficientFunds { have, need: amount });
        }
        Ok(())
    }

    /// Add freshly issued value to an account.
    pub fn fund(&mut self, account: &Address, amount: u128) -> Result<u128, RigshareError> {
        let next = self
            .balance(account)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.set(*account, next);
        Ok(next)
    }

    /// Move `amount` from `account` into the treasury.
    pub fn collect(&mut self, account: &Address, amount: u128) -> Result<(), RigshareError> {
        self.ensure_funds(account, amount)?;
        let treasury = self
            .treasury
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let remaining = self.balance(account) - amount;
        self.set(*account, remaining);
        self.treasury = treasury;
        debug!(%account, amount, treasury, "collected into treasury");
        Ok(())
    }

    /// Untracked receipt: value sent to the treasury outside any deposit.
    pub fn receive(&mut self, from: &Address, amount: u128) -> Result<(), RigshareError> {
        self.collect(from, amount)
    }

    /// Accounts changed since the last drain, with their current balances.
    pub fn take_dirty(&mut self) -> Vec<(Address, u128)> {
        std::mem::take(&mut self.dirty)
            .into_iter()
            .map(|a| (a, self.balance(&a)))
            .collect()
    }

    /// Mark drained accounts dirty again after a failed write.
    pub fn requeue_dirty(&mut self, accounts: &[(Address, u128)]) {
        self.dirty.extend(accounts.iter().map(|(a, _)| *a));
    }

    fn set(&mut self, account: Address, balance: u128) {
        if balance == 0 {
            self.accounts.remove(&account);
        } else {
            self.accounts.insert(account, balance);
        }
        self.dirty.insert(account);
    }
}

impl PayoutSink for ValueBook {
    fn pay_out(&mut self, _ledger: &mut RigLedger, to: &Address, amount: u128) -> Result<(), String> {
        let treasury = self
            .treasury
            .checked_sub(amount)
            .ok_or_else(|| format!("treasury holds {}, payout needs {amount}", self.treasury))?;
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or_else(|| "recipient balance overflow".to_string())?;
        self.treasury = treasury;
        self.set(*to, credited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigshare_core::SingleAdmin;

    const A: Address = Address([0xA1; 20]);

    #[test]
    fn fund_and_collect() {
        let mut book = ValueBook::new();
        book.fund(&A, 100).unwrap();
        book.collect(&A, 40).unwrap();
        assert_eq!(book.balance(&A), 60);
        assert_eq!(book.treasury(), 40);
        assert!(matches!(
            book.collect(&A, 61),
            Err(RigshareError::InsufficientFunds { have: 60, need: 61 })
        ));
    }

    #[test]
    fn receive_only_raises_treasury() {
        let mut book = ValueBook::new();
        book.fund(&A, 5).unwrap();
        book.receive(&A, 5).unwrap();
        assert_eq!(book.treasury(), 5);
        assert_eq!(book.balance(&A), 0);
    }

    #[test]
    fn payout_moves_treasury_to_account() {
        let mut ledger = RigLedger::new(SingleAdmin(A));
        let mut book = ValueBook::restore(10, BTreeMap::new());
        book.pay_out(&mut ledger, &A, 7).unwrap();
        assert_eq!(book.treasury(), 3);
        assert_eq!(book.balance(&A), 7);
        assert!(book.pay_out(&mut ledger, &A, 4).is_err());
        assert_eq!(book.treasury(), 3);
    }

    #[test]
    fn dirty_accounts_are_drained_once() {
        let mut book = ValueBook::new();
        book.fund(&A, 1).unwrap();
        assert_eq!(book.take_dirty(), vec![(A, 1)]);
        assert!(book.take_dirty().is_empty());
    }

    #[test]
    fn requeued_accounts_report_current_balance() {
        let mut book = ValueBook::new();
        book.fund(&A, 1).unwrap();
        let drained = book.take_dirty();
        book.fund(&A, 2).unwrap();
        book.requeue_dirty(&drained);
        assert_eq!(book.take_dirty(), vec![(A, 3)]);
    }
}
