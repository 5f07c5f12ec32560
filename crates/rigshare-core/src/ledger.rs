//! The rig ledger: registry, share balances, reward accounting and claim
//! disbursement behind one atomic operation boundary.
//!
//! Every public mutating method runs inside a journal checkpoint. If any step
//! fails, all state written since the checkpoint (including events) is
//! restored before the error is returned.
//!
//! Balance-changing operations follow one order:
//! 1. settle every holder whose balance is about to change,
//! 2. mutate balances (and minted supply),
//! 3. re-baseline each holder's reward debt at the new balance.
//!
//! Claims commit their internal effects (settle, zero the credit) before the
//! external payout runs, so code reached through the payout observes the
//! post-payment state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::accountant::{self, RewardAccount, RewardAccountant};
use crate::constants::MAX_BATCH_LEGS;
use crate::error::{LedgerError, RigshareError};
use crate::events::LedgerEvent;
use crate::fixed;
use crate::flight::{ClaimPhase, SingleFlight};
use crate::journal::{Checkpoint, Journal, Touched, Undo};
use crate::registry::RigRegistry;
use crate::shares::ShareLedger;
use crate::traits::{AdminGate, PayoutSink, ShareReceiver};
use crate::types::{Address, Holding, HoldingKey, Rig, RigId};

/// Full persisted state of a ledger.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct LedgerSnapshot {
    pub rigs: Vec<Rig>,
    pub holdings: Vec<(HoldingKey, Holding)>,
    pub approvals: Vec<(Address, Address)>,
}

impl LedgerSnapshot {
    /// Check the structural invariants a restored ledger relies on.
    pub fn verify(&self) -> Result<(), RigshareError> {
        let mut held: BTreeMap<RigId, u128> = BTreeMap::new();
        let rigs: BTreeMap<RigId, &Rig> = self.rigs.iter().map(|r| (r.id, r)).collect();
        if rigs.len() != self.rigs.len() {
            return Err(RigshareError::CorruptSnapshot("duplicate rig id".into()));
        }
        for (key, holding) in &self.holdings {
            if !rigs.contains_key(&key.rig_id) {
                return Err(RigshareError::CorruptSnapshot(format!(
                    "holding {key} references unknown rig"
                )));
            }
            *held.entry(key.rig_id).or_default() += holding.balance as u128;
        }
        for rig in &self.rigs {
            if rig.total_shares == 0 || rig.minted_shares > rig.total_shares {
                return Err(RigshareError::CorruptSnapshot(format!(
                    "rig {} minted {} of {}",
                    rig.id, rig.minted_shares, rig.total_shares
                )));
            }
            let sum = held.get(&rig.id).copied().unwrap_or(0);
            if sum != rig.minted_shares as u128 {
                return Err(RigshareError::CorruptSnapshot(format!(
                    "rig {} holders sum to {sum}, minted {}",
                    rig.id, rig.minted_shares
                )));
            }
        }
        Ok(())
    }
}

/// State changed by operations committed since the last drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub rigs: Vec<Rig>,
    /// Current value of each touched holding; empty holdings should be deleted.
    pub holdings: Vec<(HoldingKey, Holding)>,
    pub approvals: Vec<(Address, Address, bool)>,
    pub events: Vec<LedgerEvent>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.rigs.is_empty()
            && self.holdings.is_empty()
            && self.approvals.is_empty()
            && self.events.is_empty()
    }
}

pub struct RigLedger {
    registry: RigRegistry,
    shares: ShareLedger,
    rewards: RewardAccountant,
    journal: Journal,
    flight: SingleFlight,
    events: Vec<LedgerEvent>,
    admin: Box<dyn AdminGate>,
    receivers: BTreeMap<Address, Arc<dyn ShareReceiver>>,
}

impl RigLedger {
    /// Create an empty ledger administered through `admin`.
    pub fn new(admin: impl AdminGate + 'static) -> Self {
        Self {
            registry: RigRegistry::new(),
            shares: ShareLedger::new(),
            rewards: RewardAccountant::new(),
            journal: Journal::new(),
            flight: SingleFlight::new(),
            events: Vec::new(),
            admin: Box::new(admin),
            receivers: BTreeMap::new(),
        }
    }

    /// Rebuild a ledger from persisted state.
    pub fn from_snapshot(
        admin: impl AdminGate + 'static,
        snapshot: LedgerSnapshot,
    ) -> Result<Self, RigshareError> {
        snapshot.verify()?;
        let mut ledger = Self::new(admin);
        for rig in snapshot.rigs {
            ledger.registry.load(rig);
        }
        for (key, holding) in snapshot.holdings {
            ledger.shares.restore_balance(key, holding.balance);
            ledger.rewards.restore(
                key,
                RewardAccount {
                    reward_debt: holding.reward_debt,
                    pending_credit: holding.pending_credit,
                },
            );
        }
        for (owner, operator) in snapshot.approvals {
            ledger.shares.restore_approval(owner, operator, true);
        }
        Ok(ledger)
    }

    /// Full state, for persistence.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut holdings: BTreeMap<HoldingKey, Holding> = BTreeMap::new();
        for (key, balance) in self.shares.iter_balances() {
            holdings.entry(*key).or_default().balance = *balance;
        }
        for (key, account) in self.rewards.iter() {
            let h = holdings.entry(*key).or_default();
            h.reward_debt = account.reward_debt;
            h.pending_credit = account.pending_credit;
        }
        LedgerSnapshot {
            rigs: self.registry.iter().cloned().collect(),
            holdings: holdings.into_iter().collect(),
            approvals: self.shares.iter_approvals().copied().collect(),
        }
    }

    /// Mark `address` as contract-like: incoming shares require its acknowledgment.
    pub fn register_receiver(&mut self, address: Address, receiver: Arc<dyn ShareReceiver>) {
        self.receivers.insert(address, receiver);
    }

    pub fn unregister_receiver(&mut self, address: &Address) {
        self.receivers.remove(address);
    }

    // ------------------------------------------------------------------
    // Rig registry
    // ------------------------------------------------------------------

    /// Register a new rig. Admin only.
    pub fn register(
        &mut self,
        caller: &Address,
        rig_id: RigId,
        total_shares: u64,
        price_per_share: u128,
    ) -> Result<(), LedgerError> {
        self.atomic(|l| {
            l.require_admin(caller)?;
            l.registry
                .register(rig_id, total_shares, price_per_share, &mut l.journal)?;
            l.emit(LedgerEvent::RigRegistered {
                rig_id,
                total_shares,
                price_per_share,
            });
            info!(rig_id, total_shares, price_per_share, "rig registered");
            Ok(())
        })
    }

    pub fn get(&self, rig_id: RigId) -> Result<&Rig, LedgerError> {
        self.registry.get(rig_id)
    }

    pub fn exists(&self, rig_id: RigId) -> bool {
        self.registry.exists(rig_id)
    }

    pub fn rigs(&self) -> impl Iterator<Item = &Rig> {
        self.registry.iter()
    }

    pub fn total_shares(&self, rig_id: RigId) -> Result<u64, LedgerError> {
        Ok(self.get(rig_id)?.total_shares)
    }

    pub fn share_price(&self, rig_id: RigId) -> Result<u128, LedgerError> {
        Ok(self.get(rig_id)?.price_per_share)
    }

    pub fn minted_shares(&self, rig_id: RigId) -> Result<u64, LedgerError> {
        Ok(self.get(rig_id)?.minted_shares)
    }

    pub fn acc_reward_per_share(&self, rig_id: RigId) -> Result<u128, LedgerError> {
        Ok(self.get(rig_id)?.acc_reward_per_share)
    }

    // ------------------------------------------------------------------
    // Share ledger
    // ------------------------------------------------------------------

    /// Buy `amount` new shares of `rig_id` for exactly `amount * price`.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, `InvalidAmount`, `Oversell`, `BadPayment`,
    /// `ZeroAddress`, in that order of precedence; `TransferRejected` if the
    /// buyer is a receiver that refuses the mint.
    pub fn purchase(
        &mut self,
        buyer: &Address,
        rig_id: RigId,
        amount: u64,
        paid: u128,
    ) -> Result<(), LedgerError> {
        self.atomic(|l| {
            let rig = l.registry.get(rig_id)?.clone();
            if amount == 0 {
                return Err(LedgerError::InvalidAmount);
            }
            if amount > rig.unsold_shares() {
                return Err(LedgerError::Oversell {
                    minted: rig.minted_shares,
                    requested: amount,
                    total: rig.total_shares,
                });
            }
            let expected = fixed::cost(amount, rig.price_per_share)?;
            if paid != expected {
                return Err(LedgerError::BadPayment { paid, expected });
            }
            if buyer.is_zero() {
                return Err(LedgerError::ZeroAddress);
            }

            l.settle_holder(rig_id, buyer)?;
            l.registry.add_minted(rig_id, amount, &mut l.journal)?;
            l.shares
                .credit(HoldingKey::new(rig_id, *buyer), amount, &mut l.journal)?;
            l.rebaseline_holder(rig_id, buyer)?;

            l.emit(LedgerEvent::SharesPurchased {
                rig_id,
                buyer: *buyer,
                amount,
                paid,
            });
            l.notify_single(buyer, &Address::ZERO, buyer, rig_id, amount)?;
            info!(rig_id, %buyer, amount, paid, "shares purchased");
            Ok(())
        })
    }

    /// Move `amount` shares of `rig_id` from `from` to `to` on behalf of `operator`.
    ///
    /// Both holders are settled at their pre-transfer balances before the move.
    pub fn transfer(
        &mut self,
        operator: &Address,
        from: &Address,
        to: &Address,
        rig_id: RigId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.atomic(|l| {
            l.require_operator(from, operator)?;
            l.move_shares(from, to, rig_id, amount)?;
            l.emit(LedgerEvent::SharesTransferred {
                operator: *operator,
                from: *from,
                to: *to,
                rig_id,
                amount,
            });
            l.notify_single(operator, from, to, rig_id, amount)?;
            info!(rig_id, %from, %to, amount, "shares transferred");
            Ok(())
        })
    }

    /// Transfer several rigs' shares at once. Either every leg commits or none does.
    pub fn batch_transfer(
        &mut self,
        operator: &Address,
        from: &Address,
        to: &Address,
        rig_ids: &[RigId],
        amounts: &[u64],
    ) -> Result<(), LedgerError> {
        self.atomic(|l| {
            if rig_ids.len() != amounts.len() {
                return Err(LedgerError::LengthMismatch {
                    ids: rig_ids.len(),
                    amounts: amounts.len(),
                });
            }
            if rig_ids.len() > MAX_BATCH_LEGS {
                return Err(LedgerError::BatchTooLarge {
                    len: rig_ids.len(),
                    max: MAX_BATCH_LEGS,
                });
            }
            l.require_operator(from, operator)?;
            for (rig_id, amount) in rig_ids.iter().zip(amounts) {
                l.move_shares(from, to, *rig_id, *amount)?;
            }
            l.emit(LedgerEvent::SharesTransferredBatch {
                operator: *operator,
                from: *from,
                to: *to,
                rig_ids: rig_ids.to_vec(),
                amounts: amounts.to_vec(),
            });
            l.notify_batch(operator, from, to, rig_ids, amounts)?;
            info!(%from, %to, legs = rig_ids.len(), "batch transfer");
            Ok(())
        })
    }

    /// Grant or revoke `operator`'s right to move all of `owner`'s shares.
    pub fn set_approval_for_all(
        &mut self,
        owner: &Address,
        operator: &Address,
        approved: bool,
    ) -> Result<(), LedgerError> {
        self.atomic(|l| {
            if owner == operator {
                return Err(LedgerError::SelfApproval);
            }
            l.shares
                .set_approval(*owner, *operator, approved, &mut l.journal);
            l.emit(LedgerEvent::ApprovalForAll {
                owner: *owner,
                operator: *operator,
                approved,
            });
            Ok(())
        })
    }

    pub fn is_approved_for_all(&self, owner: &Address, operator: &Address) -> bool {
        self.shares.is_approved(owner, operator)
    }

    pub fn balance_of(&self, holder: &Address, rig_id: RigId) -> u64 {
        self.shares.balance_of(&HoldingKey::new(rig_id, *holder))
    }

    pub fn balance_of_batch(
        &self,
        holders: &[Address],
        rig_ids: &[RigId],
    ) -> Result<Vec<u64>, LedgerError> {
        if holders.len() != rig_ids.len() {
            return Err(LedgerError::LengthMismatch {
                ids: rig_ids.len(),
                amounts: holders.len(),
            });
        }
        Ok(holders
            .iter()
            .zip(rig_ids)
            .map(|(h, id)| self.balance_of(h, *id))
            .collect())
    }

    // ------------------------------------------------------------------
    // Reward accountant
    // ------------------------------------------------------------------

    /// Claimable reward: banked credit plus unsettled accrual. Read-only.
    pub fn pending(&self, rig_id: RigId, holder: &Address) -> Result<u128, LedgerError> {
        let acc = self.get(rig_id)?.acc_reward_per_share;
        let key = HoldingKey::new(rig_id, *holder);
        self.rewards.pending(&key, self.shares.balance_of(&key), acc)
    }

    pub fn reward_debt(&self, rig_id: RigId, holder: &Address) -> u128 {
        self.rewards
            .account(&HoldingKey::new(rig_id, *holder))
            .reward_debt
    }

    /// Full position of `holder` in `rig_id`; zero-valued if never touched.
    pub fn holding(&self, rig_id: RigId, holder: &Address) -> Holding {
        let key = HoldingKey::new(rig_id, *holder);
        let account = self.rewards.account(&key);
        Holding {
            balance: self.shares.balance_of(&key),
            reward_debt: account.reward_debt,
            pending_credit: account.pending_credit,
        }
    }

    /// Bank `holder`'s accrued reward in `rig_id`. Returns the amount banked.
    pub fn settle(&mut self, rig_id: RigId, holder: &Address) -> Result<u128, LedgerError> {
        self.atomic(|l| l.settle_holder(rig_id, holder))
    }

    /// Distribute `value` over the minted shares of `rig_id`. Admin only.
    ///
    /// Returns the new accumulator value.
    pub fn deposit(
        &mut self,
        caller: &Address,
        rig_id: RigId,
        value: u128,
    ) -> Result<u128, LedgerError> {
        self.atomic(|l| {
            l.require_admin(caller)?;
            let increment = accountant::deposit_increment(l.registry.get(rig_id)?, value)?;
            let acc = l.registry.add_reward(rig_id, increment, &mut l.journal)?;
            l.emit(LedgerEvent::RewardsDeposited {
                rig_id,
                depositor: *caller,
                value,
            });
            info!(rig_id, value, acc, "rewards deposited");
            Ok(acc)
        })
    }

    // ------------------------------------------------------------------
    // Claim disbursement
    // ------------------------------------------------------------------

    /// Pay `holder` everything claimable in `rig_id` through `payout`.
    ///
    /// The credit is zeroed before `payout` runs. A nested claim by the same
    /// holder therefore sees nothing to claim and fails with `NoRewards`; any
    /// other nested claim that has something to pay fails with
    /// `ReentrantCall`. If `payout` fails, the claim and everything done
    /// inside the payout are rolled back.
    pub fn claim(
        &mut self,
        holder: &Address,
        rig_id: RigId,
        payout: &mut dyn PayoutSink,
    ) -> Result<u128, LedgerError> {
        self.atomic(|l| {
            if l.pending(rig_id, holder)? == 0 {
                return Err(LedgerError::NoRewards);
            }
            let flight = l.flight.enter()?;
            l.settle_holder(rig_id, holder)?;

            flight.advance(ClaimPhase::Zeroing);
            let amount = l
                .rewards
                .take_credit(HoldingKey::new(rig_id, *holder), &mut l.journal);
            if amount == 0 {
                return Err(LedgerError::NoRewards);
            }
            l.emit(LedgerEvent::RewardsClaimed {
                rig_id,
                holder: *holder,
                amount,
            });

            flight.advance(ClaimPhase::Paying);
            payout.pay_out(l, holder, amount).map_err(|reason| {
                warn!(rig_id, %holder, amount, %reason, "payout rejected");
                LedgerError::PayoutRejected(reason)
            })?;
            info!(rig_id, %holder, amount, "rewards claimed");
            Ok(amount)
        })
    }

    pub fn claim_phase(&self) -> ClaimPhase {
        self.flight.phase()
    }

    // ------------------------------------------------------------------
    // Persistence support
    // ------------------------------------------------------------------

    /// Drain everything committed since the previous drain.
    pub fn take_changes(&mut self) -> ChangeSet {
        debug_assert_eq!(self.journal.depth(), 0, "drain inside an operation");
        let mut changes = ChangeSet {
            events: std::mem::take(&mut self.events),
            ..ChangeSet::default()
        };
        for touched in self.journal.take_touched() {
            match touched {
                Touched::Rig(id) => {
                    if let Ok(rig) = self.registry.get(id) {
                        changes.rigs.push(rig.clone());
                    }
                }
                Touched::Holding(key) => {
                    changes
                        .holdings
                        .push((key, self.holding(key.rig_id, &key.holder)));
                }
                Touched::Approval(owner, operator) => {
                    let approved = self.shares.is_approved(&owner, &operator);
                    changes.approvals.push((owner, operator, approved));
                }
            }
        }
        changes
    }

    /// Put back a drained [`ChangeSet`] that could not be persisted.
    ///
    /// Its slots are marked dirty again, so the next drain reports their
    /// current values, and its events go ahead of anything emitted since.
    pub fn requeue_changes(&mut self, changes: ChangeSet) {
        for rig in &changes.rigs {
            self.journal.mark(Touched::Rig(rig.id));
        }
        for (key, _) in &changes.holdings {
            self.journal.mark(Touched::Holding(*key));
        }
        for (owner, operator, _) in &changes.approvals {
            self.journal.mark(Touched::Approval(*owner, *operator));
        }
        let later = std::mem::replace(&mut self.events, changes.events);
        self.events.extend(later);
    }

    /// Events emitted since the last drain.
    pub fn recent_events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Sum of holder balances for a rig; equals `minted_shares` after every operation.
    pub fn total_held(&self, rig_id: RigId) -> u128 {
        self.shares.total_held(rig_id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn atomic<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        self.transaction(op)
    }

    /// Run several ledger operations plus caller-side effects as one unit.
    ///
    /// If `op` fails, every ledger change made inside it is rolled back,
    /// including the effects of operations that had already succeeded.
    pub fn transaction<T, E: fmt::Display>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let checkpoint = self.journal.begin(self.events.len());
        match op(self) {
            Ok(value) => {
                self.journal.commit(checkpoint);
                Ok(value)
            }
            Err(err) => {
                self.revert(checkpoint);
                debug!(error = %err, "operation rolled back");
                Err(err)
            }
        }
    }

    fn revert(&mut self, checkpoint: Checkpoint) {
        for undo in self.journal.rollback(checkpoint) {
            match undo {
                Undo::Rig { id, prev } => self.registry.restore(id, prev),
                Undo::Balance { key, prev } => self.shares.restore_balance(key, prev),
                Undo::Account { key, prev } => self.rewards.restore(key, prev),
                Undo::Approval {
                    owner,
                    operator,
                    prev,
                } => self.shares.restore_approval(owner, operator, prev),
            }
        }
        self.events.truncate(checkpoint.events);
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    fn require_admin(&self, caller: &Address) -> Result<(), LedgerError> {
        if self.admin.is_admin(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    fn require_operator(&self, owner: &Address, operator: &Address) -> Result<(), LedgerError> {
        if self.shares.may_operate(owner, operator) {
            Ok(())
        } else {
            Err(LedgerError::NotApproved)
        }
    }

    /// Settlement hook: bank accrual against the holder's current balance.
    fn settle_holder(&mut self, rig_id: RigId, holder: &Address) -> Result<u128, LedgerError> {
        let acc = self.registry.get(rig_id)?.acc_reward_per_share;
        let key = HoldingKey::new(rig_id, *holder);
        let balance = self.shares.balance_of(&key);
        let banked = self.rewards.settle(key, balance, acc, &mut self.journal)?;
        if banked > 0 {
            debug!(rig_id, %holder, balance, banked, "settled");
        }
        Ok(banked)
    }

    fn rebaseline_holder(&mut self, rig_id: RigId, holder: &Address) -> Result<(), LedgerError> {
        let acc = self.registry.get(rig_id)?.acc_reward_per_share;
        let key = HoldingKey::new(rig_id, *holder);
        let balance = self.shares.balance_of(&key);
        self.rewards.rebaseline(key, balance, acc, &mut self.journal)
    }

    fn move_shares(
        &mut self,
        from: &Address,
        to: &Address,
        rig_id: RigId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.registry.get(rig_id)?;
        let have = self.balance_of(from, rig_id);
        if have < amount {
            return Err(LedgerError::InsufficientBalance { have, need: amount });
        }

        self.settle_holder(rig_id, from)?;
        self.settle_holder(rig_id, to)?;

        self.shares
            .debit(HoldingKey::new(rig_id, *from), amount, &mut self.journal)?;
        self.shares
            .credit(HoldingKey::new(rig_id, *to), amount, &mut self.journal)?;

        self.rebaseline_holder(rig_id, from)?;
        self.rebaseline_holder(rig_id, to)
    }

    fn notify_single(
        &self,
        operator: &Address,
        from: &Address,
        to: &Address,
        rig_id: RigId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        if let Some(receiver) = self.receivers.get(to) {
            if !receiver.on_received(operator, from, rig_id, amount) {
                warn!(%to, rig_id, amount, "transfer rejected by receiver");
                return Err(LedgerError::TransferRejected);
            }
        }
        Ok(())
    }

    fn notify_batch(
        &self,
        operator: &Address,
        from: &Address,
        to: &Address,
        rig_ids: &[RigId],
        amounts: &[u64],
    ) -> Result<(), LedgerError> {
        if let Some(receiver) = self.receivers.get(to) {
            if !receiver.on_batch_received(operator, from, rig_ids, amounts) {
                warn!(%to, legs = rig_ids.len(), "batch transfer rejected by receiver");
                return Err(LedgerError::TransferRejected);
            }
        }
        Ok(())
    }
}
