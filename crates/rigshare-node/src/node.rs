//! Ledger node: one [`RigLedger`] plus its [`ValueBook`], persisted to RocksDB.
//!
//! Operations are serialised through a single mutex. After each operation the
//! node drains whatever the ledger and value book committed and writes it as
//! one batch, so disk state always corresponds to a whole number of
//! operations. A batch that fails to write is put back and goes out with the
//! next successful write (or the next [`Node::flush`]).

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, info};

use rigshare_core::{
    Address, Holding, LedgerError, Rig, RigId, RigLedger, RigshareError, SingleAdmin,
};

use crate::bank::ValueBook;
use crate::config::NodeConfig;
use crate::storage::{CommitBatch, EventRecord, RocksStore};

/// Mutable state guarded by the node lock.
pub struct NodeState {
    pub ledger: RigLedger,
    pub book: ValueBook,
}

/// Aggregate figures reported by `getinfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub rigs: usize,
    pub treasury: u128,
    pub events: u64,
    pub admin: Address,
}

pub struct Node {
    state: Mutex<NodeState>,
    store: RocksStore,
    config: NodeConfig,
}

impl Node {
    /// Open storage and rebuild the ledger from it.
    pub fn open(config: NodeConfig) -> Result<Arc<Self>, RigshareError> {
        let store = RocksStore::open(config.db_path())?;
        let snapshot = store.load_snapshot()?;
        let (treasury, accounts) = store.load_accounts()?;
        let rigs = snapshot.rigs.len();
        let ledger = RigLedger::from_snapshot(SingleAdmin(config.admin), snapshot)?;
        let book = ValueBook::restore(treasury, accounts);
        info!(rigs, treasury, path = %config.db_path().display(), "ledger loaded");

        Ok(Arc::new(Self {
            state: Mutex::new(NodeState { ledger, book }),
            store,
            config,
        }))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    // --- Mutations ---

    pub fn register_rig(
        &self,
        caller: &Address,
        rig_id: RigId,
        total_shares: u64,
        price_per_share: u128,
    ) -> Result<Rig, RigshareError> {
        self.execute(|s| {
            s.ledger.register(caller, rig_id, total_shares, price_per_share)?;
            Ok(s.ledger.get(rig_id)?.clone())
        })
    }

    /// Buy shares, paying `paid` out of the buyer's value account.
    pub fn buy_shares(
        &self,
        buyer: &Address,
        rig_id: RigId,
        amount: u64,
        paid: u128,
    ) -> Result<(), RigshareError> {
        self.execute(|s| {
            let NodeState { ledger, book } = s;
            ledger.transaction(|l| {
                l.purchase(buyer, rig_id, amount, paid)?;
                book.collect(buyer, paid)
            })
        })
    }

    /// Deposit `value` from the caller's account as rewards for `rig_id`.
    ///
    /// Returns the new accumulator value.
    pub fn deposit_rewards(
        &self,
        caller: &Address,
        rig_id: RigId,
        value: u128,
    ) -> Result<u128, RigshareError> {
        self.execute(|s| {
            let NodeState { ledger, book } = s;
            ledger.transaction(|l| {
                let acc = l.deposit(caller, rig_id, value)?;
                book.collect(caller, value)?;
                Ok(acc)
            })
        })
    }

    /// Claim everything pending for `holder` in `rig_id` into their value account.
    pub fn claim_rewards(&self, holder: &Address, rig_id: RigId) -> Result<u128, RigshareError> {
        self.execute(|s| {
            let NodeState { ledger, book } = s;
            Ok(ledger.claim(holder, rig_id, book)?)
        })
    }

    pub fn transfer_shares(
        &self,
        operator: &Address,
        from: &Address,
        to: &Address,
        rig_id: RigId,
        amount: u64,
    ) -> Result<(), RigshareError> {
        self.execute(|s| Ok(s.ledger.transfer(operator, from, to, rig_id, amount)?))
    }

    pub fn batch_transfer_shares(
        &self,
        operator: &Address,
        from: &Address,
        to: &Address,
        rig_ids: &[RigId],
        amounts: &[u64],
    ) -> Result<(), RigshareError> {
        self.execute(|s| Ok(s.ledger.batch_transfer(operator, from, to, rig_ids, amounts)?))
    }

    pub fn set_approval_for_all(
        &self,
        owner: &Address,
        operator: &Address,
        approved: bool,
    ) -> Result<(), RigshareError> {
        self.execute(|s| Ok(s.ledger.set_approval_for_all(owner, operator, approved)?))
    }

    /// Issue value into an account. Admin only.
    pub fn fund_account(
        &self,
        caller: &Address,
        account: &Address,
        value: u128,
    ) -> Result<u128, RigshareError> {
        if *caller != self.config.admin {
            return Err(LedgerError::Unauthorized.into());
        }
        self.execute(|s| s.book.fund(account, value))
    }

    /// Send value to the treasury without distributing it.
    pub fn receive(&self, from: &Address, value: u128) -> Result<(), RigshareError> {
        if value == 0 {
            return Err(LedgerError::NoValue.into());
        }
        self.execute(|s| s.book.receive(from, value))
    }

    // --- Views ---

    pub fn rig(&self, rig_id: RigId) -> Result<Rig, RigshareError> {
        Ok(self.state.lock().ledger.get(rig_id)?.clone())
    }

    pub fn rigs(&self) -> Vec<Rig> {
        self.state.lock().ledger.rigs().cloned().collect()
    }

    /// Holding plus current claimable amount.
    pub fn holding(&self, rig_id: RigId, holder: &Address) -> Result<(Holding, u128), RigshareError> {
        let state = self.state.lock();
        let pending = state.ledger.pending(rig_id, holder)?;
        Ok((state.ledger.holding(rig_id, holder), pending))
    }

    pub fn balance_of(&self, holder: &Address, rig_id: RigId) -> u64 {
        self.state.lock().ledger.balance_of(holder, rig_id)
    }

    pub fn pending_rewards(&self, rig_id: RigId, holder: &Address) -> Result<u128, RigshareError> {
        Ok(self.state.lock().ledger.pending(rig_id, holder)?)
    }

    pub fn account_balance(&self, account: &Address) -> u128 {
        self.state.lock().book.balance(account)
    }

    pub fn accounts(&self) -> Vec<(Address, u128)> {
        self.state
            .lock()
            .book
            .accounts()
            .map(|(a, b)| (*a, *b))
            .collect()
    }

    pub fn events(
        &self,
        from: u64,
        limit: usize,
        rig: Option<RigId>,
    ) -> Result<Vec<EventRecord>, RigshareError> {
        self.store.events(from, limit, rig)
    }

    pub fn info(&self) -> Result<NodeInfo, RigshareError> {
        let state = self.state.lock();
        Ok(NodeInfo {
            rigs: state.ledger.rigs().count(),
            treasury: state.book.treasury(),
            events: self.store.next_event_seq()?,
            admin: self.config.admin,
        })
    }

    /// Write anything still queued, then flush storage buffers to disk.
    pub fn flush(&self) -> Result<(), RigshareError> {
        let mut state = self.state.lock();
        persist(&mut state, |batch| self.store.commit(batch))?;
        self.store.flush()
    }

    // --- Internals ---

    /// Run `op` under the node lock, then persist whatever it committed.
    ///
    /// A failed write does not change the outcome: the operation has already
    /// committed in memory and its changes stay queued for the next write.
    fn execute<T>(
        &self,
        op: impl FnOnce(&mut NodeState) -> Result<T, RigshareError>,
    ) -> Result<T, RigshareError> {
        let mut state = self.state.lock();
        let outcome = op(&mut state);
        if let Err(e) = persist(&mut state, |batch| self.store.commit(batch)) {
            error!(error = %e, "failed to persist committed operation; queued for retry");
        }
        outcome
    }
}

/// Drain committed changes and hand them to `commit` as one batch.
///
/// On failure the drained changes are put back into the ledger and value book.
fn persist(
    state: &mut NodeState,
    commit: impl FnOnce(CommitBatch<'_>) -> Result<Vec<EventRecord>, RigshareError>,
) -> Result<(), RigshareError> {
    let changes = state.ledger.take_changes();
    let accounts = state.book.take_dirty();
    if changes.is_empty() && accounts.is_empty() {
        return Ok(());
    }
    let batch = CommitBatch {
        changes: &changes,
        accounts: &accounts,
        treasury: Some(state.book.treasury()),
        at_ms: Utc::now().timestamp_millis(),
    };
    match commit(batch) {
        Ok(_) => Ok(()),
        Err(e) => {
            state.ledger.requeue_changes(changes);
            state.book.requeue_dirty(&accounts);
            Err(e)
        }
    }
}
