//! Undo journal giving ledger operations all-or-nothing semantics.
//!
//! Every mutation of ledger state records the value it overwrote. An operation
//! opens a [`Checkpoint`]; on failure the entries recorded since the checkpoint
//! are replayed newest-first to restore the prior state, on success they are
//! kept until the outermost operation commits. Checkpoints nest, so a call
//! re-entering the ledger from a payout callback is rolled back together with
//! the claim that triggered it.
//!
//! When the outermost operation commits, the keys it touched move to a dirty
//! set that persistence layers drain with [`Journal::take_touched`].

use std::collections::BTreeSet;

use crate::accountant::RewardAccount;
use crate::types::{Address, HoldingKey, Rig, RigId};

/// The prior value of one mutated slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    Rig { id: RigId, prev: Option<Rig> },
    Balance { key: HoldingKey, prev: u64 },
    Account { key: HoldingKey, prev: RewardAccount },
    Approval { owner: Address, operator: Address, prev: bool },
}

impl Undo {
    fn touched(&self) -> Touched {
        match self {
            Self::Rig { id, .. } => Touched::Rig(*id),
            Self::Balance { key, .. } | Self::Account { key, .. } => Touched::Holding(*key),
            Self::Approval { owner, operator, .. } => Touched::Approval(*owner, *operator),
        }
    }
}

/// A state slot changed by committed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Touched {
    Rig(RigId),
    Holding(HoldingKey),
    Approval(Address, Address),
}

/// Position in the journal and event log at the start of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    entries: usize,
    pub events: usize,
}

#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<Undo>,
    depth: usize,
    touched: BTreeSet<Touched>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a (possibly nested) operation.
    pub fn begin(&mut self, events: usize) -> Checkpoint {
        self.depth += 1;
        Checkpoint {
            entries: self.entries.len(),
            events,
        }
    }

    /// Record the prior value of a slot about to be overwritten.
    ///
    /// Outside any operation (e.g. while restoring a snapshot) nothing is recorded.
    pub fn record(&mut self, undo: Undo) {
        if self.depth > 0 {
            self.entries.push(undo);
        }
    }

    /// Close an operation successfully.
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        debug_assert!(self.depth > 0 && checkpoint.entries <= self.entries.len());
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            for entry in self.entries.drain(..) {
                self.touched.insert(entry.touched());
            }
        }
    }

    /// Close an operation as failed, returning the entries to replay, newest first.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> Vec<Undo> {
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
        let mut undone = self.entries.split_off(checkpoint.entries.min(self.entries.len()));
        undone.reverse();
        undone
    }

    /// Nesting depth of open operations.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of entries recorded by operations still open.
    pub fn pending_entries(&self) -> usize {
        self.entries.len()
    }

    /// Mark a slot dirty again, e.g. after a failed write of a drained set.
    pub fn mark(&mut self, touched: Touched) {
        self.touched.insert(touched);
    }

    /// Drain the set of slots changed by committed operations.
    pub fn take_touched(&mut self) -> BTreeSet<Touched> {
        std::mem::take(&mut self.touched)
    }
}
