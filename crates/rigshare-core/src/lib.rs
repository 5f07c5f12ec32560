//! # rigshare-core
//! Share ledger and reward accounting for fractional mining-rig ownership.
//!
//! All value arithmetic is integer-only with u128 intermediates.
//!
//! The crate is organised leaf-first:
//! - [`fixed`]: fixed-point helpers for the reward accumulator.
//! - [`registry`]: per-rig configuration and the running accumulator.
//! - [`shares`]: multi-rig balance table, mint cap, operator approvals.
//! - [`accountant`]: per-holder reward debt and banked credit.
//! - [`journal`]: undo log giving every operation all-or-nothing semantics.
//! - [`flight`]: single-flight guard for claim disbursement.
//! - [`ledger`]: the [`RigLedger`] facade tying it all together.

pub mod accountant;
pub mod constants;
pub mod error;
pub mod events;
pub mod fixed;
pub mod flight;
pub mod journal;
pub mod ledger;
pub mod registry;
pub mod shares;
pub mod traits;
pub mod types;

pub use error::{LedgerError, RigshareError};
pub use events::LedgerEvent;
pub use flight::ClaimPhase;
pub use ledger::{ChangeSet, LedgerSnapshot, RigLedger};
pub use traits::{AdminGate, PayoutSink, ShareReceiver, SingleAdmin};
pub use types::{Address, Holding, HoldingKey, Rig, RigId};
