//! Boundaries between the ledger and its external collaborators.
//!
//! - [`AdminGate`]: capability predicate guarding registration and deposits.
//! - [`PayoutSink`]: the value transfer performed by a claim.
//! - [`ShareReceiver`]: acceptance callback for contract-like recipients.

use crate::ledger::RigLedger;
use crate::types::{Address, RigId};

/// Decides whether a caller may perform administrative operations.
pub trait AdminGate: Send + Sync {
    fn is_admin(&self, caller: &Address) -> bool;
}

/// A gate that admits exactly one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleAdmin(pub Address);

impl AdminGate for SingleAdmin {
    fn is_admin(&self, caller: &Address) -> bool {
        *caller == self.0
    }
}

impl<F> AdminGate for F
where
    F: Fn(&Address) -> bool + Send + Sync,
{
    fn is_admin(&self, caller: &Address) -> bool {
        self(caller)
    }
}

/// Moves reward value out of the ledger's custody to a holder.
///
/// Called once per successful claim, after the ledger has already zeroed the
/// holder's credit. The sink receives the ledger itself so recipient code can
/// call back into it; every such nested call sees post-payment state.
///
/// Returning `Err` fails the claim and rolls back everything the claim (and
/// any nested call) changed.
pub trait PayoutSink {
    fn pay_out(&mut self, ledger: &mut RigLedger, to: &Address, amount: u128) -> Result<(), String>;
}

/// Acceptance callbacks for recipients that must acknowledge incoming shares.
///
/// Returning `false` aborts the transfer.
pub trait ShareReceiver: Send + Sync {
    fn on_received(
        &self,
        operator: &Address,
        from: &Address,
        rig_id: RigId,
        amount: u64,
    ) -> bool;

    fn on_batch_received(
        &self,
        operator: &Address,
        from: &Address,
        rig_ids: &[RigId],
        amounts: &[u64],
    ) -> bool;
}
