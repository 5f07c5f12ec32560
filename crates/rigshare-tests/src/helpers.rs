//! Shared fixtures for the integration tests.

use rigshare_core::fixed;
use rigshare_core::{Address, PayoutSink, RigId, RigLedger, SingleAdmin};

pub const ADMIN: Address = Address([0xAD; 20]);

/// Deterministic address from a seed byte.
pub fn addr(seed: u8) -> Address {
    Address([seed; 20])
}

/// Empty ledger administered by [`ADMIN`].
pub fn ledger() -> RigLedger {
    RigLedger::new(SingleAdmin(ADMIN))
}

/// Ledger with one registered rig.
pub fn ledger_with_rig(rig_id: RigId, total_shares: u64, price: u128) -> RigLedger {
    let mut l = ledger();
    l.register(&ADMIN, rig_id, total_shares, price).unwrap();
    l
}

/// Buy `amount` shares paying the exact price.
pub fn buy(l: &mut RigLedger, who: &Address, rig_id: RigId, amount: u64) {
    let price = l.share_price(rig_id).unwrap();
    l.purchase(who, rig_id, amount, price * amount as u128).unwrap();
}

/// Payout sink that accepts everything and remembers it.
#[derive(Debug, Default)]
pub struct Wallet {
    pub paid: Vec<(Address, u128)>,
}

impl Wallet {
    pub fn total(&self) -> u128 {
        self.paid.iter().map(|(_, a)| a).sum()
    }
}

impl PayoutSink for Wallet {
    fn pay_out(&mut self, _ledger: &mut RigLedger, to: &Address, amount: u128) -> Result<(), String> {
        self.paid.push((*to, amount));
        Ok(())
    }
}

/// Payout sink that rejects every transfer.
#[derive(Debug, Default)]
pub struct Refuse;

impl PayoutSink for Refuse {
    fn pay_out(&mut self, _ledger: &mut RigLedger, _to: &Address, _amount: u128) -> Result<(), String> {
        Err("recipient refused".into())
    }
}

/// `Σ balance == minted <= total` for every registered rig.
pub fn check_supply(l: &RigLedger) -> Result<(), String> {
    for rig in l.rigs() {
        let held = l.total_held(rig.id);
        if held != rig.minted_shares as u128 {
            return Err(format!("rig {}: held {held} != minted {}", rig.id, rig.minted_shares));
        }
        if rig.minted_shares > rig.total_shares {
            return Err(format!(
                "rig {}: minted {} > total {}",
                rig.id, rig.minted_shares, rig.total_shares
            ));
        }
    }
    Ok(())
}

/// Whether `holder`'s debt sits exactly at `balance * acc / PRECISION`.
pub fn debt_is_current(l: &RigLedger, rig_id: RigId, holder: &Address) -> bool {
    let acc = l.acc_reward_per_share(rig_id).unwrap();
    let balance = l.balance_of(holder, rig_id);
    fixed::accrued(balance, acc).is_ok_and(|debt| l.reward_debt(rig_id, holder) == debt)
}
