//! Property tests over random operation sequences.
//!
//! Each case drives a ledger with two rigs and four holders through a random
//! mix of purchases, deposits, transfers, settlements and claims. Failures
//! are expected and ignored; the invariants must hold after every step
//! whether the step committed or rolled back.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rigshare_core::{Address, RigId, RigLedger};
use rigshare_tests::helpers::*;

const RIGS: [(RigId, u64); 2] = [(1, 1_000), (2, 37)];

#[derive(Debug, Clone)]
enum Op {
    Buy { rig: usize, who: u8, amount: u64 },
    Deposit { rig: usize, value: u128 },
    Transfer { rig: usize, from: u8, to: u8, amount: u64 },
    Batch { from: u8, to: u8, amounts: (u64, u64) },
    Settle { rig: usize, who: u8 },
    Claim { rig: usize, who: u8 },
}

fn op() -> impl Strategy<Value = Op> {
    let rig = 0..RIGS.len();
    let who = 1u8..=4;
    prop_oneof![
        (rig.clone(), who.clone(), 0u64..400).prop_map(|(rig, who, amount)| Op::Buy { rig, who, amount }),
        (rig.clone(), 0u128..1_000_000).prop_map(|(rig, value)| Op::Deposit { rig, value }),
        (rig.clone(), who.clone(), who.clone(), 0u64..300)
            .prop_map(|(rig, from, to, amount)| Op::Transfer { rig, from, to, amount }),
        (who.clone(), who.clone(), 0u64..50, 0u64..50)
            .prop_map(|(from, to, a, b)| Op::Batch { from, to, amounts: (a, b) }),
        (rig.clone(), who.clone()).prop_map(|(rig, who)| Op::Settle { rig, who }),
        (rig, who).prop_map(|(rig, who)| Op::Claim { rig, who }),
    ]
}

fn fresh() -> RigLedger {
    let mut l = ledger();
    for (id, total) in RIGS {
        l.register(&ADMIN, id, total, 3).unwrap();
    }
    l
}

/// Per-rig bookkeeping kept outside the ledger.
#[derive(Default)]
struct Tally {
    deposited: BTreeMap<RigId, u128>,
    claimed: BTreeMap<RigId, u128>,
    /// Debt re-baselines at a new balance. Each floors `balance * acc` and
    /// may round a holder up by less than one base unit.
    rebaselines: u128,
}

fn apply(l: &mut RigLedger, op: &Op, tally: &mut Tally) {
    match *op {
        Op::Buy { rig, who, amount } => {
            let id = RIGS[rig].0;
            if l.purchase(&addr(who), id, amount, 3 * amount as u128).is_ok() {
                tally.rebaselines += 1;
            }
        }
        Op::Deposit { rig, value } => {
            let id = RIGS[rig].0;
            if l.deposit(&ADMIN, id, value).is_ok() {
                *tally.deposited.entry(id).or_default() += value;
            }
        }
        Op::Transfer { rig, from, to, amount } => {
            if l.transfer(&addr(from), &addr(from), &addr(to), RIGS[rig].0, amount).is_ok() {
                tally.rebaselines += 2;
            }
        }
        Op::Batch { from, to, amounts } => {
            let legs = l.batch_transfer(
                &addr(from),
                &addr(from),
                &addr(to),
                &[RIGS[0].0, RIGS[1].0],
                &[amounts.0, amounts.1],
            );
            if legs.is_ok() {
                tally.rebaselines += 4;
            }
        }
        Op::Settle { rig, who } => {
            let _ = l.settle(RIGS[rig].0, &addr(who));
        }
        Op::Claim { rig, who } => {
            let id = RIGS[rig].0;
            let mut wallet = Wallet::default();
            if l.claim(&addr(who), id, &mut wallet).is_ok() {
                *tally.claimed.entry(id).or_default() += wallet.total();
            }
        }
    }
}

fn holders() -> impl Iterator<Item = Address> {
    (1u8..=4).map(addr)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Σ balance == minted <= total after every step.
    #[test]
    fn supply_is_conserved(ops in prop::collection::vec(op(), 1..60)) {
        let mut l = fresh();
        let mut tally = Tally::default();
        for op in &ops {
            apply(&mut l, op, &mut tally);
            prop_assert!(check_supply(&l).is_ok(), "{:?}", check_supply(&l));
        }
    }

    /// The accumulator never decreases.
    #[test]
    fn accumulator_is_monotonic(ops in prop::collection::vec(op(), 1..60)) {
        let mut l = fresh();
        let mut tally = Tally::default();
        let mut last: BTreeMap<RigId, u128> = BTreeMap::new();
        for op in &ops {
            apply(&mut l, op, &mut tally);
            for (id, _) in RIGS {
                let acc = l.acc_reward_per_share(id).unwrap();
                let prev = last.insert(id, acc).unwrap_or(0);
                prop_assert!(acc >= prev);
            }
        }
    }

    /// Nothing is paid or owed beyond what was deposited, up to rounding at
    /// re-baselines.
    #[test]
    fn no_value_beyond_rounding(ops in prop::collection::vec(op(), 1..80)) {
        let mut l = fresh();
        let mut tally = Tally::default();
        for op in &ops {
            apply(&mut l, op, &mut tally);
        }
        for (id, _) in RIGS {
            let deposited = tally.deposited.get(&id).copied().unwrap_or(0);
            let claimed = tally.claimed.get(&id).copied().unwrap_or(0);
            let owed: u128 = holders().map(|h| l.pending(id, &h).unwrap()).sum();
            prop_assert!(
                claimed + owed <= deposited + tally.rebaselines,
                "rig {id}: {claimed} + {owed} > {deposited} + {}",
                tally.rebaselines
            );
        }
    }

    /// Settling twice in a row changes nothing the second time, and leaves
    /// the debt at `balance * acc / PRECISION`.
    #[test]
    fn settle_is_idempotent(ops in prop::collection::vec(op(), 1..60)) {
        let mut l = fresh();
        let mut tally = Tally::default();
        for op in &ops {
            apply(&mut l, op, &mut tally);
        }
        for (id, _) in RIGS {
            for h in holders() {
                let pending = l.pending(id, &h).unwrap();
                l.settle(id, &h).unwrap();
                let once = l.holding(id, &h);
                prop_assert!(debt_is_current(&l, id, &h));
                prop_assert_eq!(l.settle(id, &h).unwrap(), 0);
                prop_assert_eq!(l.holding(id, &h), once);
                prop_assert_eq!(once.pending_credit, pending);
            }
        }
    }

    /// A claim pays exactly what `pending` reported and leaves nothing behind.
    #[test]
    fn claim_pays_pending(ops in prop::collection::vec(op(), 1..60)) {
        let mut l = fresh();
        let mut tally = Tally::default();
        for op in &ops {
            apply(&mut l, op, &mut tally);
        }
        for (id, _) in RIGS {
            for h in holders() {
                let pending = l.pending(id, &h).unwrap();
                let mut wallet = Wallet::default();
                match l.claim(&h, id, &mut wallet) {
                    Ok(paid) => {
                        prop_assert_eq!(paid, pending);
                        prop_assert_eq!(wallet.total(), pending);
                    }
                    Err(e) => {
                        prop_assert_eq!(pending, 0);
                        prop_assert_eq!(e, rigshare_core::LedgerError::NoRewards);
                    }
                }
                prop_assert_eq!(l.pending(id, &h).unwrap(), 0);
                prop_assert!(debt_is_current(&l, id, &h));
            }
        }
    }

    /// A failed operation leaves the snapshot byte-for-byte unchanged.
    #[test]
    fn failures_roll_back_completely(ops in prop::collection::vec(op(), 1..40), extra in op()) {
        let mut l = fresh();
        let mut tally = Tally::default();
        for op in &ops {
            apply(&mut l, op, &mut tally);
        }
        l.take_changes();
        let before = l.snapshot();
        let committed = match extra {
            Op::Buy { rig, who, amount } => {
                l.purchase(&addr(who), RIGS[rig].0, amount, 3 * amount as u128).is_ok()
            }
            Op::Deposit { rig, value } => l.deposit(&ADMIN, RIGS[rig].0, value).is_ok(),
            Op::Transfer { rig, from, to, amount } => {
                l.transfer(&addr(from), &addr(from), &addr(to), RIGS[rig].0, amount).is_ok()
            }
            Op::Batch { from, to, amounts } => l
                .batch_transfer(
                    &addr(from),
                    &addr(from),
                    &addr(to),
                    &[RIGS[0].0, RIGS[1].0],
                    &[amounts.0, amounts.1],
                )
                .is_ok(),
            Op::Settle { rig, who } => l.settle(RIGS[rig].0, &addr(who)).is_ok(),
            Op::Claim { rig, who } => l.claim(&addr(who), RIGS[rig].0, &mut Refuse).is_ok(),
        };
        if !committed {
            prop_assert_eq!(l.snapshot(), before);
            prop_assert!(l.take_changes().is_empty());
        }
    }
}
