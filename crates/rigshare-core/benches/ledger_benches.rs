//! Criterion benchmarks for rigshare-core hot paths.
//!
//! Covers: fixed-point accrual, purchase, deposit, claim, transfer and
//! snapshot serialization.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rigshare_core::constants::{PRECISION, UNIT};
use rigshare_core::fixed;
use rigshare_core::{Address, PayoutSink, RigLedger, SingleAdmin};

const ADMIN: Address = Address([0xAD; 20]);

struct Discard;

impl PayoutSink for Discard {
    fn pay_out(&mut self, _: &mut RigLedger, _: &Address, _: u128) -> Result<(), String> {
        Ok(())
    }
}

fn holder(i: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[..8].copy_from_slice(&i.to_be_bytes());
    bytes[19] = 1;
    Address(bytes)
}

/// A ledger with one rig fully sold across `holders` addresses.
fn populated_ledger(holders: u64) -> RigLedger {
    let mut ledger = RigLedger::new(SingleAdmin(ADMIN));
    ledger.register(&ADMIN, 1, holders * 10, UNIT).expect("register");
    for i in 0..holders {
        ledger
            .purchase(&holder(i), 1, 10, 10 * UNIT)
            .expect("purchase");
    }
    ledger.take_changes();
    ledger
}

fn bench_fixed(c: &mut Criterion) {
    c.bench_function("fixed_accrued", |b| {
        b.iter(|| fixed::accrued(black_box(123_456_789), black_box(7 * UNIT * PRECISION)))
    });
    c.bench_function("fixed_per_share", |b| {
        b.iter(|| fixed::per_share(black_box(1_000 * UNIT), black_box(3_333)))
    });
}

fn bench_operations(c: &mut Criterion) {
    c.bench_function("purchase_1000_holders", |b| {
        b.iter(|| populated_ledger(black_box(1_000)))
    });

    let mut ledger = populated_ledger(1_000);
    c.bench_function("deposit", |b| {
        b.iter(|| ledger.deposit(&ADMIN, 1, black_box(1_000)).expect("deposit"))
    });

    c.bench_function("deposit_then_claim", |b| {
        b.iter(|| {
            ledger.deposit(&ADMIN, 1, 1_000).expect("deposit");
            ledger.claim(&holder(7), 1, &mut Discard).expect("claim")
        })
    });

    c.bench_function("transfer_roundtrip", |b| {
        b.iter(|| {
            ledger
                .transfer(&holder(1), &holder(1), &holder(2), 1, 5)
                .expect("transfer");
            ledger
                .transfer(&holder(2), &holder(2), &holder(1), 1, 5)
                .expect("transfer back");
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let ledger = populated_ledger(1_000);
    let snapshot = ledger.snapshot();
    c.bench_function("snapshot_encode", |b| {
        b.iter(|| {
            bincode::encode_to_vec(black_box(&snapshot), bincode::config::standard())
                .expect("encode failed")
        })
    });
}

criterion_group!(benches, bench_fixed, bench_operations, bench_snapshot);
criterion_main!(benches);
