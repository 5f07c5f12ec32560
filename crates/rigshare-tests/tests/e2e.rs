//! End-to-end runs through a persisted node.

use rigshare_core::constants::UNIT;
use rigshare_core::{LedgerError, RigshareError};
use rigshare_node_lib::{Node, NodeConfig};
use rigshare_tests::helpers::{addr, ADMIN};

fn config_in(dir: &tempfile::TempDir) -> NodeConfig {
    NodeConfig {
        data_dir: dir.path().to_path_buf(),
        admin: ADMIN,
        ..NodeConfig::default()
    }
}

#[test]
fn banked_credit_survives_restart_after_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, filler) = (addr(1), addr(2), addr(9));
    {
        let node = Node::open(config_in(&dir)).unwrap();
        node.fund_account(&ADMIN, &ADMIN, 500 * UNIT).unwrap();
        for who in [a, filler] {
            node.fund_account(&ADMIN, &who, 100 * UNIT).unwrap();
        }
        node.register_rig(&ADMIN, 7, 100, UNIT).unwrap();
        node.buy_shares(&a, 7, 10, 10 * UNIT).unwrap();
        node.buy_shares(&filler, 7, 90, 90 * UNIT).unwrap();
        node.deposit_rewards(&ADMIN, 7, 50 * UNIT).unwrap();
        node.transfer_shares(&a, &a, &b, 7, 5).unwrap();
    }

    let node = Node::open(config_in(&dir)).unwrap();
    let (holding, pending) = node.holding(7, &a).unwrap();
    assert_eq!(holding.balance, 5);
    assert_eq!(holding.pending_credit, 5 * UNIT);
    assert_eq!(pending, 5 * UNIT);
    assert_eq!(node.pending_rewards(7, &b).unwrap(), 0);

    assert_eq!(node.claim_rewards(&a, 7).unwrap(), 5 * UNIT);
    assert!(matches!(
        node.claim_rewards(&b, 7),
        Err(RigshareError::Ledger(LedgerError::NoRewards))
    ));
    assert_eq!(node.account_balance(&a), 95 * UNIT);
}

#[test]
fn treasury_tracks_value_flows() {
    let dir = tempfile::tempdir().unwrap();
    let a = addr(1);
    let node = Node::open(config_in(&dir)).unwrap();
    node.fund_account(&ADMIN, &ADMIN, 100 * UNIT).unwrap();
    node.fund_account(&ADMIN, &a, 20 * UNIT).unwrap();

    node.register_rig(&ADMIN, 1, 10, 2 * UNIT).unwrap();
    node.buy_shares(&a, 1, 10, 20 * UNIT).unwrap();
    node.deposit_rewards(&ADMIN, 1, 30 * UNIT).unwrap();
    node.receive(&ADMIN, 5 * UNIT).unwrap();
    assert_eq!(node.info().unwrap().treasury, 55 * UNIT);

    assert_eq!(node.claim_rewards(&a, 1).unwrap(), 30 * UNIT);
    assert_eq!(node.info().unwrap().treasury, 25 * UNIT);
    assert_eq!(node.account_balance(&a), 30 * UNIT);
    assert_eq!(node.account_balance(&ADMIN), 65 * UNIT);
}

#[test]
fn unfunded_purchase_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let a = addr(1);
    let node = Node::open(config_in(&dir)).unwrap();
    node.register_rig(&ADMIN, 1, 10, UNIT).unwrap();

    assert!(matches!(
        node.buy_shares(&a, 1, 1, UNIT),
        Err(RigshareError::InsufficientFunds { have: 0, need }) if need == UNIT
    ));
    assert_eq!(node.rig(1).unwrap().minted_shares, 0);
    assert_eq!(node.balance_of(&a, 1), 0);
}
