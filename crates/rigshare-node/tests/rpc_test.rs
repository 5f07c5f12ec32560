//! JSON-RPC round trips against a node bound to an ephemeral port.

use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::HttpClientBuilder;
use jsonrpsee::rpc_params;

use rigshare_core::Address;
use rigshare_node_lib::rpc::{ClaimJson, HoldingJson, NodeInfoJson, RigJson};
use rigshare_node_lib::{start_rpc_server, Node, NodeConfig};

const ADMIN: Address = Address([0xAD; 20]);
const ALICE: Address = Address([0xA1; 20]);

#[tokio::test]
async fn purchase_deposit_claim_over_rpc() {
    let dir = tempfile::tempdir().unwrap();
    let node = Node::open(NodeConfig {
        data_dir: dir.path().to_path_buf(),
        admin: ADMIN,
        ..NodeConfig::default()
    })
    .unwrap();
    let (addr, handle) = start_rpc_server("127.0.0.1:0", node).await.unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://{addr}"))
        .unwrap();

    let admin = ADMIN.to_string();
    let alice = ALICE.to_string();

    let _: serde_json::Value = client
        .request("fundaccount", rpc_params![&admin, &alice, "1000"])
        .await
        .unwrap();
    let _: serde_json::Value = client
        .request("fundaccount", rpc_params![&admin, &admin, "1000"])
        .await
        .unwrap();

    let rig: RigJson = client
        .request("registerrig", rpc_params![&admin, 5u64, 10u64, "10"])
        .await
        .unwrap();
    assert_eq!(rig.unsold_shares, 10);

    let holding: HoldingJson = client
        .request("buyshares", rpc_params![&alice, 5u64, 10u64, "100"])
        .await
        .unwrap();
    assert_eq!(holding.balance, 10);

    let rig: RigJson = client
        .request("depositrewards", rpc_params![&admin, 5u64, "70"])
        .await
        .unwrap();
    assert_ne!(rig.acc_reward_per_share, "0");

    let pending: String = client
        .request("pendingrewards", rpc_params![5u64, &alice])
        .await
        .unwrap();
    assert_eq!(pending, "70");

    let claim: ClaimJson = client
        .request("claimrewards", rpc_params![&alice, 5u64])
        .await
        .unwrap();
    assert_eq!(claim.amount, "70");
    assert_eq!(claim.account_balance, "970");

    // Second claim fails with the ledger error code.
    let err = client
        .request::<ClaimJson, _>("claimrewards", rpc_params![&alice, 5u64])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no rewards"));

    let info: NodeInfoJson = client.request("getinfo", rpc_params![]).await.unwrap();
    assert_eq!(info.rigs, 1);
    assert_eq!(info.treasury, "100");

    handle.stop().unwrap();
}
