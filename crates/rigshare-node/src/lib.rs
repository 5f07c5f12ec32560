//! # rigshare-node: ledger hosting, RocksDB, RPC.
//!
//! Wraps a [`rigshare_core::RigLedger`] in a long-running service:
//! - [`storage::RocksStore`]: persistent ledger state backed by RocksDB
//! - [`bank::ValueBook`]: value accounts, treasury, and the claim payout sink
//! - [`node::Node`]: serialises operations and persists each committed one
//! - [`rpc`]: JSON-RPC server for external access
//! - [`config::NodeConfig`]: node configuration

pub mod bank;
pub mod config;
pub mod node;
pub mod rpc;
pub mod storage;

pub use bank::ValueBook;
pub use config::NodeConfig;
pub use node::Node;
pub use rpc::start_rpc_server;
pub use storage::RocksStore;
