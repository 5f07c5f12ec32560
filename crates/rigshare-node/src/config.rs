//! Node configuration for the Rigshare ledger service.
//!
//! [`NodeConfig`] has working defaults. [`NodeConfig::load`] layers an
//! optional TOML file and `RIGSHARE_*` environment variables on top of them;
//! command-line flags are applied by the binary afterwards.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use rigshare_core::constants::DEFAULT_RPC_PORT;
use rigshare_core::{Address, RigshareError};

/// Configuration for a ledger node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// Log level filter string (e.g. "info", "debug", "rigshare_core=trace").
    pub log_level: String,
    /// The single address allowed to register rigs, deposit rewards and fund accounts.
    pub admin: Address,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rigshare");

        Self {
            data_dir,
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            log_level: "info".to_string(),
            admin: Address::ZERO,
        }
    }
}

impl NodeConfig {
    /// Defaults, then `file` (if given), then `RIGSHARE_*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, RigshareError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().into_owned())
            .and_then(|b| b.set_default("rpc_bind", defaults.rpc_bind))
            .and_then(|b| b.set_default("rpc_port", defaults.rpc_port as i64))
            .and_then(|b| b.set_default("log_level", defaults.log_level))
            .and_then(|b| b.set_default("admin", defaults.admin.to_string()))
            .map_err(config_error)?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix("RIGSHARE"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)
    }

    /// Path to the RocksDB ledger data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }

    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }
}

fn config_error(e: config::ConfigError) -> RigshareError {
    RigshareError::Config(e.to_string())
}
