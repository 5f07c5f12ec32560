//! Rigshare ledger node binary.
//!
//! Loads the ledger from RocksDB and serves it over JSON-RPC until Ctrl+C.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use rigshare_core::Address;
use rigshare_node_lib::{start_rpc_server, Node, NodeConfig};
use tracing::{error, info, warn};

/// Rigshare ledger node.
#[derive(Parser, Debug)]
#[command(
    name = "rigshare-node",
    version,
    about = "Fractional mining-rig share ledger with RocksDB storage and JSON-RPC server"
)]
struct Args {
    /// Optional TOML config file (RIGSHARE_* environment variables override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for ledger storage
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// RPC server bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// RPC server port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Administrator address (0x-prefixed hex)
    #[arg(long)]
    admin: Option<Address>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    /// Apply command-line overrides on top of a loaded config.
    fn apply(self, mut config: NodeConfig) -> (NodeConfig, String) {
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(bind) = self.rpc_bind {
            config.rpc_bind = bind;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(admin) = self.admin {
            config.admin = admin;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        (config, self.log_format)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let loaded = match NodeConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            process::exit(1);
        }
    };
    let (config, log_format) = args.apply(loaded);

    init_logging(&config.log_level, &log_format);

    info!("Rigshare Node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);
    info!("rpc_addr: {}", config.rpc_addr());
    info!("admin: {}", config.admin);
    if config.admin.is_zero() {
        warn!("admin is the zero address; set --admin or RIGSHARE_ADMIN");
    }

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!("failed to create data_dir: {}", e);
        process::exit(1);
    }

    let node = match Node::open(config.clone()) {
        Ok(n) => n,
        Err(e) => {
            error!("failed to open ledger: {}", e);
            process::exit(1);
        }
    };

    let rpc_handle = match start_rpc_server(&config.rpc_addr(), node.clone()).await {
        Ok((addr, handle)) => {
            info!("RPC server listening on {}", addr);
            handle
        }
        Err(e) => {
            error!("failed to start RPC server: {}", e);
            process::exit(1);
        }
    };

    info!("Rigshare node running (Ctrl+C to stop)");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C: {}", e);
    }
    info!("shutdown signal received");

    rpc_handle.stop().ok();
    rpc_handle.stopped().await;
    info!("RPC server stopped");

    if let Err(e) = node.flush() {
        error!("failed to flush storage: {}", e);
    }
    info!("Rigshare node shutdown complete");
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output (suitable for log
/// aggregation pipelines). Any other value defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
