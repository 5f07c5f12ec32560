//! rigshare-cli: command-line client for a Rigshare ledger node.
//!
//! Every subcommand maps to one JSON-RPC call. Value amounts are integer
//! base units (`1 unit = 10^18`); `--units` on value flags accepts decimal
//! whole units instead.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::Value;
use tracing::debug;

use rigshare_core::constants::{DEFAULT_RPC_PORT, UNIT};
use rigshare_core::{Address, RigId};

/// Build an [`ArrayParams`] from a list of serialisable values.
macro_rules! params {
    ($($value:expr),* $(,)?) => {{
        let mut params = ArrayParams::new();
        $( params.insert($value).context("failed to encode RPC parameter")?; )*
        params
    }};
}

/// Rigshare ledger command-line client.
#[derive(Parser)]
#[command(name = "rigshare-cli")]
#[command(version, about = "Buy, transfer and claim fractional mining-rig shares.")]
struct Cli {
    /// RPC endpoint URL.
    #[arg(short, long, global = true, default_value_t = format!("http://127.0.0.1:{DEFAULT_RPC_PORT}"))]
    rpc_endpoint: String,

    /// Interpret value arguments as decimal whole units instead of base units.
    #[arg(long, global = true)]
    units: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new rig (admin).
    Register(RegisterArgs),
    /// Buy shares of a rig.
    Buy(BuyArgs),
    /// Deposit rewards into a rig (admin).
    Deposit(DepositArgs),
    /// Claim pending rewards.
    Claim(ClaimArgs),
    /// Transfer shares of one rig.
    Transfer(TransferArgs),
    /// Transfer shares of several rigs at once.
    BatchTransfer(BatchTransferArgs),
    /// Grant or revoke an operator over all of your shares.
    Approve(ApproveArgs),
    /// Show one rig, or all rigs.
    Rig(RigArgs),
    /// Show a holder's position in a rig.
    Balance(HolderArgs),
    /// Show a holder's claimable rewards in a rig.
    Pending(HolderArgs),
    /// List ledger events.
    Events(EventsArgs),
    /// Show one value account, or all of them.
    Accounts(AccountsArgs),
    /// Issue value into an account (admin).
    Fund(FundArgs),
    /// Send value to the treasury without distributing it.
    SendToTreasury(SendArgs),
    /// Show node info.
    Info,
}

#[derive(Args)]
struct RegisterArgs {
    /// Acting address (must be the admin).
    #[arg(short, long)]
    caller: Address,
    #[arg(long)]
    rig_id: RigId,
    #[arg(long)]
    total_shares: u64,
    /// Price per share.
    #[arg(long)]
    price: String,
}

#[derive(Args)]
struct BuyArgs {
    #[arg(short, long)]
    caller: Address,
    #[arg(long)]
    rig_id: RigId,
    #[arg(long)]
    amount: u64,
    /// Payment; defaults to `amount * price` read from the node.
    #[arg(long)]
    paid: Option<String>,
}

#[derive(Args)]
struct DepositArgs {
    #[arg(short, long)]
    caller: Address,
    #[arg(long)]
    rig_id: RigId,
    #[arg(long)]
    value: String,
}

#[derive(Args)]
struct ClaimArgs {
    #[arg(short, long)]
    caller: Address,
    #[arg(long)]
    rig_id: RigId,
}

#[derive(Args)]
struct TransferArgs {
    /// Acting address (owner or approved operator).
    #[arg(short, long)]
    caller: Address,
    /// Owner of the shares; defaults to the caller.
    #[arg(long)]
    from: Option<Address>,
    #[arg(long)]
    to: Address,
    #[arg(long)]
    rig_id: RigId,
    #[arg(long)]
    amount: u64,
}

#[derive(Args)]
struct BatchTransferArgs {
    #[arg(short, long)]
    caller: Address,
    #[arg(long)]
    from: Option<Address>,
    #[arg(long)]
    to: Address,
    /// Comma-separated rig ids.
    #[arg(long, value_delimiter = ',')]
    rig_ids: Vec<RigId>,
    /// Comma-separated amounts, one per rig id.
    #[arg(long, value_delimiter = ',')]
    amounts: Vec<u64>,
}

#[derive(Args)]
struct ApproveArgs {
    #[arg(short, long)]
    caller: Address,
    #[arg(long)]
    operator: Address,
    /// Revoke instead of grant.
    #[arg(long)]
    revoke: bool,
}

#[derive(Args)]
struct RigArgs {
    rig_id: Option<RigId>,
}

#[derive(Args)]
struct HolderArgs {
    #[arg(long)]
    holder: Address,
    #[arg(long)]
    rig_id: RigId,
}

#[derive(Args)]
struct EventsArgs {
    /// First event sequence number.
    #[arg(long, default_value_t = 0)]
    from: u64,
    #[arg(long, default_value_t = 100)]
    limit: usize,
    /// Only events touching this rig.
    #[arg(long)]
    rig_id: Option<RigId>,
}

#[derive(Args)]
struct AccountsArgs {
    address: Option<Address>,
}

#[derive(Args)]
struct FundArgs {
    #[arg(short, long)]
    caller: Address,
    #[arg(long)]
    account: Address,
    #[arg(long)]
    value: String,
}

#[derive(Args)]
struct SendArgs {
    #[arg(short, long)]
    caller: Address,
    #[arg(long)]
    value: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = HttpClientBuilder::default()
        .build(&cli.rpc_endpoint)
        .context("Failed to connect to RPC")?;
    let units = cli.units;

    let result = match cli.command {
        Commands::Register(a) => {
            let price = value_arg(&a.price, units)?;
            call(&client, "registerrig", params![a.caller.to_string(), a.rig_id, a.total_shares, price]).await?
        }
        Commands::Buy(a) => {
            let paid = match a.paid {
                Some(p) => value_arg(&p, units)?,
                None => purchase_cost(&client, a.rig_id, a.amount).await?,
            };
            call(&client, "buyshares", params![a.caller.to_string(), a.rig_id, a.amount, paid]).await?
        }
        Commands::Deposit(a) => {
            let value = value_arg(&a.value, units)?;
            call(&client, "depositrewards", params![a.caller.to_string(), a.rig_id, value]).await?
        }
        Commands::Claim(a) => {
            call(&client, "claimrewards", params![a.caller.to_string(), a.rig_id]).await?
        }
        Commands::Transfer(a) => {
            let from = a.from.unwrap_or(a.caller);
            call(
                &client,
                "transfershares",
                params![a.caller.to_string(), from.to_string(), a.to.to_string(), a.rig_id, a.amount],
            )
            .await?
        }
        Commands::BatchTransfer(a) => {
            if a.rig_ids.len() != a.amounts.len() {
                bail!("{} rig ids but {} amounts", a.rig_ids.len(), a.amounts.len());
            }
            let from = a.from.unwrap_or(a.caller);
            call(
                &client,
                "batchtransfershares",
                params![a.caller.to_string(), from.to_string(), a.to.to_string(), a.rig_ids, a.amounts],
            )
            .await?
        }
        Commands::Approve(a) => {
            call(
                &client,
                "setapprovalforall",
                params![a.caller.to_string(), a.operator.to_string(), !a.revoke],
            )
            .await?
        }
        Commands::Rig(a) => match a.rig_id {
            Some(id) => call(&client, "getrig", params![id]).await?,
            None => call(&client, "listrigs", ArrayParams::new()).await?,
        },
        Commands::Balance(a) => {
            call(&client, "getholding", params![a.rig_id, a.holder.to_string()]).await?
        }
        Commands::Pending(a) => {
            call(&client, "pendingrewards", params![a.rig_id, a.holder.to_string()]).await?
        }
        Commands::Events(a) => {
            call(&client, "getevents", params![a.from, a.limit, a.rig_id]).await?
        }
        Commands::Accounts(a) => match a.address {
            Some(addr) => call(&client, "getaccount", params![addr.to_string()]).await?,
            None => call(&client, "listaccounts", ArrayParams::new()).await?,
        },
        Commands::Fund(a) => {
            let value = value_arg(&a.value, units)?;
            call(&client, "fundaccount", params![a.caller.to_string(), a.account.to_string(), value]).await?
        }
        Commands::SendToTreasury(a) => {
            let value = value_arg(&a.value, units)?;
            call(&client, "sendtotreasury", params![a.caller.to_string(), value]).await?
        }
        Commands::Info => call(&client, "getinfo", ArrayParams::new()).await?,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn call(client: &HttpClient, method: &str, params: ArrayParams) -> Result<Value> {
    debug!(method, "rpc call");
    client
        .request(method, params)
        .await
        .with_context(|| format!("RPC {method} failed"))
}

/// `amount * price` for a rig, as a decimal string.
async fn purchase_cost(client: &HttpClient, rig_id: RigId, amount: u64) -> Result<String> {
    let rig = call(client, "getrig", params![rig_id]).await?;
    let price: u128 = rig["price_per_share"]
        .as_str()
        .context("getrig returned no price")?
        .parse()
        .context("getrig returned a malformed price")?;
    let cost = price
        .checked_mul(amount as u128)
        .context("purchase cost overflows")?;
    Ok(cost.to_string())
}

/// Validate a value argument and convert it to base units.
fn value_arg(raw: &str, units: bool) -> Result<String> {
    let base = if units {
        parse_units(raw)?
    } else {
        raw.trim()
            .parse::<u128>()
            .with_context(|| format!("invalid value {raw:?}: expected a non-negative integer"))?
    };
    Ok(base.to_string())
}

/// Parse decimal whole units (e.g. "1.5") into base units.
fn parse_units(raw: &str) -> Result<u128> {
    let raw = raw.trim();
    let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
    if frac.len() > 18 {
        bail!("at most 18 decimal places are supported");
    }
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().with_context(|| format!("invalid value {raw:?}"))?
    };
    let frac_base: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<18}");
        padded.parse().with_context(|| format!("invalid value {raw:?}"))?
    };
    whole
        .checked_mul(UNIT)
        .and_then(|w| w.checked_add(frac_base))
        .context("value overflows")
}
