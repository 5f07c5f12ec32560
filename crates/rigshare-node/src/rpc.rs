//! JSON-RPC server for the Rigshare ledger node.
//!
//! Uses jsonrpsee 0.24. Value amounts travel as decimal strings because they
//! exceed what JSON numbers carry losslessly. The acting address is an
//! explicit parameter on every mutating method.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use rigshare_core::constants::MAX_EVENT_PAGE;
use rigshare_core::{Address, Holding, Rig, RigId, RigshareError};

use crate::node::Node;
use crate::storage::EventRecord;

/// JSON representation of a rig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigJson {
    pub rig_id: RigId,
    pub total_shares: u64,
    pub minted_shares: u64,
    pub unsold_shares: u64,
    /// Decimal string.
    pub price_per_share: String,
    /// Decimal string, scaled by `PRECISION`.
    pub acc_reward_per_share: String,
}

impl From<&Rig> for RigJson {
    fn from(rig: &Rig) -> Self {
        Self {
            rig_id: rig.id,
            total_shares: rig.total_shares,
            minted_shares: rig.minted_shares,
            unsold_shares: rig.unsold_shares(),
            price_per_share: rig.price_per_share.to_string(),
            acc_reward_per_share: rig.acc_reward_per_share.to_string(),
        }
    }
}

/// JSON representation of one holder's position in one rig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingJson {
    pub rig_id: RigId,
    pub holder: String,
    pub balance: u64,
    pub reward_debt: String,
    pub pending_credit: String,
    /// Total claimable right now.
    pub pending: String,
}

impl HoldingJson {
    fn new(rig_id: RigId, holder: &Address, holding: &Holding, pending: u128) -> Self {
        Self {
            rig_id,
            holder: holder.to_string(),
            balance: holding.balance,
            reward_debt: holding.reward_debt.to_string(),
            pending_credit: holding.pending_credit.to_string(),
            pending: pending.to_string(),
        }
    }
}

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimJson {
    pub rig_id: RigId,
    pub holder: String,
    pub amount: String,
    /// The holder's value account after the payout.
    pub account_balance: String,
}

/// JSON representation of a persisted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventJson {
    pub seq: u64,
    /// RFC 3339 commit time.
    pub at: String,
    pub kind: String,
    pub rig_ids: Vec<RigId>,
    pub description: String,
}

impl From<&EventRecord> for EventJson {
    fn from(rec: &EventRecord) -> Self {
        Self {
            seq: rec.seq,
            at: rec.at().map(|t| t.to_rfc3339()).unwrap_or_default(),
            kind: rec.event.name().to_string(),
            rig_ids: rec.event.rig_ids(),
            description: rec.event.to_string(),
        }
    }
}

/// JSON representation of a value account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountJson {
    pub address: String,
    pub balance: String,
}

/// JSON representation of node info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfoJson {
    pub rigs: usize,
    pub treasury: String,
    pub events: u64,
    pub admin: String,
}

/// Parse a `0x`-prefixed 20-byte hex address.
pub fn parse_address(s: &str) -> Result<Address, ErrorObjectOwned> {
    s.parse()
        .map_err(|e| rpc_error(-5, &format!("invalid address: {e}")))
}

/// Parse a non-negative decimal value string.
pub fn parse_value(s: &str) -> Result<u128, ErrorObjectOwned> {
    s.trim()
        .parse()
        .map_err(|_| rpc_error(-3, "value must be a non-negative decimal integer"))
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

/// Map a node error to a JSON-RPC error code.
fn node_error(e: RigshareError) -> ErrorObjectOwned {
    let code = match &e {
        RigshareError::Ledger(_) => -25,
        RigshareError::Address(_) => -5,
        RigshareError::InsufficientFunds { .. } => -6,
        RigshareError::Storage(_)
        | RigshareError::Config(_)
        | RigshareError::Codec(_)
        | RigshareError::CorruptSnapshot(_) => -1,
    };
    rpc_error(code, &e.to_string())
}

/// The Rigshare JSON-RPC interface.
#[rpc(server)]
pub trait RigshareRpc {
    /// Registers a new rig. Admin only.
    #[method(name = "registerrig")]
    async fn register_rig(
        &self,
        caller: String,
        rig_id: RigId,
        total_shares: u64,
        price_per_share: String,
    ) -> Result<RigJson, ErrorObjectOwned>;

    /// Buys shares, paying exactly `paid` from the caller's account.
    #[method(name = "buyshares")]
    async fn buy_shares(
        &self,
        caller: String,
        rig_id: RigId,
        amount: u64,
        paid: String,
    ) -> Result<HoldingJson, ErrorObjectOwned>;

    /// Deposits rewards for a rig from the caller's account. Admin only.
    #[method(name = "depositrewards")]
    async fn deposit_rewards(
        &self,
        caller: String,
        rig_id: RigId,
        value: String,
    ) -> Result<RigJson, ErrorObjectOwned>;

    /// Claims all pending rewards for the caller.
    #[method(name = "claimrewards")]
    async fn claim_rewards(&self, caller: String, rig_id: RigId) -> Result<ClaimJson, ErrorObjectOwned>;

    /// Transfers shares of one rig.
    #[method(name = "transfershares")]
    async fn transfer_shares(
        &self,
        operator: String,
        from: String,
        to: String,
        rig_id: RigId,
        amount: u64,
    ) -> Result<bool, ErrorObjectOwned>;

    /// Transfers shares of several rigs atomically.
    #[method(name = "batchtransfershares")]
    async fn batch_transfer_shares(
        &self,
        operator: String,
        from: String,
        to: String,
        rig_ids: Vec<RigId>,
        amounts: Vec<u64>,
    ) -> Result<bool, ErrorObjectOwned>;

    /// Grants or revokes an operator over all of the owner's shares.
    #[method(name = "setapprovalforall")]
    async fn set_approval_for_all(
        &self,
        owner: String,
        operator: String,
        approved: bool,
    ) -> Result<bool, ErrorObjectOwned>;

    /// Returns one rig.
    #[method(name = "getrig")]
    async fn get_rig(&self, rig_id: RigId) -> Result<RigJson, ErrorObjectOwned>;

    /// Returns every registered rig.
    #[method(name = "listrigs")]
    async fn list_rigs(&self) -> Result<Vec<RigJson>, ErrorObjectOwned>;

    /// Returns a holder's position in a rig.
    #[method(name = "getholding")]
    async fn get_holding(&self, rig_id: RigId, holder: String) -> Result<HoldingJson, ErrorObjectOwned>;

    /// Returns a holder's share balance.
    #[method(name = "balanceof")]
    async fn balance_of(&self, holder: String, rig_id: RigId) -> Result<u64, ErrorObjectOwned>;

    /// Returns a holder's claimable reward.
    #[method(name = "pendingrewards")]
    async fn pending_rewards(&self, rig_id: RigId, holder: String) -> Result<String, ErrorObjectOwned>;

    /// Returns persisted events from sequence `from`.
    #[method(name = "getevents")]
    async fn get_events(
        &self,
        from: u64,
        limit: Option<usize>,
        rig_id: Option<RigId>,
    ) -> Result<Vec<EventJson>, ErrorObjectOwned>;

    /// Returns a value account balance.
    #[method(name = "getaccount")]
    async fn get_account(&self, address: String) -> Result<AccountJson, ErrorObjectOwned>;

    /// Returns every non-empty value account.
    #[method(name = "listaccounts")]
    async fn list_accounts(&self) -> Result<Vec<AccountJson>, ErrorObjectOwned>;

    /// Issues value into an account. Admin only.
    #[method(name = "fundaccount")]
    async fn fund_account(
        &self,
        caller: String,
        account: String,
        value: String,
    ) -> Result<AccountJson, ErrorObjectOwned>;

    /// Sends value to the treasury without distributing it.
    #[method(name = "sendtotreasury")]
    async fn send_to_treasury(&self, caller: String, value: String) -> Result<String, ErrorObjectOwned>;

    /// Returns general node info.
    #[method(name = "getinfo")]
    async fn get_info(&self) -> Result<NodeInfoJson, ErrorObjectOwned>;
}

/// Implementation of the Rigshare JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    /// Create a new RPC server implementation wrapping the given node.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    fn holding_json(&self, rig_id: RigId, holder: &Address) -> Result<HoldingJson, ErrorObjectOwned> {
        let (holding, pending) = self.node.holding(rig_id, holder).map_err(node_error)?;
        Ok(HoldingJson::new(rig_id, holder, &holding, pending))
    }

    fn account_json(&self, address: &Address) -> AccountJson {
        AccountJson {
            address: address.to_string(),
            balance: self.node.account_balance(address).to_string(),
        }
    }
}

#[async_trait]
impl RigshareRpcServer for RpcServerImpl {
    async fn register_rig(
        &self,
        caller: String,
        rig_id: RigId,
        total_shares: u64,
        price_per_share: String,
    ) -> Result<RigJson, ErrorObjectOwned> {
        let caller = parse_address(&caller)?;
        let price = parse_value(&price_per_share)?;
        let rig = self
            .node
            .register_rig(&caller, rig_id, total_shares, price)
            .map_err(node_error)?;
        Ok(RigJson::from(&rig))
    }

    async fn buy_shares(
        &self,
        caller: String,
        rig_id: RigId,
        amount: u64,
        paid: String,
    ) -> Result<HoldingJson, ErrorObjectOwned> {
        let buyer = parse_address(&caller)?;
        let paid = parse_value(&paid)?;
        self.node
            .buy_shares(&buyer, rig_id, amount, paid)
            .map_err(node_error)?;
        self.holding_json(rig_id, &buyer)
    }

    async fn deposit_rewards(
        &self,
        caller: String,
        rig_id: RigId,
        value: String,
    ) -> Result<RigJson, ErrorObjectOwned> {
        let caller = parse_address(&caller)?;
        let value = parse_value(&value)?;
        self.node
            .deposit_rewards(&caller, rig_id, value)
            .map_err(node_error)?;
        let rig = self.node.rig(rig_id).map_err(node_error)?;
        Ok(RigJson::from(&rig))
    }

    async fn claim_rewards(&self, caller: String, rig_id: RigId) -> Result<ClaimJson, ErrorObjectOwned> {
        let holder = parse_address(&caller)?;
        let amount = self
            .node
            .claim_rewards(&holder, rig_id)
            .map_err(node_error)?;
        Ok(ClaimJson {
            rig_id,
            holder: holder.to_string(),
            amount: amount.to_string(),
            account_balance: self.node.account_balance(&holder).to_string(),
        })
    }

    async fn transfer_shares(
        &self,
        operator: String,
        from: String,
        to: String,
        rig_id: RigId,
        amount: u64,
    ) -> Result<bool, ErrorObjectOwned> {
        let operator = parse_address(&operator)?;
        let from = parse_address(&from)?;
        let to = parse_address(&to)?;
        self.node
            .transfer_shares(&operator, &from, &to, rig_id, amount)
            .map_err(node_error)?;
        Ok(true)
    }

    async fn batch_transfer_shares(
        &self,
        operator: String,
        from: String,
        to: String,
        rig_ids: Vec<RigId>,
        amounts: Vec<u64>,
    ) -> Result<bool, ErrorObjectOwned> {
        let operator = parse_address(&operator)?;
        let from = parse_address(&from)?;
        let to = parse_address(&to)?;
        self.node
            .batch_transfer_shares(&operator, &from, &to, &rig_ids, &amounts)
            .map_err(node_error)?;
        Ok(true)
    }

    async fn set_approval_for_all(
        &self,
        owner: String,
        operator: String,
        approved: bool,
    ) -> Result<bool, ErrorObjectOwned> {
        let owner = parse_address(&owner)?;
        let operator = parse_address(&operator)?;
        self.node
            .set_approval_for_all(&owner, &operator, approved)
            .map_err(node_error)?;
        Ok(approved)
    }

    async fn get_rig(&self, rig_id: RigId) -> Result<RigJson, ErrorObjectOwned> {
        let rig = self.node.rig(rig_id).map_err(node_error)?;
        Ok(RigJson::from(&rig))
    }

    async fn list_rigs(&self) -> Result<Vec<RigJson>, ErrorObjectOwned> {
        Ok(self.node.rigs().iter().map(RigJson::from).collect())
    }

    async fn get_holding(&self, rig_id: RigId, holder: String) -> Result<HoldingJson, ErrorObjectOwned> {
        let holder = parse_address(&holder)?;
        self.holding_json(rig_id, &holder)
    }

    async fn balance_of(&self, holder: String, rig_id: RigId) -> Result<u64, ErrorObjectOwned> {
        let holder = parse_address(&holder)?;
        Ok(self.node.balance_of(&holder, rig_id))
    }

    async fn pending_rewards(&self, rig_id: RigId, holder: String) -> Result<String, ErrorObjectOwned> {
        let holder = parse_address(&holder)?;
        let pending = self
            .node
            .pending_rewards(rig_id, &holder)
            .map_err(node_error)?;
        Ok(pending.to_string())
    }

    async fn get_events(
        &self,
        from: u64,
        limit: Option<usize>,
        rig_id: Option<RigId>,
    ) -> Result<Vec<EventJson>, ErrorObjectOwned> {
        let limit = limit.unwrap_or(100).min(MAX_EVENT_PAGE);
        let records = self.node.events(from, limit, rig_id).map_err(node_error)?;
        Ok(records.iter().map(EventJson::from).collect())
    }

    async fn get_account(&self, address: String) -> Result<AccountJson, ErrorObjectOwned> {
        let address = parse_address(&address)?;
        Ok(self.account_json(&address))
    }

    async fn list_accounts(&self) -> Result<Vec<AccountJson>, ErrorObjectOwned> {
        Ok(self
            .node
            .accounts()
            .into_iter()
            .map(|(address, balance)| AccountJson {
                address: address.to_string(),
                balance: balance.to_string(),
            })
            .collect())
    }

    async fn fund_account(
        &self,
        caller: String,
        account: String,
        value: String,
    ) -> Result<AccountJson, ErrorObjectOwned> {
        let caller = parse_address(&caller)?;
        let account = parse_address(&account)?;
        let value = parse_value(&value)?;
        self.node
            .fund_account(&caller, &account, value)
            .map_err(node_error)?;
        Ok(self.account_json(&account))
    }

    async fn send_to_treasury(&self, caller: String, value: String) -> Result<String, ErrorObjectOwned> {
        let from = parse_address(&caller)?;
        let value = parse_value(&value)?;
        self.node.receive(&from, value).map_err(node_error)?;
        let info = self.node.info().map_err(node_error)?;
        Ok(info.treasury.to_string())
    }

    async fn get_info(&self) -> Result<NodeInfoJson, ErrorObjectOwned> {
        let info = self.node.info().map_err(node_error)?;
        Ok(NodeInfoJson {
            rigs: info.rigs,
            treasury: info.treasury.to_string(),
            events: info.events,
            admin: info.admin.to_string(),
        })
    }
}

/// Start the JSON-RPC server on the given address.
///
/// Returns the bound address (useful when binding port 0) and a
/// [`ServerHandle`] that can be used to stop the server.
pub async fn start_rpc_server(
    addr: &str,
    node: Arc<Node>,
) -> Result<(SocketAddr, ServerHandle), RigshareError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| RigshareError::Storage(format!("RPC server error: {e}")))?;
    let local = server
        .local_addr()
        .map_err(|e| RigshareError::Storage(format!("RPC server error: {e}")))?;

    let rpc_impl = RpcServerImpl::new(node);
    let handle = server.start(rpc_impl.into_rpc());

    Ok((local, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigshare_core::LedgerError;

    #[test]
    fn parse_address_valid() {
        let s = format!("0x{}", "aa".repeat(20));
        assert_eq!(parse_address(&s).unwrap(), Address([0xAA; 20]));
    }

    #[test]
    fn parse_address_invalid() {
        let err = parse_address("0x1234").unwrap_err();
        assert_eq!(err.code(), -5);
        assert!(err.message().contains("invalid address"));
    }

    #[test]
    fn parse_value_accepts_large_decimals() {
        let big = u128::MAX.to_string();
        assert_eq!(parse_value(&big).unwrap(), u128::MAX);
        assert_eq!(parse_value(" 42 ").unwrap(), 42);
    }

    #[test]
    fn parse_value_rejects_negative_and_garbage() {
        assert_eq!(parse_value("-1").unwrap_err().code(), -3);
        assert!(parse_value("1e18").is_err());
        assert!(parse_value("").is_err());
    }

    #[test]
    fn error_codes() {
        assert_eq!(node_error(LedgerError::NoRewards.into()).code(), -25);
        assert_eq!(
            node_error(RigshareError::InsufficientFunds { have: 1, need: 2 }).code(),
            -6
        );
        assert_eq!(node_error(RigshareError::Storage("x".into())).code(), -1);
        let err = node_error(LedgerError::NotRegistered(9).into());
        assert_eq!(err.message(), "rig 9 is not registered");
    }

    #[test]
    fn rig_json_uses_strings_for_values() {
        let mut rig = Rig::new(1, 100, 10u128.pow(18));
        rig.minted_shares = 40;
        rig.acc_reward_per_share = u128::MAX;
        let json = serde_json::to_string(&RigJson::from(&rig)).unwrap();
        assert!(json.contains("\"unsold_shares\":60"));
        assert!(json.contains(&format!("\"acc_reward_per_share\":\"{}\"", u128::MAX)));
    }

    #[test]
    fn event_json_from_record() {
        let rec = EventRecord {
            seq: 7,
            at_ms: 0,
            event: rigshare_core::LedgerEvent::RewardsClaimed {
                rig_id: 2,
                holder: Address::ZERO,
                amount: 5,
            },
        };
        let json = EventJson::from(&rec);
        assert_eq!(json.seq, 7);
        assert_eq!(json.kind, "RewardsClaimed");
        assert_eq!(json.rig_ids, vec![2]);
        assert!(json.at.starts_with("1970-01-01T00:00:00"));
    }
}
