//! Protocol constants. All value amounts are in base units (1 coin = 10^18 units).

/// Base units per whole coin of the value token.
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Fixed-point scale of `acc_reward_per_share`.
///
/// The accumulator stores `reward_per_share * PRECISION`, so a holder's
/// entitlement is `balance * acc / PRECISION` base units.
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Default TCP port for the node's JSON-RPC server.
pub const DEFAULT_RPC_PORT: u16 = 18_645;

/// Maximum number of legs accepted in one batch transfer.
pub const MAX_BATCH_LEGS: usize = 256;

/// Maximum number of events returned by a single event query.
pub const MAX_EVENT_PAGE: usize = 1_000;
