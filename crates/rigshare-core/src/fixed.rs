//! Fixed-point helpers for the reward accumulator.
//!
//! Both helpers compute an exact floor of `a * b / c` without a 256-bit
//! intermediate by splitting the large operand into quotient and remainder:
//! with `x = q*c + r`, `floor(x*m/c) == q*m + floor(r*m/c)`, and `r*m` stays
//! below `c*m`, which fits u128 for every `c` the ledger uses.

use crate::constants::PRECISION;
use crate::error::LedgerError;

/// Value accrued by `balance` shares at accumulator `acc`:
/// `floor(balance * acc / PRECISION)`.
pub fn accrued(balance: u64, acc: u128) -> Result<u128, LedgerError> {
    let balance = balance as u128;
    let whole = (acc / PRECISION)
        .checked_mul(balance)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    // (acc % PRECISION) < 10^18 and balance < 2^64, product < 1.9e37.
    let frac = (acc % PRECISION) * balance / PRECISION;
    whole.checked_add(frac).ok_or(LedgerError::ArithmeticOverflow)
}

/// Accumulator increment for a deposit of `value` over `supply` shares:
/// `floor(value * PRECISION / supply)`.
///
/// `supply` must be non-zero; callers map a zero supply to their own error.
pub fn per_share(value: u128, supply: u64) -> Result<u128, LedgerError> {
    if supply == 0 {
        return Err(LedgerError::ArithmeticOverflow);
    }
    let supply = supply as u128;
    let whole = (value / supply)
        .checked_mul(PRECISION)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    // (value % supply) < 2^64, times 10^18 < 1.9e37.
    let frac = (value % supply) * PRECISION / supply;
    whole.checked_add(frac).ok_or(LedgerError::ArithmeticOverflow)
}

/// Exact purchase cost: `amount * price`.
pub fn cost(amount: u64, price: u128) -> Result<u128, LedgerError> {
    price
        .checked_mul(amount as u128)
        .ok_or(LedgerError::ArithmeticOverflow)
}
