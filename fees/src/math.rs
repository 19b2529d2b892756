//! Protocol fee arithmetic
//!
//! The fee is carved out of the outbound amount so that the net the
//! recipient receives, grossed back up by the effective rate, reproduces the
//! original amount: `net = floor(amount * MAX_FEE / (MAX_FEE + rate))`.
//! Integer math only; every division floors.

use economics::{mul_div, MathError};
use fountain_core::constants::{MAX_FEE, MAX_FEE_DISCOUNT};

/// Fee rate after applying a discount (both parts per billion)
pub fn effective_fee_rate(fee_rate: u64, fee_discount: u64) -> u64 {
    let rebate = (fee_rate as u128) * (fee_discount as u128) / (MAX_FEE_DISCOUNT as u128);
    fee_rate.saturating_sub(rebate as u64)
}

/// Fee owed on `amount` at `fee_rate` less `fee_discount`
pub fn fee_amount(amount: u128, fee_rate: u64, fee_discount: u64) -> Result<u128, MathError> {
    let rate = effective_fee_rate(fee_rate, fee_discount);
    if rate == 0 || amount == 0 {
        return Ok(0);
    }
    let net = mul_div(amount, MAX_FEE as u128, (MAX_FEE + rate) as u128)?;
    Ok(amount - net)
}
