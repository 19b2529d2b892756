//! Integer fixed-point helpers
//!
//! All ratio math in the engine floors, and overflow is a reported error
//! rather than a wrap or a panic. No floats anywhere.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("division by zero in {0}")]
    DivisionByZero(&'static str),
}

pub type Result<T> = std::result::Result<T, MathError>;

/// floor(a * b / denominator), computed through a 256-bit intermediate so
/// 18-decimal amounts can be multiplied by 18-decimal rates without
/// overflowing. Errors only when the quotient itself exceeds `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero("mul_div"));
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / denominator);
    }

    let (hi, lo) = full_mul(a, b);
    if hi >= denominator {
        return Err(MathError::Overflow("mul_div"));
    }
    Ok(div_wide(hi, lo, denominator))
}

/// 256-bit product of two u128 values, as (high, low) halves
fn full_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = (1 << 64) - 1;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (mid << 64) | (ll & MASK);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// (hi:lo) / divisor by binary long division; requires hi < divisor, which
/// guarantees the quotient fits in u128
fn div_wide(hi: u128, lo: u128, divisor: u128) -> u128 {
    let mut remainder = hi;
    let mut quotient: u128 = 0;

    for i in (0..128).rev() {
        let carry = remainder >> 127;
        remainder = (remainder << 1) | ((lo >> i) & 1);
        // With a carried-out bit the doubled remainder exceeds the divisor
        // even though the u128 wrapped
        if carry == 1 || remainder >= divisor {
            remainder = remainder.wrapping_sub(divisor);
            quotient |= 1 << i;
        }
    }
    quotient
}

/// 10^exp as u128
pub fn pow10(exp: u32) -> Result<u128> {
    10u128.checked_pow(exp).ok_or(MathError::Overflow("pow10"))
}

/// Rescale an amount between decimal fidelities, flooring on the way down
pub fn rescale_decimals(amount: u128, from: u32, to: u32) -> Result<u128> {
    if from == to {
        Ok(amount)
    } else if to > from {
        amount
            .checked_mul(pow10(to - from)?)
            .ok_or(MathError::Overflow("rescale_decimals"))
    } else {
        Ok(amount / pow10(from - to)?)
    }
}
