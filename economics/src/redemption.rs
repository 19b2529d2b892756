//! Bonding-curve redemption amounts
//!
//! The curve rewards later and larger redemptions less than naive pro-rata
//! would, so a rush for the exit cannot drain overflow at full value.

use fountain_core::constants::MAX_REDEMPTION_RATE;
use fountain_core::{BallotState, FundingCycleMetadata};

use crate::fixed::{mul_div, MathError};

/// Redemption rate in force for a cycle, accounting for a pending
/// reconfiguration ballot. While the ballot is still inside its approval
/// window the ballot rate substitutes, so holders cannot exploit the window
/// right before a reconfiguration takes effect.
pub fn effective_redemption_rate(metadata: &FundingCycleMetadata, ballot: BallotState) -> u64 {
    if ballot == BallotState::Active {
        metadata.ballot_redemption_rate
    } else {
        metadata.redemption_rate
    }
}

/// Value reclaimable from `overflow` by redeeming `token_count` of
/// `total_supply` outstanding tokens at `redemption_rate`.
///
/// At `MAX_REDEMPTION_RATE` this is exact pro-rata; at rate 0 nothing is
/// reclaimable; in between the payout is convex in the redeemed share:
/// `base * (rate + token_count * (MAX - rate) / total_supply) / MAX`.
pub fn reclaimable_amount(
    overflow: u128,
    token_count: u128,
    total_supply: u128,
    redemption_rate: u64,
) -> Result<u128, MathError> {
    if overflow == 0 || token_count == 0 || total_supply == 0 || redemption_rate == 0 {
        return Ok(0);
    }

    let base = mul_div(overflow, token_count, total_supply)?;
    if redemption_rate >= MAX_REDEMPTION_RATE {
        return Ok(base);
    }

    let boost = mul_div(
        token_count,
        (MAX_REDEMPTION_RATE - redemption_rate) as u128,
        total_supply,
    )?;
    mul_div(base, redemption_rate as u128 + boost, MAX_REDEMPTION_RATE as u128)
}
