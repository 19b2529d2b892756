//! Core identifiers and funding-cycle data

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a project (tenant) within the protocol
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProjectId(pub u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project-{}", self.0)
    }
}

/// Index of an accounting currency understood by the price oracle
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Currency(pub u32);

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "currency-{}", self.0)
    }
}

/// State of a project's reconfiguration ballot, as reported by the
/// funding-cycle collaborator. The engine consumes this verbatim and never
/// re-derives ballot semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallotState {
    /// No reconfiguration pending, or the pending one has been approved
    Approved,
    /// A reconfiguration is still inside its approval window
    Active,
    /// The pending reconfiguration was rejected
    Failed,
}

/// A time-boxed configuration epoch for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingCycle {
    /// Sequential cycle number; advances on every rollover, reconfigured or not
    pub number: u64,
    /// Timestamp identifying the configuration this cycle was built from.
    /// Stable across automatic rollovers of the same configuration.
    pub configuration: u64,
    /// Cycle start timestamp (seconds)
    pub start: u64,
    /// Cycle duration (seconds); 0 means the cycle lasts until reconfigured
    pub duration: u64,
    /// Tokens credited per unit paid, 18-decimal fixed point
    pub weight: u128,
    /// Weight decay applied on automatic rollovers (parts per billion)
    pub discount_rate: u64,
    pub metadata: FundingCycleMetadata,
}

/// Behavior flags and rates attached to a funding cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingCycleMetadata {
    pub pause_pay: bool,
    pub pause_distributions: bool,
    pub pause_redeem: bool,
    pub pause_burn: bool,
    /// Defer protocol fees into the held-fee queue instead of settling them
    pub hold_fees: bool,
    /// Redeem against the project's overflow across all terminals
    pub use_total_overflow_for_redemptions: bool,
    pub use_data_source_for_pay: bool,
    pub use_data_source_for_redeem: bool,
    /// Bonding-curve rate out of `MAX_REDEMPTION_RATE`
    pub redemption_rate: u64,
    /// Rate substituted while a reconfiguration ballot is active
    pub ballot_redemption_rate: u64,
    /// Portion of minted tokens reserved for the project (parts of 10_000);
    /// consumed by the token-supply component, carried here for data sources
    pub reserved_rate: u64,
}

impl Default for FundingCycleMetadata {
    fn default() -> Self {
        Self {
            pause_pay: false,
            pause_distributions: false,
            pause_redeem: false,
            pause_burn: false,
            hold_fees: false,
            use_total_overflow_for_redemptions: false,
            use_data_source_for_pay: false,
            use_data_source_for_redeem: false,
            redemption_rate: crate::constants::MAX_REDEMPTION_RATE,
            ballot_redemption_rate: crate::constants::MAX_REDEMPTION_RATE,
            reserved_rate: 0,
        }
    }
}

/// Identity and accounting parameters of the terminal an operation acts for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalContext {
    /// Address identifying this terminal to peers and the feeless list
    pub address: String,
    /// Token this terminal holds funds in
    pub token: String,
    /// Decimals of the terminal's accounting token
    pub decimals: u32,
    /// Currency the terminal accounts in
    pub currency: Currency,
    /// Currency the funding-cycle weight is denominated in
    pub base_weight_currency: Currency,
}
