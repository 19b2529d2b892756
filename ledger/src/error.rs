//! Ledger error types

use thiserror::Error;

use economics::{ConversionError, MathError};
use fountain_core::{CollaboratorFault, Currency, ProjectId};

/// Ledger store errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("No funding cycle configured for {0}")]
    InvalidFundingCycle(ProjectId),

    #[error("Payments are paused for {0}")]
    PaymentPaused(ProjectId),

    #[error("Distributions are paused for {0}")]
    DistributionPaused(ProjectId),

    #[error("Redemptions are paused for {0}")]
    RedemptionPaused(ProjectId),

    #[error("Currency mismatch: amount in {got}, ceiling configured in {expected}")]
    CurrencyMismatch { got: Currency, expected: Currency },

    #[error("Distribution limit reached: used {used} + requested {requested} exceeds limit {limit}")]
    DistributionLimitReached {
        used: u128,
        requested: u128,
        limit: u128,
    },

    #[error(
        "Overflow allowance reached: used {used} + requested {requested} exceeds allowance {allowance}"
    )]
    OverflowAllowanceReached {
        used: u128,
        requested: u128,
        allowance: u128,
    },

    #[error("Insufficient terminal balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("Insufficient tokens: redeeming {requested}, holder has {available}")]
    InsufficientTokens { requested: u128, available: u128 },

    #[error("Data source fault: {0}")]
    DataSource(CollaboratorFault),

    #[error("Peer terminal fault while aggregating overflow: {0}")]
    TerminalFault(CollaboratorFault),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Math(#[from] MathError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
