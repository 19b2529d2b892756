//! Fee engine error types

use thiserror::Error;

use economics::MathError;
use fountain_core::CollaboratorFault;
use ledger::LedgerError;

/// Fee engine errors
#[derive(Error, Debug)]
pub enum FeeError {
    #[error("Fee rate {0} exceeds the maximum")]
    InvalidFeeRate(u64),

    #[error("No terminal found for the protocol project accepting {token}")]
    ProtocolTerminalNotFound { token: String },

    #[error("Protocol terminal fault: {0}")]
    TerminalFault(CollaboratorFault),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Math(#[from] MathError),
}

pub type Result<T> = std::result::Result<T, FeeError>;
