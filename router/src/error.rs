//! Payout router error types

use thiserror::Error;

use economics::MathError;
use fees::FeeError;
use fountain_core::{CollaboratorFault, ProjectId};
use ledger::LedgerError;

/// Payout routing errors
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Split names allocator {0} but none is registered at that address")]
    AllocatorNotFound(String),

    #[error("Split targets {project} but it has no terminal accepting {token}")]
    TerminalNotFound { project: ProjectId, token: String },

    #[error("Split percents consume more than the distributed amount")]
    SplitsExceedAmount,

    #[error("Allocator fault: {0}")]
    AllocatorFault(CollaboratorFault),

    #[error("Peer terminal fault: {0}")]
    TerminalFault(CollaboratorFault),

    #[error("Transfer fault: {0}")]
    TransferFault(CollaboratorFault),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Math(#[from] MathError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
