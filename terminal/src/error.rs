//! Terminal operation error types

use thiserror::Error;

use fees::FeeError;
use fountain_core::CollaboratorFault;
use fountain_storage::StorageError;
use ledger::LedgerError;
use router::RouterError;

/// Terminal operation errors
#[derive(Error, Debug)]
pub enum TerminalError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("Transfer fault: {0}")]
    Transfer(CollaboratorFault),

    #[error("Successor terminal fault: {0}")]
    Successor(CollaboratorFault),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, TerminalError>;
