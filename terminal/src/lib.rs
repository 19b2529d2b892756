//! Fountain Terminal Module
//!
//! The operation façade over the treasury engine. A `PaymentTerminal` owns
//! the shared ledger and fee state behind one lock and drives the pipeline
//! for every entry point: pay, add-to-balance, distribute, use-allowance,
//! redeem, migrate, and fee processing. Access control and token custody
//! belong to the embedding application; operations take the acting caller
//! and owner as parameters.

pub mod audit;
pub mod error;
pub mod terminal;

pub use audit::{AuditEvent, AuditJournal, AuditRecord};
pub use error::{Result, TerminalError};
pub use terminal::{
    AllowanceReceipt, DepositReceipt, DistributionReceipt, EngineSnapshot, PaymentReceipt,
    PaymentTerminal, RedemptionReceipt, TerminalParams,
};
