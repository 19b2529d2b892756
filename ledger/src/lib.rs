//! Fountain Ledger Module
//!
//! The LedgerStore: per-(terminal, project) balances, cycle-scoped spending
//! ceilings, and overflow figures. Every balance mutation in the protocol
//! goes through this store so the invariants stay centrally enforced:
//! - balance equals deposits minus successful debits, never negative
//! - distributions never exceed the per-cycle-number limit
//! - allowance draws never exceed the per-configuration ceiling

pub mod error;
pub mod store;

pub use error::{LedgerError, Result};
pub use store::{
    BalanceRow, LedgerSnapshot, LedgerStore, PaymentRecord, RedemptionRecord, UsedAllowanceRow,
    UsedLimitRow,
};
