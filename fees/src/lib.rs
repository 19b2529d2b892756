//! Fountain Fees Module
//!
//! The FeeEngine: prices the protocol fee on outbound transfers, manages the
//! feeless allow-list, defers fees into per-project held queues when a cycle
//! asks for it, refunds held fees when money comes back, and settles what
//! remains to the protocol's own project.

pub mod engine;
pub mod error;
pub mod math;

pub use engine::{FeeEngine, FeeSnapshot, HeldFee, HeldFeeRow};
pub use error::{FeeError, Result};
pub use math::{effective_fee_rate, fee_amount};
