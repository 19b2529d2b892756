//! Fountain Router Module
//!
//! The PayoutRouter: resolves a project's weighted split list into concrete
//! transfers (to allocators, to other projects' terminals, to plain
//! beneficiaries, or back to the caller), invoking the FeeEngine per
//! transfer and sending any undistributed remainder to the project owner.

pub mod error;
pub mod payouts;

pub use error::{Result, RouterError};
pub use payouts::{DistributionSummary, ExecutedPayout, PayoutPlan, PayoutRouter};
