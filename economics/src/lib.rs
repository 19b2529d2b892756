//! Fountain Economics Module
//!
//! Implements the deterministic money math shared by the engine:
//! - Integer fixed-point helpers (floor semantics, overflow as error)
//! - Oracle-backed currency conversion
//! - Bonding-curve redemption amounts

pub mod conversion;
pub mod fixed;
pub mod redemption;

pub use conversion::{convert_amount, ConversionError};
pub use fixed::{mul_div, pow10, rescale_decimals, MathError};
pub use redemption::{effective_redemption_rate, reclaimable_amount};
