//! Oracle-backed currency conversion
//!
//! Rates are fixed point at `PRICE_FIDELITY` digits; conversion floors.
//! The oracle is untrusted: a fault or a zero rate fails the conversion
//! rather than producing a guessed amount.

use thiserror::Error;

use fountain_core::constants::PRICE_FIDELITY;
use fountain_core::{CollaboratorFault, Currency, PriceOracle};

use crate::fixed::{mul_div, pow10, MathError};

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("price oracle unavailable for {currency} into {base}: {source}")]
    OracleUnavailable {
        currency: Currency,
        base: Currency,
        source: CollaboratorFault,
    },

    #[error("price oracle returned a zero rate for {currency} into {base}")]
    ZeroRate { currency: Currency, base: Currency },

    #[error(transparent)]
    Math(#[from] MathError),
}

/// Convert `amount` denominated in `currency` into `base`.
///
/// Equal currencies skip the oracle entirely.
pub fn convert_amount(
    amount: u128,
    currency: Currency,
    base: Currency,
    oracle: &dyn PriceOracle,
) -> Result<u128, ConversionError> {
    if currency == base || amount == 0 {
        return Ok(amount);
    }

    let rate = oracle
        .price_for(currency, base, PRICE_FIDELITY)
        .map_err(|source| ConversionError::OracleUnavailable {
            currency,
            base,
            source,
        })?;
    if rate == 0 {
        return Err(ConversionError::ZeroRate { currency, base });
    }

    Ok(mul_div(amount, pow10(PRICE_FIDELITY)?, rate)?)
}
