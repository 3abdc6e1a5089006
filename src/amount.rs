//! Fixed-point cVND amounts
//!
//! Amounts are carried as `Decimal` and truncated to [`AMOUNT_SCALE`] fractional
//! digits before they are hashed or persisted.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of fractional digits kept for every stored amount
pub const AMOUNT_SCALE: u32 = 6;

/// Truncate to the storage scale, always rendering six fractional digits
pub fn normalize(amount: Decimal) -> Decimal {
    let mut scaled = amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero);
    scaled.rescale(AMOUNT_SCALE);
    scaled
}

/// Reject zero, negative, or sub-scale amounts
pub fn ensure_positive(amount: Decimal) -> Result<Decimal> {
    let scaled = normalize(amount);
    if scaled <= Decimal::ZERO {
        return Err(Error::Validation(format!(
            "Invalid amount {}: must be greater than zero",
            amount
        )));
    }
    Ok(scaled)
}

/// Parse a user-supplied amount string
pub fn parse(input: &str) -> Result<Decimal> {
    Decimal::from_str(input.trim())
        .map_err(|e| Error::Validation(format!("Invalid amount '{}': {}", input, e)))
}
