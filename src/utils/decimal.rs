//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Round half away from zero to `decimals` places (`round(x, 2)` semantics,
/// as opposed to `Decimal::round_dp`'s banker's rounding).
pub fn round_half_up(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Render with exactly `decimals` fractional digits.
pub fn fmt_fixed(value: Decimal, decimals: u32) -> String {
    let rounded = round_half_up(value, decimals);
    // no "-0.00"
    let rounded = if rounded.is_zero() { Decimal::ZERO } else { rounded };
    format!("{:.*}", decimals as usize, rounded)
}

/// Parse a venue-supplied rate string.
///
/// Accepts plain and scientific notation ("1.25e-5"). Anything that does not
/// describe a finite number is rejected.
pub fn parse_rate(raw: &str) -> Result<Decimal, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty rate".to_string());
    }

    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| format!("unparsable rate '{}'", trimmed))
}
