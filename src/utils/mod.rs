//! Shared utilities.

pub mod decimal;

pub use decimal::{fmt_fixed, parse_rate, round_half_up};
