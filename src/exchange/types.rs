//! Shared observation and order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::traits::Venue;

/// Hours in a (non-leap) year, used for simple APR extrapolation.
pub const HOURS_PER_YEAR: Decimal = dec!(8760);

/// One funding observation for a market on a venue.
///
/// `hourly_pct` is the funding paid per hour in percent, signed so that a
/// positive value means longs pay shorts. `apr_pct` is the simple
/// annualisation `hourly_pct * 24 * 365`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub venue: Venue,
    pub market: String,
    pub hourly_pct: Decimal,
    pub apr_pct: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl FundingSnapshot {
    /// Build a snapshot from an hourly percentage, deriving the APR.
    pub fn from_hourly_pct(
        venue: Venue,
        market: impl Into<String>,
        hourly_pct: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            venue,
            market: market.into(),
            hourly_pct,
            apr_pct: hourly_pct * HOURS_PER_YEAR,
            timestamp,
        }
    }
}

/// Side of a perpetual position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PerpSide {
    Long,
    Short,
}

impl PerpSide {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            PerpSide::Long => PerpSide::Short,
            PerpSide::Short => PerpSide::Long,
        }
    }

    /// Whether holding this side is paid funding at the given hourly rate.
    ///
    /// Shorts receive when the rate is zero or positive, longs when negative.
    pub fn receives(self, hourly_pct: Decimal) -> bool {
        match self {
            PerpSide::Short => hourly_pct >= Decimal::ZERO,
            PerpSide::Long => hourly_pct < Decimal::ZERO,
        }
    }

    /// `+1` when this side receives funding at the given rate, `-1` otherwise.
    pub fn receive_sign(self, hourly_pct: Decimal) -> Decimal {
        if self.receives(hourly_pct) {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerpSide::Long => "LONG",
            PerpSide::Short => "SHORT",
        }
    }
}

impl fmt::Display for PerpSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of the spot hedge leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpotSide {
    Buy,
    Sell,
}

impl SpotSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotSide::Buy => "BUY",
            SpotSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for SpotSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a carry position, as handed to an execution adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// Perpetual exposure on a venue.
    Perp { venue: Venue, side: PerpSide },
    /// Spot hedge against a single-venue perpetual.
    Spot { side: SpotSide },
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Perp { venue, side } => write!(f, "{} perp {}", venue.short_code(), side),
            Leg::Spot { side } => write!(f, "spot {}", side),
        }
    }
}

/// Acknowledgement returned by an execution adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionAck {
    pub order_id: u64,
    pub market: String,
    pub simulated: bool,
}
