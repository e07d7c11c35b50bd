//! Venue-agnostic seams between the carry engine and the outside world.
//!
//! The decision engine only ever sees [`FundingSnapshot`]s; where they come
//! from is hidden behind [`FundingFeed`], and how positions get moved is
//! hidden behind [`ExecutionAdapter`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{ExecutionAck, FundingSnapshot, Leg};
use crate::error::{ExecutionError, FeedError};

/// Venue identifier for multi-venue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Hyperliquid,
    Binance,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Hyperliquid => write!(f, "Hyperliquid"),
            Venue::Binance => write!(f, "Binance"),
        }
    }
}

impl Venue {
    /// Short code for display (2-3 chars).
    pub fn short_code(&self) -> &'static str {
        match self {
            Venue::Hyperliquid => "HL",
            Venue::Binance => "BN",
        }
    }

    /// Parse a secondary-venue setting, where `"none"` (or empty) means no venue.
    pub fn parse_optional(s: &str) -> Result<Option<Venue>, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hyperliquid" | "hl" => Ok(Venue::Hyperliquid),
            "binance" | "bn" => Ok(Venue::Binance),
            other => Err(format!("unknown venue '{}'", other)),
        }
    }
}

/// Source of funding observations for one venue.
///
/// Implement this trait to add support for new perpetuals exchanges. Rates
/// are normalised to hourly percentages regardless of the venue's native
/// funding period.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FundingFeed: Send + Sync {
    /// Returns the venue identifier.
    fn venue(&self) -> Venue;

    /// Fetch the current funding observation for a market.
    async fn fetch_funding(&self, market: &str) -> Result<FundingSnapshot, FeedError>;

    /// Fetch settled funding observations in `[start, end]`, oldest first.
    async fn fetch_history(
        &self,
        market: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FundingSnapshot>, FeedError>;
}

/// Moves funds for the legs of a carry position.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Open `leg` for `market` with the given USD notional.
    async fn open_position(
        &self,
        market: &str,
        leg: Leg,
        notional_usd: Decimal,
    ) -> Result<ExecutionAck, ExecutionError>;

    /// Close whatever is held on `leg` for `market`.
    async fn close_position(&self, market: &str, leg: Leg)
        -> Result<ExecutionAck, ExecutionError>;
}
