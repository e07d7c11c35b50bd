//! Error taxonomy for the carry engine.
//!
//! - [`ConfigError`] is fatal and surfaces at startup.
//! - [`FeedError`] is recovered per market: the market is skipped for the
//!   current step and its position state is left untouched.
//! - [`ExecutionError`] is recovered per market: the planned transition is
//!   not committed, so the next tick re-evaluates from the same state.

use crate::exchange::Venue;
use thiserror::Error;

/// Malformed or inconsistent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Funding observation could not be obtained for one market.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{venue} request for {market} failed: {source}")]
    Request {
        venue: Venue,
        market: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{venue} API error {status} for {market}: {body}")]
    Api {
        venue: Venue,
        market: String,
        status: u16,
        body: String,
    },

    #[error("{venue} has no perpetual market {market}")]
    UnknownMarket { venue: Venue, market: String },

    #[error("{venue} returned invalid funding data for {market}: {reason}")]
    InvalidData {
        venue: Venue,
        market: String,
        reason: String,
    },
}

impl FeedError {
    /// Venue the failed observation belongs to.
    pub fn venue(&self) -> Venue {
        match self {
            FeedError::Request { venue, .. }
            | FeedError::Api { venue, .. }
            | FeedError::UnknownMarket { venue, .. }
            | FeedError::InvalidData { venue, .. } => *venue,
        }
    }
}

/// An execution adapter refused or failed to act on a leg.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order for {market} rejected: {reason}")]
    Rejected { market: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_error_carries_venue() {
        let err = FeedError::UnknownMarket {
            venue: Venue::Binance,
            market: "DOGE".to_string(),
        };
        assert_eq!(err.venue(), Venue::Binance);
        assert_eq!(err.to_string(), "Binance has no perpetual market DOGE");
    }

    #[test]
    fn test_execution_error_message() {
        let err = ExecutionError::Rejected {
            market: "SOL".to_string(),
            reason: "insufficient balance".to_string(),
        };
        assert_eq!(err.to_string(), "order for SOL rejected: insufficient balance");
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::invalid("strategy.notional_usd", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid `strategy.notional_usd`: must be positive"
        );
    }
}
