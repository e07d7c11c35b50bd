//! Exchange integrations for the carry engine.
//!
//! ## Feeds
//! Read-only funding data behind [`FundingFeed`]:
//! - Hyperliquid (hourly funding)
//! - Binance USDⓈ-M futures (8-hour funding, normalised to hourly)
//!
//! ## Execution
//! Position legs are moved through [`ExecutionAdapter`]. Only the paper
//! adapter ships in this crate.

mod client;
pub mod hyperliquid;
pub mod paper;
mod traits;
mod types;

pub use client::BinanceClient;
pub use hyperliquid::HyperliquidClient;
pub use paper::PaperExecutionAdapter;
pub use traits::*;
pub use types::*;

/// Build the funding feed for a venue.
pub fn feed_for(venue: Venue, binance_testnet: bool) -> anyhow::Result<Box<dyn FundingFeed>> {
    Ok(match venue {
        Venue::Hyperliquid => Box::new(HyperliquidClient::new()?),
        Venue::Binance => Box::new(BinanceClient::new(binance_testnet)?),
    })
}
