//! Hyperliquid exchange integration.
//!
//! Read-only funding data for the carry engine.
//!
//! # Funding Rate Notes
//!
//! Hyperliquid funding is paid **hourly**, so the venue's rate converts to
//! an hourly percentage by a plain ×100.

mod client;
mod types;

pub use client::HyperliquidClient;
pub use types::*;
