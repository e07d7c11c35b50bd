//! # Funding Carry
//!
//! Funding-rate carry engine for perpetual futures, hedged either with spot
//! on one venue or with an opposite perpetual on a second venue.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `error`: Error taxonomy (configuration, feed, execution)
//! - `exchange`: Venue funding feeds and execution adapters
//! - `strategy`: Decision engine, cooldown, position state machine, live loop
//! - `backtest`: Historical replay, reports, and parameter sweeps
//! - `utils`: Shared decimal helpers

pub mod backtest;
pub mod config;
pub mod error;
pub mod exchange;
pub mod strategy;
pub mod utils;

pub use config::Config;
