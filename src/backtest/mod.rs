//! Backtesting against historical funding data.
//!
//! This module provides:
//! - Historical data loading (CSV import + collection from a live feed)
//! - The replay simulator driving [`crate::strategy::PositionStateMachine`]
//! - Parameter sweep over thresholds and cooldown
//! - Run summaries and CSV reports
//!
//! # Example
//!
//! ```rust,ignore
//! use funding_carry::backtest::{BacktestSimulator, CsvDataLoader};
//! use funding_carry::exchange::Venue;
//!
//! let loader = CsvDataLoader::new("data/funding.csv")?;
//! let simulator = BacktestSimulator::new(loader, config.strategy, Venue::Hyperliquid, None);
//!
//! let result = simulator.run(None, None)?;
//! println!("P&L: {:.2}", result.summary.final_cumulative_pnl);
//! ```

mod data;
mod engine;
mod metrics;
mod runner;

pub use data::{collect_history, snapshots_to_csv, CsvDataLoader, DataLoader, CSV_HEADER};
pub use engine::{align_series, BacktestResult, BacktestSimulator, ALIGNMENT_TOLERANCE_MS};
pub use metrics::{BacktestSummary, PnlPoint};
pub use runner::{ParameterSpace, SweepResults, SweepRun, SweepRunner};
