//! Backtesting simulation engine.
//!
//! Replays historical funding series through the same
//! [`PositionStateMachine`] the live loop uses, accruing funding on whatever
//! is held after each step.

use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::backtest::metrics::{BacktestSummary, PnlPoint};
use crate::backtest::DataLoader;
use crate::config::StrategyConfig;
use crate::exchange::{FundingSnapshot, PerpSide, Venue};
use crate::strategy::{MarketPositions, PositionStateMachine, TradeEvent};
use crate::utils::fmt_fixed;

/// Secondary observations further than this from the primary timestamp are
/// treated as missing.
pub const ALIGNMENT_TOLERANCE_MS: i64 = 1_800_000;

/// Complete result of a backtest run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub strategy: StrategyConfig,
    pub trades: Vec<TradeEvent>,
    pub pnl_series: Vec<PnlPoint>,
    pub summary: BacktestSummary,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl BacktestResult {
    /// Trade log as CSV, one row per event.
    pub fn trades_to_csv(&self) -> String {
        let mut out = String::from(TradeEvent::CSV_HEADER);
        out.push('\n');
        for trade in &self.trades {
            out.push_str(&trade.to_csv_row());
            out.push('\n');
        }
        out
    }

    /// Cumulative P&L series as CSV.
    pub fn pnl_to_csv(&self) -> String {
        let mut out = String::from("timestamp,market,step_pnl,cumulative_pnl\n");
        for point in &self.pnl_series {
            out.push_str(&format!(
                "{},{},{},{}\n",
                point.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                point.market,
                fmt_fixed(point.step_pnl, 6),
                fmt_fixed(point.cumulative_pnl, 6),
            ));
        }
        out
    }

    /// Write `trades.csv` and `pnl.csv` into `dir`.
    pub fn write_reports(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let mut trades = std::fs::File::create(dir.join("trades.csv"))?;
        trades.write_all(self.trades_to_csv().as_bytes())?;

        let mut pnl = std::fs::File::create(dir.join("pnl.csv"))?;
        pnl.write_all(self.pnl_to_csv().as_bytes())?;

        Ok(())
    }

    /// Get a summary string.
    pub fn summary(&self) -> String {
        format!(
            "{}\n\nBacktest Period: {} to {}\nTrades: {}",
            self.summary.summary(),
            self.start_time.format("%Y-%m-%d %H:%M"),
            self.end_time.format("%Y-%m-%d %H:%M"),
            self.trades.len(),
        )
    }
}

/// One aligned step for one market.
#[derive(Debug, Clone)]
struct Step {
    market_index: usize,
    primary: FundingSnapshot,
    secondary: Option<FundingSnapshot>,
}

/// The backtesting simulation engine.
pub struct BacktestSimulator<D: DataLoader> {
    data_loader: D,
    strategy: StrategyConfig,
    primary_venue: Venue,
    secondary_venue: Option<Venue>,
}

impl<D: DataLoader> BacktestSimulator<D> {
    /// `secondary_venue` is only read when cross-venue mode is enabled.
    pub fn new(
        data_loader: D,
        strategy: StrategyConfig,
        primary_venue: Venue,
        secondary_venue: Option<Venue>,
    ) -> Self {
        Self {
            data_loader,
            strategy,
            primary_venue,
            secondary_venue,
        }
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    /// Run over `[start, end]`, defaulting to the loader's full range.
    pub fn run(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<BacktestResult> {
        let Some((data_start, data_end)) = self.data_loader.available_range() else {
            anyhow::bail!("No data available for backtest");
        };
        let start = start.unwrap_or(data_start);
        let end = end.unwrap_or(data_end);
        if start > end {
            anyhow::bail!("Backtest start {} is after end {}", start, end);
        }

        info!(
            "Starting backtest from {} to {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        );

        let steps = self.build_steps(start, end)?;
        if steps.is_empty() {
            anyhow::bail!("No data available for the specified time range");
        }
        let alignment_gaps = self.count_gaps(&steps);

        info!(steps = steps.len(), alignment_gaps, "Aligned funding series");

        let mut machine = PositionStateMachine::new(self.strategy.clone());
        let mut trades = Vec::new();
        let mut pnl_series = Vec::with_capacity(steps.len());
        let mut cumulative = Decimal::ZERO;

        for (i, step) in steps.iter().enumerate() {
            let market = &self.strategy.markets[step.market_index];
            trades.extend(machine.step(&step.primary, step.secondary.as_ref()));

            let step_pnl = machine
                .positions(market)
                .map(|book| self.accrue(book, step))
                .unwrap_or(Decimal::ZERO);
            cumulative += step_pnl;

            pnl_series.push(PnlPoint {
                timestamp: step.primary.timestamp,
                market: market.clone(),
                step_pnl,
                cumulative_pnl: cumulative,
            });

            if i % 1000 == 0 {
                debug!(
                    "Progress: {}/{}, cumulative P&L: {}",
                    i,
                    steps.len(),
                    fmt_fixed(cumulative, 2)
                );
            }
        }

        let summary = BacktestSummary::calculate(&trades, &pnl_series, steps.len(), alignment_gaps);

        info!(
            trades = trades.len(),
            final_pnl = %fmt_fixed(cumulative, 2),
            "Backtest complete"
        );

        Ok(BacktestResult {
            strategy: self.strategy.clone(),
            trades,
            pnl_series,
            summary,
            start_time: start,
            end_time: end,
        })
    }

    fn cross_venue(&self) -> Option<Venue> {
        if self.strategy.cross_venue_enabled {
            self.secondary_venue
        } else {
            None
        }
    }

    /// Align every market's series and merge them into global timestamp order.
    fn build_steps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Step>> {
        let mut steps = Vec::new();

        for (market_index, market) in self.strategy.markets.iter().enumerate() {
            let mut primary = self
                .data_loader
                .load_series(self.primary_venue, market, start, end)?;
            primary.sort_by_key(|s| s.timestamp);

            let secondary = match self.cross_venue() {
                Some(venue) => {
                    // Widen the window so steps at the edges can still align.
                    let margin = Duration::milliseconds(ALIGNMENT_TOLERANCE_MS);
                    let mut series =
                        self.data_loader
                            .load_series(venue, market, start - margin, end + margin)?;
                    series.sort_by_key(|s| s.timestamp);
                    series
                }
                None => Vec::new(),
            };

            if primary.is_empty() {
                info!(%market, venue = %self.primary_venue, "No primary data for market");
            }

            let aligned = align_series(&primary, &secondary);
            steps.extend(primary.into_iter().zip(aligned).map(|(primary, secondary)| Step {
                market_index,
                primary,
                secondary,
            }));
        }

        // Stable: per-market order is already ascending.
        steps.sort_by_key(|s| (s.primary.timestamp, s.market_index));
        Ok(steps)
    }

    fn count_gaps(&self, steps: &[Step]) -> usize {
        if self.cross_venue().is_none() {
            return 0;
        }
        steps.iter().filter(|s| s.secondary.is_none()).count()
    }

    /// Funding earned over this step by whatever is held after it.
    fn accrue(&self, book: &MarketPositions, step: &Step) -> Decimal {
        let notional = self.strategy.notional_usd;
        let leg = |hourly_pct: Decimal, side: Option<PerpSide>| {
            side.map(|side| hourly_pct.abs() / dec!(100) * notional * side.receive_sign(hourly_pct))
                .unwrap_or(Decimal::ZERO)
        };

        let mut pnl = Decimal::ZERO;
        if book.single.open {
            pnl += leg(step.primary.hourly_pct, book.single.perp_side);
        }
        if book.cross.open {
            pnl += leg(step.primary.hourly_pct, book.cross.side_a);
            // Missing secondary observation accrues nothing on leg B.
            if let Some(secondary) = &step.secondary {
                pnl += leg(secondary.hourly_pct, book.cross.side_b);
            }
        }
        pnl
    }
}

/// For each primary observation, the closest secondary observation within
/// [`ALIGNMENT_TOLERANCE_MS`], found with a pointer that only moves forward.
///
/// Both slices must be sorted by timestamp. On equal distance the earlier
/// secondary observation wins; among rows sharing a timestamp the last one
/// is used.
pub fn align_series(
    primary: &[FundingSnapshot],
    secondary: &[FundingSnapshot],
) -> Vec<Option<FundingSnapshot>> {
    let mut j = 0usize;
    let distance = |a: DateTime<Utc>, b: DateTime<Utc>| (a - b).num_milliseconds().abs();

    primary
        .iter()
        .map(|p| {
            if secondary.is_empty() {
                return None;
            }
            while j + 1 < secondary.len() {
                let current = secondary[j].timestamp;
                let next = secondary[j + 1].timestamp;
                let further = distance(next, p.timestamp) >= distance(current, p.timestamp);
                if next != current && further {
                    break;
                }
                j += 1;
            }
            let candidate = &secondary[j];
            (distance(candidate.timestamp, p.timestamp) < ALIGNMENT_TOLERANCE_MS)
                .then(|| candidate.clone())
        })
        .collect()
}
