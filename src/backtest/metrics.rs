//! Summary statistics for a backtest run.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::strategy::{TradeAction, TradeEvent, TradeKind};

/// One point of the cumulative P&L series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlPoint {
    pub timestamp: DateTime<Utc>,
    pub market: String,
    /// Funding accrued by this market at this step
    pub step_pnl: Decimal,
    /// Running total across all markets
    pub cumulative_pnl: Decimal,
}

/// Aggregate results of a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    /// Sum of per-step funding accrual
    pub total_accrued: Decimal,
    /// Sum of realized P&L attached to EXIT/FLIP events. Informational only,
    /// it is not part of the cumulative series.
    pub total_realized: Decimal,
    pub final_cumulative_pnl: Decimal,
    /// Largest peak-to-trough fall of the cumulative series, in USD
    pub max_drawdown: Decimal,

    pub single_trades: u64,
    pub cross_trades: u64,
    pub enters: u64,
    pub exits: u64,
    pub flips: u64,

    pub steps_processed: usize,
    /// Primary steps with no secondary observation inside the alignment window
    pub alignment_gaps: usize,
    pub duration_days: f64,
}

impl BacktestSummary {
    /// Calculate the summary from a finished run.
    pub fn calculate(
        trades: &[TradeEvent],
        pnl_series: &[PnlPoint],
        steps_processed: usize,
        alignment_gaps: usize,
    ) -> Self {
        let total_accrued = pnl_series.iter().map(|p| p.step_pnl).sum();
        let total_realized = trades.iter().filter_map(|t| t.realized_pnl).sum();
        let final_cumulative_pnl = pnl_series
            .last()
            .map(|p| p.cumulative_pnl)
            .unwrap_or(Decimal::ZERO);

        let count = |pred: &dyn Fn(&TradeEvent) -> bool| {
            trades.iter().filter(|t| pred(t)).count() as u64
        };

        let duration_days = match (pnl_series.first(), pnl_series.last()) {
            (Some(first), Some(last)) => {
                (last.timestamp - first.timestamp).num_seconds() as f64 / 86400.0
            }
            _ => 0.0,
        };

        Self {
            total_accrued,
            total_realized,
            final_cumulative_pnl,
            max_drawdown: calculate_max_drawdown(pnl_series),
            single_trades: count(&|t| t.kind == TradeKind::Single),
            cross_trades: count(&|t| t.kind == TradeKind::Cross),
            enters: count(&|t| t.action == TradeAction::Enter),
            exits: count(&|t| t.action == TradeAction::Exit),
            flips: count(&|t| t.action == TradeAction::Flip),
            steps_processed,
            alignment_gaps,
            duration_days,
        }
    }

    /// Format the summary for the terminal.
    pub fn summary(&self) -> String {
        format!(
            r#"═══════════════════════════════════════════════
BACKTEST RESULTS ({:.1} days)
═══════════════════════════════════════════════
P&L
  Funding Accrued:   ${:.2}
  Final Cumulative:  ${:.2}
  Max Drawdown:      ${:.2}
  Realized (info):   ${:.2}

ACTIVITY
  Single Trades:     {}
  Cross Trades:      {}
  Enter/Exit/Flip:   {}/{}/{}

DATA
  Steps:             {}
  Alignment Gaps:    {}
═══════════════════════════════════════════════"#,
            self.duration_days,
            self.total_accrued,
            self.final_cumulative_pnl,
            self.max_drawdown,
            self.total_realized,
            self.single_trades,
            self.cross_trades,
            self.enters,
            self.exits,
            self.flips,
            self.steps_processed,
            self.alignment_gaps,
        )
    }
}

/// Largest fall of the cumulative P&L below its running peak (starting at 0).
fn calculate_max_drawdown(pnl_series: &[PnlPoint]) -> Decimal {
    let mut peak = Decimal::ZERO;
    let mut max_dd = Decimal::ZERO;

    for point in pnl_series {
        peak = peak.max(point.cumulative_pnl);
        max_dd = max_dd.max(peak - point.cumulative_pnl);
    }

    max_dd
}
