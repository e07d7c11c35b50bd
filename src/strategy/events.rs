//! Trade events emitted by the position state machine.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::exchange::{PerpSide, SpotSide};
use crate::utils::fmt_fixed;

/// Which position variant an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    /// One perpetual hedged with spot
    Single,
    /// Two perpetuals on two venues
    Cross,
}

impl TradeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Single => "SINGLE",
            TradeKind::Cross => "CROSS",
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Enter,
    Exit,
    /// Exit immediately followed by an entry on the new sides.
    Flip,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Enter => "ENTER",
            TradeAction::Exit => "EXIT",
            TradeAction::Flip => "FLIP",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one state machine action.
///
/// For single-venue events `side_a` is the perpetual side and `spot_side`
/// the hedge; for cross-venue events `side_a`/`side_b` are the two venues'
/// perpetual sides. EXIT events carry the sides that were closed, ENTER and
/// FLIP events the sides now held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeEvent {
    pub timestamp: DateTime<Utc>,
    pub market: String,
    pub kind: TradeKind,
    pub action: TradeAction,
    pub side_a: Option<PerpSide>,
    pub side_b: Option<PerpSide>,
    pub spot_side: Option<SpotSide>,
    pub apr_a_pct: Decimal,
    pub apr_b_pct: Option<Decimal>,
    pub net_apr_pct: Decimal,
    /// Realized P&L of the closed half (EXIT and FLIP only)
    pub realized_pnl: Option<Decimal>,
}

impl TradeEvent {
    /// Header of the trade-log CSV.
    pub const CSV_HEADER: &'static str =
        "timestamp,market,kind,action,sideA,sideB,spotSide,aprA(%),aprB(%),netApr(%),pnl";

    /// One trade-log CSV row; numerics at 2 dp, absent fields empty.
    pub fn to_csv_row(&self) -> String {
        let side = |s: Option<PerpSide>| s.map(|s| s.as_str()).unwrap_or("");
        let num = |v: Option<Decimal>| v.map(|v| fmt_fixed(v, 2)).unwrap_or_default();

        format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.market,
            self.kind,
            self.action,
            side(self.side_a),
            side(self.side_b),
            self.spot_side.map(|s| s.as_str()).unwrap_or(""),
            fmt_fixed(self.apr_a_pct, 2),
            num(self.apr_b_pct),
            fmt_fixed(self.net_apr_pct, 2),
            num(self.realized_pnl),
        )
    }
}
