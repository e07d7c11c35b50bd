//! Funding-rate decision engine.
//!
//! Pure functions that turn funding observations into target sides and a
//! combined annualised yield estimate. No state, no I/O: identical input
//! always yields identical output.

use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use crate::exchange::{PerpSide, SpotSide};

/// Perpetual side that receives funding at `hourly_pct`.
///
/// Shorts are paid when the rate is zero or positive, longs when negative.
pub fn decide_receive_side(hourly_pct: Decimal) -> PerpSide {
    if hourly_pct >= Decimal::ZERO {
        PerpSide::Short
    } else {
        PerpSide::Long
    }
}

/// Spot hedge for a perpetual side: the opposite economic exposure.
pub fn spot_side_for_perp(perp_side: PerpSide) -> SpotSide {
    match perp_side {
        PerpSide::Short => SpotSide::Buy,
        PerpSide::Long => SpotSide::Sell,
    }
}

/// Sign of `x`, with anything within `epsilon` of zero counted as zero.
fn sign_within(x: Decimal, epsilon: Decimal) -> i8 {
    if x.abs() <= epsilon {
        0
    } else if x.is_sign_positive() {
        1
    } else {
        -1
    }
}

/// Which branch of the cross decision applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrossReason {
    /// Rates have opposite non-zero signs; both legs are paid.
    OppositeSigns,
    /// One rate is ~0; only the other leg earns.
    OneSideFlat,
    /// Same sign (or both ~0); the larger leg earns, the smaller pays.
    SameSign,
}

impl fmt::Display for CrossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrossReason::OppositeSigns => "opposite signs, receive both",
            CrossReason::OneSideFlat => "one side ~0, single receive",
            CrossReason::SameSign => "same sign, receive larger pay smaller",
        })
    }
}

/// Output of [`cross_decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrossDecision {
    /// Combined APR (%) of holding `side_a` on venue A and `side_b` on venue B
    pub net_apr_pct: Decimal,
    pub side_a: PerpSide,
    pub side_b: PerpSide,
    pub reason: CrossReason,
}

/// Decide perp-perp sides across two venues.
///
/// With `sgn` treating `|x| <= epsilon` as zero:
/// - opposite non-zero signs: both legs receive, `net = |aprA| + |aprB|`
/// - exactly one ~0: each leg follows its own rate, `net = max(|aprA|, |aprB|)`
/// - otherwise: the larger `|apr|` leg receives, the other takes the opposite
///   side, `net = ||aprA| - |aprB||`
pub fn cross_decision(
    hourly_a: Decimal,
    apr_a: Decimal,
    hourly_b: Decimal,
    apr_b: Decimal,
    epsilon: Decimal,
) -> CrossDecision {
    let sgn_a = sign_within(hourly_a, epsilon);
    let sgn_b = sign_within(hourly_b, epsilon);
    let abs_a = apr_a.abs();
    let abs_b = apr_b.abs();

    if sgn_a != 0 && sgn_b != 0 && sgn_a != sgn_b {
        return CrossDecision {
            net_apr_pct: abs_a + abs_b,
            side_a: decide_receive_side(hourly_a),
            side_b: decide_receive_side(hourly_b),
            reason: CrossReason::OppositeSigns,
        };
    }

    if (sgn_a == 0) != (sgn_b == 0) {
        return CrossDecision {
            net_apr_pct: abs_a.max(abs_b),
            side_a: decide_receive_side(hourly_a),
            side_b: decide_receive_side(hourly_b),
            reason: CrossReason::OneSideFlat,
        };
    }

    // Ties go to venue A.
    let (side_a, side_b) = match abs_a.cmp(&abs_b) {
        Ordering::Less => {
            let receive = decide_receive_side(hourly_b);
            (receive.opposite(), receive)
        }
        Ordering::Equal | Ordering::Greater => {
            let receive = decide_receive_side(hourly_a);
            (receive, receive.opposite())
        }
    };

    CrossDecision {
        net_apr_pct: (abs_a - abs_b).abs(),
        side_a,
        side_b,
        reason: CrossReason::SameSign,
    }
}
