//! Carry strategy implementation.
//!
//! Contains the core logic for:
//! - Funding-rate decisions (receive side, spot hedge, cross-venue net yield)
//! - Per-market action cooldown
//! - The single/cross-venue position state machine
//! - The live tick driver

mod cooldown;
mod decision;
mod events;
mod live;
mod state_machine;

pub use cooldown::{is_cooling, is_cooling_since};
pub use decision::{
    cross_decision, decide_receive_side, spot_side_for_perp, CrossDecision, CrossReason,
};
pub use events::{TradeAction, TradeEvent, TradeKind};
pub use live::{LiveLoop, TickOutcome, TickReport};
pub use state_machine::{
    CrossVenuePosition, MarketPositions, PositionStateMachine, SingleVenuePosition, StepPlan,
};
