//! Live driver: one evaluation pass over every configured market per tick.
//!
//! Markets are evaluated sequentially. Each step is planned against the
//! current state, its legs are sent to the execution adapter, and the plan is
//! committed only when every leg was acknowledged. A tick that starts while
//! another one is still running is skipped.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::events::{TradeAction, TradeEvent, TradeKind};
use super::state_machine::{MarketPositions, PositionStateMachine, StepPlan};
use crate::error::ExecutionError;
use crate::exchange::{
    ExecutionAdapter, FundingFeed, FundingSnapshot, Leg, PerpSide, SpotSide, Venue,
};

/// Result of one call to [`LiveLoop::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick was still in flight.
    Skipped,
    Completed(TickReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub started_at: Option<DateTime<Utc>>,
    pub markets_evaluated: usize,
    pub feed_errors: usize,
    pub execution_errors: usize,
    /// Events committed during this tick, in evaluation order
    pub events: Vec<TradeEvent>,
}

pub struct LiveLoop {
    machine: Mutex<PositionStateMachine>,
    primary: Box<dyn FundingFeed>,
    secondary: Option<Box<dyn FundingFeed>>,
    executor: Box<dyn ExecutionAdapter>,
}

impl LiveLoop {
    /// `secondary` is only consulted when cross-venue mode is enabled.
    pub fn new(
        machine: PositionStateMachine,
        primary: Box<dyn FundingFeed>,
        secondary: Option<Box<dyn FundingFeed>>,
        executor: Box<dyn ExecutionAdapter>,
    ) -> Self {
        Self {
            machine: Mutex::new(machine),
            primary,
            secondary,
            executor,
        }
    }

    /// Current positions of a market, waiting for any in-flight tick.
    pub async fn positions(&self, market: &str) -> Option<MarketPositions> {
        self.machine.lock().await.positions(market).cloned()
    }

    /// Run one evaluation pass over every configured market.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(mut machine) = self.machine.try_lock() else {
            warn!("Previous tick still in flight, skipping");
            return TickOutcome::Skipped;
        };

        let mut report = TickReport {
            started_at: Some(Utc::now()),
            ..TickReport::default()
        };
        let markets = machine.config().markets.clone();
        let cross_enabled = machine.config().cross_venue_enabled;

        for market in &markets {
            let Some(primary) = self.fetch(self.primary.as_ref(), market, &mut report).await
            else {
                continue;
            };

            let secondary = match (&self.secondary, cross_enabled) {
                (Some(feed), true) => {
                    match self.fetch(feed.as_ref(), market, &mut report).await {
                        Some(snapshot) => Some(snapshot),
                        None => continue,
                    }
                }
                _ => None,
            };

            report.markets_evaluated += 1;
            let plan = machine.plan(&primary, secondary.as_ref());
            if plan.events.is_empty() {
                machine.commit(plan);
                continue;
            }

            let notional = machine.config().notional_usd;
            match self.execute(&plan, notional).await {
                Ok(()) => report.events.extend(machine.commit(plan)),
                Err(e) => {
                    report.execution_errors += 1;
                    error!(
                        %market,
                        venue = %primary.venue,
                        timestamp = %plan.timestamp,
                        error = %e,
                        "Execution failed, position state left unchanged"
                    );
                }
            }
        }

        info!(
            markets = report.markets_evaluated,
            events = report.events.len(),
            feed_errors = report.feed_errors,
            execution_errors = report.execution_errors,
            "Tick complete"
        );
        TickOutcome::Completed(report)
    }

    async fn fetch(
        &self,
        feed: &dyn FundingFeed,
        market: &str,
        report: &mut TickReport,
    ) -> Option<FundingSnapshot> {
        match feed.fetch_funding(market).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                report.feed_errors += 1;
                warn!(
                    %market,
                    venue = %e.venue(),
                    error = %e,
                    "Funding fetch failed, skipping market"
                );
                None
            }
        }
    }

    /// Send every leg a plan implies; stops at the first failure.
    #[instrument(skip(self, plan), fields(market = %plan.market))]
    async fn execute(&self, plan: &StepPlan, notional_usd: Decimal) -> Result<(), ExecutionError> {
        for event in &plan.events {
            let (to_close, to_open) = self.legs_for(event, &plan.previous);

            for leg in to_close {
                let ack = self.executor.close_position(&plan.market, leg).await?;
                debug!(%leg, order_id = ack.order_id, "Leg closed");
            }
            for leg in to_open {
                let ack = self
                    .executor
                    .open_position(&plan.market, leg, notional_usd)
                    .await?;
                debug!(%leg, order_id = ack.order_id, "Leg opened");
            }
        }
        Ok(())
    }

    fn secondary_venue(&self) -> Option<Venue> {
        self.secondary.as_ref().map(|feed| feed.venue())
    }

    /// Legs to close and legs to open for one event.
    fn legs_for(&self, event: &TradeEvent, previous: &MarketPositions) -> (Vec<Leg>, Vec<Leg>) {
        let primary_venue = self.primary.venue();
        let secondary_venue = self.secondary_venue();

        let event_legs = match event.kind {
            TradeKind::Single => single_legs(primary_venue, event.side_a, event.spot_side),
            TradeKind::Cross => {
                cross_legs(primary_venue, secondary_venue, event.side_a, event.side_b)
            }
        };

        match event.action {
            TradeAction::Enter => (Vec::new(), event_legs),
            TradeAction::Exit => (event_legs, Vec::new()),
            TradeAction::Flip => {
                let held = match event.kind {
                    TradeKind::Single => single_legs(
                        primary_venue,
                        previous.single.perp_side,
                        previous.single.spot_side,
                    ),
                    TradeKind::Cross => cross_legs(
                        primary_venue,
                        secondary_venue,
                        previous.cross.side_a,
                        previous.cross.side_b,
                    ),
                };
                (held, event_legs)
            }
        }
    }
}

fn single_legs(
    venue: Venue,
    perp: Option<PerpSide>,
    spot: Option<SpotSide>,
) -> Vec<Leg> {
    let mut legs = Vec::with_capacity(2);
    if let Some(side) = perp {
        legs.push(Leg::Perp { venue, side });
    }
    if let Some(side) = spot {
        legs.push(Leg::Spot { side });
    }
    legs
}

fn cross_legs(
    venue_a: Venue,
    venue_b: Option<Venue>,
    side_a: Option<PerpSide>,
    side_b: Option<PerpSide>,
) -> Vec<Leg> {
    let mut legs = Vec::with_capacity(2);
    if let Some(side) = side_a {
        legs.push(Leg::Perp { venue: venue_a, side });
    }
    if let (Some(venue), Some(side)) = (venue_b, side_b) {
        legs.push(Leg::Perp { venue, side });
    }
    legs
}
