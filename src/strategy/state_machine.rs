//! Per-market position state machine.
//!
//! Each market owns one [`SingleVenuePosition`] (perp on the primary venue,
//! hedged with spot) and one [`CrossVenuePosition`] (perps on both venues).
//! At most one of the two is open at any time, and cross evaluation runs
//! first.
//!
//! Evaluation is split into [`PositionStateMachine::plan`], which never
//! mutates, and [`PositionStateMachine::commit`]. The backtester commits every
//! plan; the live loop commits only after the execution adapter acknowledged
//! every leg.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::{debug, info};

use super::cooldown::is_cooling_since;
use super::decision::{cross_decision, decide_receive_side, spot_side_for_perp, CrossDecision};
use super::events::{TradeAction, TradeEvent, TradeKind};
use crate::config::StrategyConfig;
use crate::exchange::{FundingSnapshot, PerpSide, SpotSide, HOURS_PER_YEAR};

const MS_PER_HOUR: Decimal = dec!(3600000);

/// Perpetual on the primary venue plus a spot hedge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SingleVenuePosition {
    pub open: bool,
    pub perp_side: Option<PerpSide>,
    pub spot_side: Option<SpotSide>,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_action_at: Option<DateTime<Utc>>,
    /// Carry APR (%) recorded at the last action
    pub last_apr_pct: Decimal,
}

/// Opposite perpetuals on the primary (A) and secondary (B) venues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossVenuePosition {
    pub open: bool,
    pub side_a: Option<PerpSide>,
    pub side_b: Option<PerpSide>,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_action_at: Option<DateTime<Utc>>,
    /// Net APR (%) recorded at the last action
    pub last_net_apr_pct: Decimal,
}

/// Both position variants for one market.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketPositions {
    pub single: SingleVenuePosition,
    pub cross: CrossVenuePosition,
}

impl MarketPositions {
    /// Latest action on either variant; the cooldown is per market.
    pub fn last_action_at(&self) -> Option<DateTime<Utc>> {
        self.single.last_action_at.max(self.cross.last_action_at)
    }

    pub fn is_flat(&self) -> bool {
        !self.single.open && !self.cross.open
    }
}

/// Proposed outcome of one evaluation step for one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    /// State before the step
    pub previous: MarketPositions,
    /// State after the step, if committed
    pub next: MarketPositions,
    pub events: Vec<TradeEvent>,
}

impl StepPlan {
    pub fn is_noop(&self) -> bool {
        self.events.is_empty() && self.previous == self.next
    }
}

/// Owns every market's positions for one run.
#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    config: StrategyConfig,
    enter_threshold_pct: Decimal,
    exit_threshold_pct: Decimal,
    positions: HashMap<String, MarketPositions>,
}

impl PositionStateMachine {
    /// Create a machine with every market implicitly closed.
    pub fn new(config: StrategyConfig) -> Self {
        let enter_threshold_pct = config.enter_threshold_pct;
        let exit_threshold_pct = config.exit_threshold();
        Self {
            config,
            enter_threshold_pct,
            exit_threshold_pct,
            positions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn enter_threshold_pct(&self) -> Decimal {
        self.enter_threshold_pct
    }

    pub fn exit_threshold_pct(&self) -> Decimal {
        self.exit_threshold_pct
    }

    /// Positions for a market, if it has been evaluated.
    pub fn positions(&self, market: &str) -> Option<&MarketPositions> {
        self.positions.get(market)
    }

    /// Evaluate and commit one step.
    pub fn step(
        &mut self,
        primary: &FundingSnapshot,
        secondary: Option<&FundingSnapshot>,
    ) -> Vec<TradeEvent> {
        let plan = self.plan(primary, secondary);
        self.commit(plan)
    }

    /// Store a plan's resulting state and hand back its events.
    pub fn commit(&mut self, plan: StepPlan) -> Vec<TradeEvent> {
        self.positions.insert(plan.market, plan.next);
        plan.events
    }

    /// Evaluate one step for `primary.market` at `primary.timestamp` without
    /// mutating anything.
    ///
    /// `secondary` is the secondary venue's observation for the same market;
    /// `None` means cross mode is off or no observation is available.
    pub fn plan(
        &self,
        primary: &FundingSnapshot,
        secondary: Option<&FundingSnapshot>,
    ) -> StepPlan {
        let previous = self
            .positions
            .get(&primary.market)
            .cloned()
            .unwrap_or_default();
        let mut next = previous.clone();
        let mut events = Vec::new();

        let cross_claimed = self.config.cross_venue_enabled
            && self.plan_cross(&mut next, &mut events, primary, secondary);

        if !cross_claimed {
            self.plan_single(&mut next, &mut events, primary);
        }

        debug_assert!(!(next.single.open && next.cross.open));

        StepPlan {
            market: primary.market.clone(),
            timestamp: primary.timestamp,
            previous,
            next,
            events,
        }
    }

    fn cooling(&self, book: &MarketPositions, now: DateTime<Utc>) -> bool {
        is_cooling_since(book.last_action_at(), now, self.config.cooldown_seconds)
    }

    /// Realized P&L of closing a position held since `opened_at`.
    ///
    /// `avg_apr = (entry_apr + current_apr) / 2`, pro-rated over the hours held.
    fn realized_pnl(
        &self,
        entry_apr_pct: Decimal,
        current_apr_pct: Decimal,
        opened_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Decimal {
        let held_ms = opened_at
            .map(|t| (now - t).num_milliseconds().max(0))
            .unwrap_or(0);
        let hours_held = Decimal::from(held_ms) / MS_PER_HOUR;
        let avg_apr_pct = (entry_apr_pct + current_apr_pct) / dec!(2);

        avg_apr_pct / dec!(100) * (hours_held / HOURS_PER_YEAR) * self.config.notional_usd
    }

    /// Cross-venue path. Returns true when it claims the step, which skips
    /// the single-venue path.
    fn plan_cross(
        &self,
        book: &mut MarketPositions,
        events: &mut Vec<TradeEvent>,
        primary: &FundingSnapshot,
        secondary: Option<&FundingSnapshot>,
    ) -> bool {
        let now = primary.timestamp;
        let market = primary.market.as_str();

        if !book.cross.open {
            let Some(secondary) = secondary else {
                return false;
            };
            // Never stack a cross position on an open single one.
            if book.single.open {
                return false;
            }

            let decision = self.decide_cross(primary, secondary);
            if decision.net_apr_pct < self.enter_threshold_pct {
                return false;
            }
            if self.cooling(book, now) {
                info!(
                    %market,
                    net_apr = %decision.net_apr_pct,
                    "Cooldown active, suppressing cross ENTER"
                );
                return true;
            }

            book.cross = CrossVenuePosition {
                open: true,
                side_a: Some(decision.side_a),
                side_b: Some(decision.side_b),
                opened_at: Some(now),
                last_action_at: Some(now),
                last_net_apr_pct: decision.net_apr_pct,
            };
            info!(
                %market,
                side_a = %decision.side_a,
                side_b = %decision.side_b,
                net_apr = %decision.net_apr_pct,
                reason = %decision.reason,
                "Cross ENTER"
            );
            events.push(cross_event(
                TradeAction::Enter,
                &decision,
                (decision.side_a, decision.side_b),
                primary,
                secondary,
                None,
            ));
            return true;
        }

        let (Some(held_a), Some(held_b)) = (book.cross.side_a, book.cross.side_b) else {
            return true;
        };

        let Some(secondary) = secondary else {
            debug!(%market, "No secondary observation, holding cross position");
            return true;
        };

        let decision = self.decide_cross(primary, secondary);
        let flip_needed = held_a != decision.side_a || held_b != decision.side_b;
        let should_close = decision.net_apr_pct <= self.exit_threshold_pct
            || (flip_needed && decision.net_apr_pct < self.enter_threshold_pct);
        let should_flip = flip_needed && decision.net_apr_pct >= self.enter_threshold_pct;

        if !should_close && !should_flip {
            debug!(%market, net_apr = %decision.net_apr_pct, "Holding cross position");
            return true;
        }

        let action = if should_flip {
            TradeAction::Flip
        } else {
            TradeAction::Exit
        };

        if self.cooling(book, now) {
            info!(
                %market,
                %action,
                net_apr = %decision.net_apr_pct,
                "Cooldown active, suppressing cross action"
            );
            return true;
        }

        let carry_now = primary.apr_pct.abs() * held_a.receive_sign(primary.hourly_pct)
            + secondary.apr_pct.abs() * held_b.receive_sign(secondary.hourly_pct);
        let realized = self.realized_pnl(
            book.cross.last_net_apr_pct,
            carry_now,
            book.cross.opened_at,
            now,
        );

        info!(
            %market,
            %action,
            net_apr = %decision.net_apr_pct,
            reason = %decision.reason,
            realized_pnl = %realized,
            "Cross {}",
            action
        );

        if should_flip {
            book.cross = CrossVenuePosition {
                open: true,
                side_a: Some(decision.side_a),
                side_b: Some(decision.side_b),
                opened_at: Some(now),
                last_action_at: Some(now),
                last_net_apr_pct: decision.net_apr_pct,
            };
            events.push(cross_event(
                TradeAction::Flip,
                &decision,
                (decision.side_a, decision.side_b),
                primary,
                secondary,
                Some(realized),
            ));
            true
        } else {
            book.cross.open = false;
            book.cross.last_action_at = Some(now);
            book.cross.last_net_apr_pct = decision.net_apr_pct;
            events.push(cross_event(
                TradeAction::Exit,
                &decision,
                (held_a, held_b),
                primary,
                secondary,
                Some(realized),
            ));
            false
        }
    }

    fn decide_cross(
        &self,
        primary: &FundingSnapshot,
        secondary: &FundingSnapshot,
    ) -> CrossDecision {
        cross_decision(
            primary.hourly_pct,
            primary.apr_pct,
            secondary.hourly_pct,
            secondary.apr_pct,
            self.config.epsilon,
        )
    }

    /// Single-venue path on the primary venue's rate.
    fn plan_single(
        &self,
        book: &mut MarketPositions,
        events: &mut Vec<TradeEvent>,
        primary: &FundingSnapshot,
    ) {
        let now = primary.timestamp;
        let market = primary.market.as_str();
        let apr_abs = primary.apr_pct.abs();
        let desired_perp = decide_receive_side(primary.hourly_pct);
        let desired_spot = spot_side_for_perp(desired_perp);

        if !book.single.open {
            if apr_abs < self.enter_threshold_pct {
                return;
            }
            if self.cooling(book, now) {
                info!(%market, apr = %primary.apr_pct, "Cooldown active, suppressing ENTER");
                return;
            }

            book.single = SingleVenuePosition {
                open: true,
                perp_side: Some(desired_perp),
                spot_side: Some(desired_spot),
                opened_at: Some(now),
                last_action_at: Some(now),
                last_apr_pct: apr_abs,
            };
            info!(
                %market,
                perp_side = %desired_perp,
                spot_side = %desired_spot,
                apr = %primary.apr_pct,
                "Single ENTER"
            );
            events.push(single_event(
                TradeAction::Enter,
                desired_perp,
                desired_spot,
                primary,
                None,
            ));
            return;
        }

        let (Some(held_perp), Some(held_spot)) = (book.single.perp_side, book.single.spot_side)
        else {
            return;
        };

        let signal_flipped = desired_perp != held_perp;
        let should_close = apr_abs <= self.exit_threshold_pct
            || (signal_flipped && apr_abs < self.enter_threshold_pct);
        let should_flip = signal_flipped && apr_abs >= self.enter_threshold_pct;

        if !should_close && !should_flip {
            debug!(%market, apr = %primary.apr_pct, "Holding single position");
            return;
        }

        let action = if should_flip {
            TradeAction::Flip
        } else {
            TradeAction::Exit
        };

        if self.cooling(book, now) {
            info!(%market, %action, apr = %primary.apr_pct, "Cooldown active, suppressing action");
            return;
        }

        let carry_now = apr_abs * held_perp.receive_sign(primary.hourly_pct);
        let realized = self.realized_pnl(
            book.single.last_apr_pct,
            carry_now,
            book.single.opened_at,
            now,
        );

        info!(
            %market,
            %action,
            apr = %primary.apr_pct,
            realized_pnl = %realized,
            "Single {}",
            action
        );

        if should_flip {
            book.single = SingleVenuePosition {
                open: true,
                perp_side: Some(desired_perp),
                spot_side: Some(desired_spot),
                opened_at: Some(now),
                last_action_at: Some(now),
                last_apr_pct: apr_abs,
            };
            events.push(single_event(
                TradeAction::Flip,
                desired_perp,
                desired_spot,
                primary,
                Some(realized),
            ));
        } else {
            book.single.open = false;
            book.single.last_action_at = Some(now);
            book.single.last_apr_pct = apr_abs;
            events.push(single_event(
                TradeAction::Exit,
                held_perp,
                held_spot,
                primary,
                Some(realized),
            ));
        }
    }
}

fn single_event(
    action: TradeAction,
    perp_side: PerpSide,
    spot_side: SpotSide,
    primary: &FundingSnapshot,
    realized_pnl: Option<Decimal>,
) -> TradeEvent {
    TradeEvent {
        timestamp: primary.timestamp,
        market: primary.market.clone(),
        kind: TradeKind::Single,
        action,
        side_a: Some(perp_side),
        side_b: None,
        spot_side: Some(spot_side),
        apr_a_pct: primary.apr_pct,
        apr_b_pct: None,
        net_apr_pct: primary.apr_pct.abs(),
        realized_pnl,
    }
}

fn cross_event(
    action: TradeAction,
    decision: &CrossDecision,
    (side_a, side_b): (PerpSide, PerpSide),
    primary: &FundingSnapshot,
    secondary: &FundingSnapshot,
    realized_pnl: Option<Decimal>,
) -> TradeEvent {
    TradeEvent {
        timestamp: primary.timestamp,
        market: primary.market.clone(),
        kind: TradeKind::Cross,
        action,
        side_a: Some(side_a),
        side_b: Some(side_b),
        spot_side: None,
        apr_a_pct: primary.apr_pct,
        apr_b_pct: Some(secondary.apr_pct),
        net_apr_pct: decision.net_apr_pct,
        realized_pnl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Venue;
    use chrono::{Duration, TimeZone};

    // =========================================================================
    // Test Helpers
    // =========================================================================

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn strategy(cross: bool) -> StrategyConfig {
        StrategyConfig {
            markets: vec!["SOL".to_string()],
            enter_threshold_pct: dec!(10),
            exit_threshold_pct: None,
            cooldown_seconds: 300,
            notional_usd: dec!(500),
            epsilon: dec!(0.000001),
            cross_venue_enabled: cross,
        }
    }

    fn snap(venue: Venue, hourly_pct: Decimal, at: DateTime<Utc>) -> FundingSnapshot {
        FundingSnapshot::from_hourly_pct(venue, "SOL", hourly_pct, at)
    }

    fn primary(hourly_pct: Decimal, at: DateTime<Utc>) -> FundingSnapshot {
        snap(Venue::Hyperliquid, hourly_pct, at)
    }

    fn secondary(hourly_pct: Decimal, at: DateTime<Utc>) -> FundingSnapshot {
        snap(Venue::Binance, hourly_pct, at)
    }

    /// Deterministic pseudo-random hourly rates in roughly ±0.004 %/h.
    fn rate_sequence(seed: u64, len: usize) -> Vec<Decimal> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let bucket = ((state >> 33) % 81) as i64 - 40;
                Decimal::new(bucket, 4)
            })
            .collect()
    }

    // =========================================================================
    // Single-venue scenarios
    // =========================================================================

    #[test]
    fn test_below_enter_threshold_emits_nothing() {
        // 0.001 %/h = 8.76% APR < 10
        let mut machine = PositionStateMachine::new(strategy(false));
        let events = machine.step(&primary(dec!(0.001), t0()), None);

        assert!(events.is_empty());
        assert!(machine.positions("SOL").unwrap().is_flat());
    }

    #[test]
    fn test_enter_short_perp_buy_spot() {
        // 0.0014 %/h = 12.264% APR
        let mut machine = PositionStateMachine::new(strategy(false));
        let events = machine.step(&primary(dec!(0.0014), t0()), None);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind, TradeKind::Single);
        assert_eq!(event.action, TradeAction::Enter);
        assert_eq!(event.side_a, Some(PerpSide::Short));
        assert_eq!(event.spot_side, Some(SpotSide::Buy));
        assert_eq!(event.realized_pnl, None);

        let single = &machine.positions("SOL").unwrap().single;
        assert!(single.open);
        assert_eq!(single.last_apr_pct, dec!(12.264));
        assert_eq!(single.opened_at, Some(t0()));
    }

    #[test]
    fn test_enter_long_on_negative_funding() {
        let mut machine = PositionStateMachine::new(strategy(false));
        let events = machine.step(&primary(dec!(-0.002), t0()), None);

        assert_eq!(events[0].side_a, Some(PerpSide::Long));
        assert_eq!(events[0].spot_side, Some(SpotSide::Sell));
    }

    #[test]
    fn test_exit_below_exit_threshold_realizes_average_apr() {
        let mut machine = PositionStateMachine::new(strategy(false));
        let opened = t0();
        let now = opened + Duration::hours(876); // 0.1 year
        machine.positions.insert(
            "SOL".to_string(),
            MarketPositions {
                single: SingleVenuePosition {
                    open: true,
                    perp_side: Some(PerpSide::Short),
                    spot_side: Some(SpotSide::Buy),
                    opened_at: Some(opened),
                    last_action_at: Some(opened),
                    last_apr_pct: dec!(15),
                },
                cross: CrossVenuePosition::default(),
            },
        );

        let observation = FundingSnapshot {
            venue: Venue::Hyperliquid,
            market: "SOL".to_string(),
            hourly_pct: dec!(5) / HOURS_PER_YEAR,
            apr_pct: dec!(5),
            timestamp: now,
        };
        let events = machine.step(&observation, None);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, TradeAction::Exit);
        assert_eq!(events[0].side_a, Some(PerpSide::Short));
        // avg apr 10% over 0.1 year on 500
        assert_eq!(events[0].realized_pnl, Some(dec!(5)));

        let single = &machine.positions("SOL").unwrap().single;
        assert!(!single.open);
        assert_eq!(single.last_action_at, Some(now));
        assert_eq!(single.perp_side, Some(PerpSide::Short));
    }

    #[test]
    fn test_flip_when_sign_reverses_above_enter() {
        let mut machine = PositionStateMachine::new(strategy(false));
        machine.step(&primary(dec!(0.002), t0()), None);

        let later = t0() + Duration::hours(10);
        let events = machine.step(&primary(dec!(-0.002), later), None);

        assert_eq!(events.len(), 1);
        let flip = &events[0];
        assert_eq!(flip.action, TradeAction::Flip);
        assert_eq!(flip.side_a, Some(PerpSide::Long));
        assert_eq!(flip.spot_side, Some(SpotSide::Sell));
        assert_eq!(flip.timestamp, later);
        // entry 17.52, held short now paying 17.52 -> avg 0
        assert_eq!(flip.realized_pnl, Some(Decimal::ZERO));

        let single = &machine.positions("SOL").unwrap().single;
        assert!(single.open);
        assert_eq!(single.opened_at, Some(later));
        assert_eq!(single.perp_side, Some(PerpSide::Long));
    }

    #[test]
    fn test_sign_reversal_below_enter_closes() {
        let mut machine = PositionStateMachine::new(strategy(false));
        machine.step(&primary(dec!(0.002), t0()), None);

        // -0.001 %/h = 8.76% on the wrong side: above exit, below enter
        let events = machine.step(&primary(dec!(-0.001), t0() + Duration::hours(1)), None);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, TradeAction::Exit);
        assert_eq!(events[0].side_a, Some(PerpSide::Short));
    }

    #[test]
    fn test_hysteresis_band_holds() {
        let mut machine = PositionStateMachine::new(strategy(false));
        let mut all = Vec::new();

        // oscillate between 9.636% and 10.512% APR, never near the 6% exit
        for i in 0..48 {
            let hourly = if i % 2 == 0 { dec!(0.0012) } else { dec!(0.0011) };
            all.extend(machine.step(&primary(hourly, t0() + Duration::hours(i)), None));
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].action, TradeAction::Enter);
        assert!(machine.exit_threshold_pct() < machine.enter_threshold_pct());
    }

    #[test]
    fn test_cooldown_suppresses_then_allows() {
        let mut machine = PositionStateMachine::new(strategy(false));
        machine.step(&primary(dec!(0.002), t0()), None);

        // collapse 2 minutes later: still cooling, state held
        let early = machine.step(&primary(dec!(0.0001), t0() + Duration::minutes(2)), None);
        assert!(early.is_empty());
        assert!(machine.positions("SOL").unwrap().single.open);

        // exactly at the cooldown boundary the exit goes through
        let late = machine.step(&primary(dec!(0.0001), t0() + Duration::minutes(5)), None);
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].action, TradeAction::Exit);
    }

    #[test]
    fn test_plan_does_not_mutate() {
        let machine = PositionStateMachine::new(strategy(false));
        let plan = machine.plan(&primary(dec!(0.002), t0()), None);

        assert_eq!(plan.events.len(), 1);
        assert!(plan.next.single.open);
        assert!(!plan.is_noop());
        assert!(machine.positions("SOL").is_none());
    }

    // =========================================================================
    // Cross-venue scenarios
    // =========================================================================

    #[test]
    fn test_cross_enter_opposite_signs() {
        let mut machine = PositionStateMachine::new(strategy(true));
        let a = primary(dec!(0.002), t0());
        let b = secondary(dec!(-0.0015), t0());

        let events = machine.step(&a, Some(&b));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind, TradeKind::Cross);
        assert_eq!(event.action, TradeAction::Enter);
        assert_eq!(event.side_a, Some(PerpSide::Short));
        assert_eq!(event.side_b, Some(PerpSide::Long));
        assert_eq!(event.net_apr_pct, dec!(30.66));
        assert_eq!(event.spot_side, None);

        let book = machine.positions("SOL").unwrap();
        assert!(book.cross.open);
        assert!(!book.single.open);
    }

    #[test]
    fn test_cross_without_secondary_falls_back_to_single() {
        let mut machine = PositionStateMachine::new(strategy(true));
        let events = machine.step(&primary(dec!(0.002), t0()), None);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeKind::Single);
    }

    #[test]
    fn test_cross_below_enter_falls_back_to_single() {
        let mut machine = PositionStateMachine::new(strategy(true));
        // same sign: net = |17.52 - 13.14| = 4.38 < 10, but primary alone is 17.52
        let a = primary(dec!(0.002), t0());
        let b = secondary(dec!(0.0015), t0());

        let events = machine.step(&a, Some(&b));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeKind::Single);
    }

    #[test]
    fn test_cross_open_holds_through_alignment_gap() {
        let mut machine = PositionStateMachine::new(strategy(true));
        machine.step(&primary(dec!(0.002), t0()), Some(&secondary(dec!(-0.0015), t0())));

        let later = t0() + Duration::hours(1);
        let events = machine.step(&primary(dec!(0.00001), later), None);

        assert!(events.is_empty());
        let book = machine.positions("SOL").unwrap();
        assert!(book.cross.open);
        assert!(!book.single.open);
    }

    #[test]
    fn test_cross_exit_then_single_is_cooled() {
        let mut machine = PositionStateMachine::new(strategy(true));
        machine.step(&primary(dec!(0.002), t0()), Some(&secondary(dec!(-0.0015), t0())));

        // same sign, net = |17.52 - 17.52| = 0 -> cross exits; single would
        // enter on 17.52 but the market just acted
        let later = t0() + Duration::hours(2);
        let events = machine.step(
            &primary(dec!(0.002), later),
            Some(&secondary(dec!(0.002), later)),
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeKind::Cross);
        assert_eq!(events[0].action, TradeAction::Exit);
        assert_eq!(events[0].side_a, Some(PerpSide::Short));
        assert_eq!(events[0].side_b, Some(PerpSide::Long));
        assert!(machine.positions("SOL").unwrap().is_flat());

        // after the cooldown the single leg may enter
        let much_later = later + Duration::minutes(10);
        let events = machine.step(
            &primary(dec!(0.002), much_later),
            Some(&secondary(dec!(0.002), much_later)),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeKind::Single);
    }

    #[test]
    fn test_cross_flip_when_desired_sides_change() {
        let mut machine = PositionStateMachine::new(strategy(true));
        machine.step(&primary(dec!(0.002), t0()), Some(&secondary(dec!(-0.0015), t0())));

        let later = t0() + Duration::hours(3);
        let events = machine.step(
            &primary(dec!(-0.002), later),
            Some(&secondary(dec!(0.0015), later)),
        );

        assert_eq!(events.len(), 1);
        let flip = &events[0];
        assert_eq!(flip.action, TradeAction::Flip);
        assert_eq!(flip.side_a, Some(PerpSide::Long));
        assert_eq!(flip.side_b, Some(PerpSide::Short));
        // entry 30.66; held legs now both pay 30.66 -> avg 0
        assert_eq!(flip.realized_pnl, Some(Decimal::ZERO));

        let cross = &machine.positions("SOL").unwrap().cross;
        assert_eq!(cross.opened_at, Some(later));
        assert_eq!(cross.side_a, Some(PerpSide::Long));
    }

    #[test]
    fn test_cross_not_stacked_on_open_single() {
        let mut machine = PositionStateMachine::new(strategy(true));
        machine.step(&primary(dec!(0.002), t0()), None);

        let later = t0() + Duration::hours(1);
        let events = machine.step(
            &primary(dec!(0.002), later),
            Some(&secondary(dec!(-0.0015), later)),
        );

        assert!(events.is_empty());
        let book = machine.positions("SOL").unwrap();
        assert!(book.single.open);
        assert!(!book.cross.open);
    }

    // =========================================================================
    // Properties over long sequences
    // =========================================================================

    #[test]
    fn test_single_and_cross_never_both_open() {
        for seed in 1..=8 {
            let mut machine = PositionStateMachine::new(strategy(true));
            let rates_a = rate_sequence(seed, 400);
            let rates_b = rate_sequence(seed * 7919, 400);

            for (i, (ra, rb)) in rates_a.iter().zip(&rates_b).enumerate() {
                let at = t0() + Duration::minutes(20 * i as i64);
                let b = secondary(*rb, at);
                // every fifth step the secondary is missing
                let observed = if i % 5 == 4 { None } else { Some(&b) };
                machine.step(&primary(*ra, at), observed);

                let book = machine.positions("SOL").unwrap();
                assert!(
                    !(book.single.open && book.cross.open),
                    "seed {seed} step {i}: both open"
                );
            }
        }
    }

    #[test]
    fn test_actions_respect_cooldown_spacing() {
        for seed in 1..=8 {
            let mut machine = PositionStateMachine::new(strategy(true));
            let rates_a = rate_sequence(seed, 300);
            let rates_b = rate_sequence(seed + 1000, 300);
            let mut events = Vec::new();

            for (i, (ra, rb)) in rates_a.iter().zip(&rates_b).enumerate() {
                let at = t0() + Duration::minutes(i as i64);
                events.extend(machine.step(&primary(*ra, at), Some(&secondary(*rb, at))));
            }

            assert!(!events.is_empty(), "seed {seed} produced no events");
            for pair in events.windows(2) {
                let gap = pair[1].timestamp - pair[0].timestamp;
                assert!(gap >= Duration::seconds(300), "seed {seed}: gap {gap}");
            }
        }
    }
}
