//! Configuration management for the carry engine.
//!
//! Loads settings from an optional `config` file and `FCARRY__*` environment
//! variables (e.g. `FCARRY__STRATEGY__ENTER_THRESHOLD_PCT=12`).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::exchange::Venue;
use crate::utils::round_half_up;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Decision thresholds and sizing
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Which venues to read funding from
    #[serde(default)]
    pub venues: VenueConfig,
    /// Live driver settings
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Markets to evaluate, in evaluation order (base assets, e.g. "SOL")
    #[serde(default = "default_markets")]
    pub markets: Vec<String>,
    /// APR (%) at or above which a position is opened
    #[serde(default = "default_enter_threshold_pct")]
    pub enter_threshold_pct: Decimal,
    /// APR (%) at or below which a position is closed.
    /// Defaults to 60% of the enter threshold, rounded to 2 dp.
    #[serde(default)]
    pub exit_threshold_pct: Option<Decimal>,
    /// Minimum seconds between two actions on the same market
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// USD notional of each leg
    #[serde(default = "default_notional_usd")]
    pub notional_usd: Decimal,
    /// Hourly rates with |rate| <= epsilon count as zero in cross decisions
    #[serde(default = "default_epsilon")]
    pub epsilon: Decimal,
    /// Evaluate perp-perp carry against the secondary venue
    #[serde(default)]
    pub cross_venue_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue whose perpetual is hedged with spot
    #[serde(default = "default_primary_venue")]
    pub primary: Venue,
    /// Second perpetual venue for cross carry, or "none"
    #[serde(default = "default_secondary_venue")]
    pub secondary: String,
    /// Use the Binance futures testnet for funding reads
    #[serde(default)]
    pub binance_testnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Simulate fills instead of sending orders
    #[serde(default = "default_paper_mode")]
    pub paper_mode: bool,
    /// Seconds between live ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

// Default value functions
fn default_markets() -> Vec<String> {
    vec!["SOL".to_string()]
}

fn default_enter_threshold_pct() -> Decimal {
    dec!(10) // 10% APR
}

fn default_cooldown_seconds() -> u64 {
    300
}

fn default_notional_usd() -> Decimal {
    dec!(500)
}

fn default_epsilon() -> Decimal {
    dec!(0.000001)
}

fn default_primary_venue() -> Venue {
    Venue::Hyperliquid
}

fn default_secondary_venue() -> String {
    "none".to_string()
}

fn default_paper_mode() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    60
}

/// Exit threshold implied by an enter threshold: `round(enter * 0.6, 2)`.
pub fn default_exit_threshold(enter_threshold_pct: Decimal) -> Decimal {
    round_half_up(enter_threshold_pct * dec!(0.6), 2)
}

impl StrategyConfig {
    /// Effective exit threshold.
    pub fn exit_threshold(&self) -> Decimal {
        self.exit_threshold_pct
            .unwrap_or_else(|| default_exit_threshold(self.enter_threshold_pct))
    }

    /// Validate thresholds and sizing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.markets.is_empty() {
            return Err(ConfigError::invalid("strategy.markets", "at least one market is required"));
        }
        if let Some(blank) = self.markets.iter().find(|m| m.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "strategy.markets",
                format!("blank market identifier {:?}", blank),
            ));
        }
        if self.enter_threshold_pct <= Decimal::ZERO {
            return Err(ConfigError::invalid(
                "strategy.enter_threshold_pct",
                format!("must be positive, got {}", self.enter_threshold_pct),
            ));
        }
        let exit = self.exit_threshold();
        if exit < Decimal::ZERO {
            return Err(ConfigError::invalid(
                "strategy.exit_threshold_pct",
                format!("must not be negative, got {}", exit),
            ));
        }
        if exit >= self.enter_threshold_pct {
            return Err(ConfigError::invalid(
                "strategy.exit_threshold_pct",
                format!(
                    "must be below enter threshold {} (got {})",
                    self.enter_threshold_pct, exit
                ),
            ));
        }
        if self.notional_usd <= Decimal::ZERO {
            return Err(ConfigError::invalid(
                "strategy.notional_usd",
                format!("must be positive, got {}", self.notional_usd),
            ));
        }
        if self.epsilon < Decimal::ZERO {
            return Err(ConfigError::invalid(
                "strategy.epsilon",
                format!("must not be negative, got {}", self.epsilon),
            ));
        }
        Ok(())
    }
}

impl VenueConfig {
    /// Parsed secondary venue (`None` when set to "none").
    pub fn secondary_venue(&self) -> Result<Option<Venue>, ConfigError> {
        Venue::parse_optional(&self.secondary)
            .map_err(|reason| ConfigError::invalid("venues.secondary", reason))
    }
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("FCARRY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("strategy.markets")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;

        let secondary = self.venues.secondary_venue()?;
        if self.strategy.cross_venue_enabled {
            match secondary {
                None => {
                    return Err(ConfigError::invalid(
                        "venues.secondary",
                        "cross_venue_enabled requires a secondary venue",
                    ))
                }
                Some(v) if v == self.venues.primary => {
                    return Err(ConfigError::invalid(
                        "venues.secondary",
                        format!("must differ from primary venue {}", v),
                    ))
                }
                Some(_) => {}
            }
        }

        if self.execution.poll_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "execution.poll_interval_secs",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            markets: default_markets(),
            enter_threshold_pct: default_enter_threshold_pct(),
            exit_threshold_pct: None,
            cooldown_seconds: default_cooldown_seconds(),
            notional_usd: default_notional_usd(),
            epsilon: default_epsilon(),
            cross_venue_enabled: false,
        }
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_venue(),
            secondary: default_secondary_venue(),
            binance_testnet: false,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            paper_mode: default_paper_mode(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}
