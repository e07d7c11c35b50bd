//! Parameter sweep runner for backtesting optimization.
//!
//! Runs one backtest per threshold/cooldown combination on a bounded set of
//! blocking tasks and ranks them by final cumulative P&L.

use crate::backtest::{BacktestSimulator, BacktestSummary, DataLoader};
use crate::config::StrategyConfig;
use crate::exchange::Venue;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Defines the parameter space to explore during optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub enter_threshold_pct: Vec<Decimal>,
    pub exit_threshold_pct: Vec<Decimal>,
    pub cooldown_seconds: Vec<u64>,
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self {
            enter_threshold_pct: vec![dec!(5), dec!(8), dec!(10), dec!(15), dec!(20)],
            exit_threshold_pct: vec![dec!(2), dec!(4), dec!(6), dec!(9)],
            cooldown_seconds: vec![0, 300, 3600],
        }
    }
}

impl ParameterSpace {
    /// Create a minimal parameter space for quick testing.
    pub fn minimal() -> Self {
        Self {
            enter_threshold_pct: vec![dec!(10)],
            exit_threshold_pct: vec![dec!(6)],
            cooldown_seconds: vec![300],
        }
    }

    /// Count total number of combinations, including invalid ones.
    pub fn combination_count(&self) -> usize {
        self.enter_threshold_pct.len() * self.exit_threshold_pct.len() * self.cooldown_seconds.len()
    }

    /// Generate every valid strategy combination (exit below enter).
    pub fn generate_configs(&self, base: &StrategyConfig) -> Vec<StrategyConfig> {
        let mut configs = Vec::with_capacity(self.combination_count());

        for &enter in &self.enter_threshold_pct {
            for &exit in &self.exit_threshold_pct {
                if exit >= enter {
                    continue;
                }
                for &cooldown in &self.cooldown_seconds {
                    configs.push(StrategyConfig {
                        enter_threshold_pct: enter,
                        exit_threshold_pct: Some(exit),
                        cooldown_seconds: cooldown,
                        ..base.clone()
                    });
                }
            }
        }

        configs
    }

    /// Describe a config's parameter values.
    pub fn describe_config(config: &StrategyConfig) -> String {
        format!(
            "enter≥{}% exit≤{}% cooldown={}s",
            config.enter_threshold_pct.normalize(),
            config.exit_threshold().normalize(),
            config.cooldown_seconds,
        )
    }
}

/// One finished sweep run.
#[derive(Debug, Clone, Serialize)]
pub struct SweepRun {
    pub strategy: StrategyConfig,
    pub summary: BacktestSummary,
}

/// Results from a parameter sweep, best first.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResults {
    /// Successful runs ranked by final cumulative P&L, descending
    pub runs: Vec<SweepRun>,
    /// Combinations generated (invalid exit/enter pairs excluded)
    pub total_combinations: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
}

impl SweepResults {
    /// Get the best run by final cumulative P&L.
    pub fn best(&self) -> Option<&SweepRun> {
        self.runs.first()
    }

    /// Ranked results as CSV.
    pub fn to_csv_string(&self) -> String {
        let mut out = String::from(
            "rank,enter_threshold_pct,exit_threshold_pct,cooldown_seconds,final_pnl,accrued,realized,max_drawdown,trades\n",
        );
        for (rank, run) in self.runs.iter().enumerate() {
            let s = &run.summary;
            out.push_str(&format!(
                "{},{},{},{},{:.6},{:.6},{:.6},{:.6},{}\n",
                rank + 1,
                run.strategy.enter_threshold_pct.normalize(),
                run.strategy.exit_threshold().normalize(),
                run.strategy.cooldown_seconds,
                s.final_cumulative_pnl,
                s.total_accrued,
                s.total_realized,
                s.max_drawdown,
                s.single_trades + s.cross_trades,
            ));
        }
        out
    }

    /// Export results to CSV.
    pub fn to_csv(&self, path: &str) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(self.to_csv_string().as_bytes())?;
        Ok(())
    }

    /// Generate a summary comparison table.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("═══════════════════════════════════════════════════════════════\n");
        s.push_str("PARAMETER SWEEP RESULTS\n");
        s.push_str("═══════════════════════════════════════════════════════════════\n");
        s.push_str(&format!(
            "Total: {} | Successful: {} | Failed: {}\n\n",
            self.total_combinations, self.successful_runs, self.failed_runs
        ));

        for (rank, run) in self.runs.iter().take(5).enumerate() {
            s.push_str(&format!(
                "#{} {}\n   P&L: ${:.2} | MaxDD: ${:.2} | Trades: {}\n",
                rank + 1,
                ParameterSpace::describe_config(&run.strategy),
                run.summary.final_cumulative_pnl,
                run.summary.max_drawdown,
                run.summary.single_trades + run.summary.cross_trades,
            ));
        }

        s.push_str("═══════════════════════════════════════════════════════════════\n");

        s
    }
}

/// Parameter sweep runner for parallel backtesting.
pub struct SweepRunner {
    parameter_space: ParameterSpace,
    base_strategy: StrategyConfig,
    primary_venue: Venue,
    secondary_venue: Option<Venue>,
    parallelism: usize,
}

impl SweepRunner {
    /// Create a new sweep runner.
    pub fn new(
        parameter_space: ParameterSpace,
        base_strategy: StrategyConfig,
        primary_venue: Venue,
        secondary_venue: Option<Venue>,
        parallelism: usize,
    ) -> Self {
        Self {
            parameter_space,
            base_strategy,
            primary_venue,
            secondary_venue,
            parallelism: parallelism.max(1),
        }
    }

    /// Run the parameter sweep.
    pub async fn run<D: DataLoader + Clone + 'static>(
        &self,
        data_loader: D,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<SweepResults> {
        let configs = self.parameter_space.generate_configs(&self.base_strategy);
        let total_combinations = configs.len();
        if total_combinations == 0 {
            anyhow::bail!("Parameter space has no combination with exit below enter");
        }

        info!(
            "Starting parameter sweep with {} combinations, parallelism={}",
            total_combinations, self.parallelism
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut handles = Vec::with_capacity(configs.len());

        for (i, strategy) in configs.into_iter().enumerate() {
            let sem = semaphore.clone();
            let loader = data_loader.clone();
            let primary = self.primary_venue;
            let secondary = self.secondary_venue;

            let handle = tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return None;
                };
                let label = ParameterSpace::describe_config(&strategy);

                let outcome = tokio::task::spawn_blocking(move || {
                    let simulator =
                        BacktestSimulator::new(loader, strategy.clone(), primary, secondary);
                    simulator.run(start, end).map(|result| SweepRun {
                        strategy,
                        summary: result.summary,
                    })
                })
                .await;

                match outcome {
                    Ok(Ok(run)) => {
                        info!(
                            "[{}/{}] {} -> P&L {:.2}",
                            i + 1,
                            total_combinations,
                            label,
                            run.summary.final_cumulative_pnl
                        );
                        Some(run)
                    }
                    Ok(Err(e)) => {
                        warn!("[{}/{}] {} failed: {:#}", i + 1, total_combinations, label, e);
                        None
                    }
                    Err(e) => {
                        warn!("[{}/{}] {} panicked: {}", i + 1, total_combinations, label, e);
                        None
                    }
                }
            });

            handles.push(handle);
        }

        // Collect results in generation order
        let mut runs = Vec::new();
        let mut failed_runs = 0;

        for handle in handles {
            match handle.await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => failed_runs += 1,
                Err(e) => {
                    warn!("Task panicked: {}", e);
                    failed_runs += 1;
                }
            }
        }

        // Stable, so equal P&L keeps generation order.
        runs.sort_by(|a, b| {
            b.summary
                .final_cumulative_pnl
                .cmp(&a.summary.final_cumulative_pnl)
        });

        Ok(SweepResults {
            successful_runs: runs.len(),
            runs,
            total_combinations,
            failed_runs,
        })
    }
}
