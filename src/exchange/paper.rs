//! Paper execution adapter.
//!
//! Acknowledges every open/close without touching the network so the state
//! machine transitions exactly as it would against a live venue.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::traits::ExecutionAdapter;
use super::types::{ExecutionAck, Leg};
use crate::error::ExecutionError;

/// Simulated fills, counted for status reporting.
#[derive(Debug, Default)]
pub struct PaperExecutionAdapter {
    order_id_counter: AtomicU64,
    opens: AtomicU64,
    closes: AtomicU64,
}

impl PaperExecutionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of simulated opens so far.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of simulated closes so far.
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    fn next_ack(&self, market: &str) -> ExecutionAck {
        ExecutionAck {
            order_id: self.order_id_counter.fetch_add(1, Ordering::SeqCst) + 1,
            market: market.to_string(),
            simulated: true,
        }
    }
}

#[async_trait]
impl ExecutionAdapter for PaperExecutionAdapter {
    async fn open_position(
        &self,
        market: &str,
        leg: Leg,
        notional_usd: Decimal,
    ) -> Result<ExecutionAck, ExecutionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let ack = self.next_ack(market);
        info!(
            %market,
            %leg,
            notional = %notional_usd,
            order_id = ack.order_id,
            "[PAPER] open"
        );
        Ok(ack)
    }

    async fn close_position(
        &self,
        market: &str,
        leg: Leg,
    ) -> Result<ExecutionAck, ExecutionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let ack = self.next_ack(market);
        info!(%market, %leg, order_id = ack.order_id, "[PAPER] close");
        Ok(ack)
    }
}
