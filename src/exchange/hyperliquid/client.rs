//! Hyperliquid REST API client.
//!
//! Provides read-only access to Hyperliquid perpetuals funding data:
//! - Current hourly funding per asset
//! - Historical (settled) funding

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::*;
use crate::error::FeedError;
use crate::exchange::{FundingFeed, FundingSnapshot, Venue};
use crate::utils::parse_rate;

/// Base URL for Hyperliquid mainnet API.
const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";

/// Maximum rows returned by one `fundingHistory` request.
const HISTORY_PAGE_LIMIT: usize = 500;

/// Hyperliquid API client for fetching funding data.
#[derive(Debug, Clone)]
pub struct HyperliquidClient {
    client: Client,
    base_url: String,
}

impl HyperliquidClient {
    /// Create a new Hyperliquid client for mainnet.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(MAINNET_API_URL)
    }

    /// Create a new Hyperliquid client with a custom base URL.
    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST an info request and decode the JSON body.
    async fn post_info<T: DeserializeOwned>(
        &self,
        market: &str,
        request: &InfoRequest,
    ) -> Result<T, FeedError> {
        let url = format!("{}/info", self.base_url);
        let request_err = |source| FeedError::Request {
            venue: Venue::Hyperliquid,
            market: market.to_string(),
            source,
        };

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(request_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                venue: Venue::Hyperliquid,
                market: market.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(request_err)
    }

    /// Get current hourly funding fractions for every listed perpetual.
    #[instrument(skip(self), name = "hl_get_funding")]
    pub async fn get_funding(&self, market: &str) -> Result<Vec<HyperliquidFunding>, FeedError> {
        let (meta, ctxs): MetaAndAssetCtxsResponse =
            self.post_info(market, &InfoRequest::MetaAndAssetCtxs).await?;

        if meta.universe.len() != ctxs.len() {
            return Err(FeedError::InvalidData {
                venue: Venue::Hyperliquid,
                market: market.to_string(),
                reason: format!(
                    "universe has {} assets but {} contexts",
                    meta.universe.len(),
                    ctxs.len()
                ),
            });
        }

        let mut out = Vec::with_capacity(ctxs.len());
        for (asset, ctx) in meta.universe.into_iter().zip(ctxs) {
            // Other assets with garbage rates must not poison the requested one.
            if let Ok(rate) = parse_rate(&ctx.funding) {
                out.push(HyperliquidFunding {
                    name: asset.name,
                    funding_rate: rate,
                });
            } else if asset.name == market {
                return Err(FeedError::InvalidData {
                    venue: Venue::Hyperliquid,
                    market: market.to_string(),
                    reason: format!("unparsable funding '{}'", ctx.funding),
                });
            }
        }

        debug!("Fetched {} funding rates from Hyperliquid", out.len());
        Ok(out)
    }

    /// Get funding history for a specific coin, following pages until a
    /// short page comes back or `end_time` is reached.
    #[instrument(skip(self), name = "hl_get_funding_history")]
    pub async fn get_funding_history(
        &self,
        coin: &str,
        start_time: i64,
        end_time: Option<i64>,
    ) -> Result<Vec<FundingHistoryRecord>, FeedError> {
        let mut records: Vec<FundingHistoryRecord> = Vec::new();
        let mut cursor = start_time;

        loop {
            let request = InfoRequest::FundingHistory {
                coin: coin.to_string(),
                start_time: cursor,
                end_time,
            };
            let page: Vec<FundingHistoryRecord> = self.post_info(coin, &request).await?;

            let page_len = page.len();
            let last_time = page.iter().map(|r| r.time).max();
            records.extend(page);

            let full_page = page_len >= HISTORY_PAGE_LIMIT;
            match last_time {
                Some(t) if full_page && end_time.map_or(true, |e| t < e) => cursor = t + 1,
                _ => break,
            }
        }

        debug!(
            "Fetched {} funding history records for {}",
            records.len(),
            coin
        );
        Ok(records)
    }
}

/// Hourly fraction to hourly percent.
fn to_hourly_pct(rate: Decimal) -> Decimal {
    rate * dec!(100)
}

#[async_trait]
impl FundingFeed for HyperliquidClient {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    async fn fetch_funding(&self, market: &str) -> Result<FundingSnapshot, FeedError> {
        let rates = self.get_funding(market).await?;

        let entry = rates
            .into_iter()
            .find(|f| f.name == market)
            .ok_or_else(|| FeedError::UnknownMarket {
                venue: Venue::Hyperliquid,
                market: market.to_string(),
            })?;

        Ok(FundingSnapshot::from_hourly_pct(
            Venue::Hyperliquid,
            market,
            to_hourly_pct(entry.funding_rate),
            Utc::now(),
        ))
    }

    async fn fetch_history(
        &self,
        market: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FundingSnapshot>, FeedError> {
        let records = self
            .get_funding_history(market, start.timestamp_millis(), Some(end.timestamp_millis()))
            .await?;

        let mut snapshots = Vec::with_capacity(records.len());
        for record in records {
            let invalid = |reason: String| FeedError::InvalidData {
                venue: Venue::Hyperliquid,
                market: market.to_string(),
                reason,
            };
            let rate = parse_rate(&record.funding_rate).map_err(invalid)?;
            let timestamp = Utc
                .timestamp_millis_opt(record.time)
                .single()
                .ok_or_else(|| invalid(format!("bad timestamp {}", record.time)))?;

            snapshots.push(FundingSnapshot::from_hourly_pct(
                Venue::Hyperliquid,
                market,
                to_hourly_pct(rate),
                timestamp,
            ));
        }

        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }
}
