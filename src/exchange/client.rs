//! Binance USDⓈ-M futures funding client (public endpoints only).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::FeedError;
use crate::exchange::{FundingFeed, FundingSnapshot, Venue};
use crate::utils::parse_rate;

const FUTURES_BASE_URL: &str = "https://fapi.binance.com";
const FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Binance funding settles every 8 hours.
const FUNDING_PERIOD_HOURS: Decimal = dec!(8);

/// Maximum rows the fundingRate endpoint returns per request.
const HISTORY_PAGE_LIMIT: usize = 1000;

/// Current funding for a perpetual contract (`/fapi/v1/premiumIndex`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndex {
    pub symbol: String,
    pub last_funding_rate: String,
    pub time: i64,
}

/// One settled funding payment (`/fapi/v1/fundingRate`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateRecord {
    pub symbol: String,
    pub funding_rate: String,
    pub funding_time: i64,
}

/// Binance API client for perpetual funding data.
pub struct BinanceClient {
    http: Client,
    futures_base_url: String,
}

impl BinanceClient {
    /// Create a new Binance client.
    pub fn new(testnet: bool) -> anyhow::Result<Self> {
        let base = if testnet {
            FUTURES_TESTNET_URL
        } else {
            FUTURES_BASE_URL
        };
        Self::with_base_url(base)
    }

    /// Create a client against a custom base URL.
    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http,
            futures_base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Binance symbol for a base-asset market (`SOL` -> `SOLUSDT`).
    pub fn symbol_for(market: &str) -> String {
        if market.ends_with("USDT") {
            market.to_string()
        } else {
            format!("{}USDT", market)
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        market: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let url = format!("{}{}", self.futures_base_url, path);
        let request_err = |source| FeedError::Request {
            venue: Venue::Binance,
            market: market.to_string(),
            source,
        };

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(request_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // -1121 is "Invalid symbol."
            if status.as_u16() == 400 && body.contains("-1121") {
                return Err(FeedError::UnknownMarket {
                    venue: Venue::Binance,
                    market: market.to_string(),
                });
            }
            return Err(FeedError::Api {
                venue: Venue::Binance,
                market: market.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(request_err)
    }

    /// Get the latest funding rate for one market.
    #[instrument(skip(self))]
    pub async fn get_premium_index(&self, market: &str) -> Result<PremiumIndex, FeedError> {
        let symbol = Self::symbol_for(market);
        self.get_json(market, "/fapi/v1/premiumIndex", &[("symbol", symbol)])
            .await
    }

    /// Get settled funding rates for one market, paging forward from `start_ms`.
    #[instrument(skip(self))]
    pub async fn get_funding_rate_history(
        &self,
        market: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<FundingRateRecord>, FeedError> {
        let symbol = Self::symbol_for(market);
        let mut records: Vec<FundingRateRecord> = Vec::new();
        let mut cursor = start_ms;

        loop {
            let page: Vec<FundingRateRecord> = self
                .get_json(
                    market,
                    "/fapi/v1/fundingRate",
                    &[
                        ("symbol", symbol.clone()),
                        ("startTime", cursor.to_string()),
                        ("endTime", end_ms.to_string()),
                        ("limit", HISTORY_PAGE_LIMIT.to_string()),
                    ],
                )
                .await?;

            let page_len = page.len();
            let last_time = page.last().map(|r| r.funding_time);
            records.extend(page);

            match last_time {
                Some(t) if page_len == HISTORY_PAGE_LIMIT && t < end_ms => cursor = t + 1,
                _ => break,
            }
        }

        debug!("Fetched {} Binance funding records for {}", records.len(), symbol);
        Ok(records)
    }
}

/// 8h fraction to hourly percent.
fn to_hourly_pct(rate_8h: Decimal) -> Decimal {
    rate_8h * dec!(100) / FUNDING_PERIOD_HOURS
}

fn timestamp_from_ms(market: &str, ms: i64) -> Result<DateTime<Utc>, FeedError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| FeedError::InvalidData {
            venue: Venue::Binance,
            market: market.to_string(),
            reason: format!("bad timestamp {}", ms),
        })
}

#[async_trait]
impl FundingFeed for BinanceClient {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    async fn fetch_funding(&self, market: &str) -> Result<FundingSnapshot, FeedError> {
        let index = self.get_premium_index(market).await?;
        let rate = parse_rate(&index.last_funding_rate).map_err(|reason| {
            FeedError::InvalidData {
                venue: Venue::Binance,
                market: market.to_string(),
                reason,
            }
        })?;

        Ok(FundingSnapshot::from_hourly_pct(
            Venue::Binance,
            market,
            to_hourly_pct(rate),
            timestamp_from_ms(market, index.time)?,
        ))
    }

    async fn fetch_history(
        &self,
        market: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FundingSnapshot>, FeedError> {
        let records = self
            .get_funding_rate_history(market, start.timestamp_millis(), end.timestamp_millis())
            .await?;

        let mut snapshots = Vec::with_capacity(records.len());
        for record in records {
            let rate = parse_rate(&record.funding_rate).map_err(|reason| {
                FeedError::InvalidData {
                    venue: Venue::Binance,
                    market: market.to_string(),
                    reason,
                }
            })?;
            snapshots.push(FundingSnapshot::from_hourly_pct(
                Venue::Binance,
                market,
                to_hourly_pct(rate),
                timestamp_from_ms(market, record.funding_time)?,
            ));
        }

        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(BinanceClient::symbol_for("SOL"), "SOLUSDT");
        assert_eq!(BinanceClient::symbol_for("BTCUSDT"), "BTCUSDT");
    }

    #[tokio::test]
    async fn test_fetch_funding_normalises_8h_rate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/premiumIndex"))
            .and(query_param("symbol", "SOLUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbol": "SOLUSDT",
                "markPrice": "150.10",
                "lastFundingRate": "0.00016000",
                "nextFundingTime": 1704096000000_i64,
                "time": 1704088800000_i64
            })))
            .mount(&server)
            .await;

        let client = BinanceClient::with_base_url(&server.uri()).unwrap();
        let snap = client.fetch_funding("SOL").await.unwrap();

        assert_eq!(snap.venue, Venue::Binance);
        assert_eq!(snap.market, "SOL");
        assert_eq!(snap.hourly_pct, dec!(0.002));
        assert_eq!(snap.timestamp.timestamp_millis(), 1704088800000);
    }

    #[tokio::test]
    async fn test_invalid_symbol_maps_to_unknown_market() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/premiumIndex"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"code":-1121,"msg":"Invalid symbol."}"#),
            )
            .mount(&server)
            .await;

        let client = BinanceClient::with_base_url(&server.uri()).unwrap();
        let err = client.fetch_funding("NOPE").await.unwrap_err();

        assert!(matches!(err, FeedError::UnknownMarket { .. }));
    }

    #[tokio::test]
    async fn test_fetch_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/fundingRate"))
            .and(query_param("symbol", "ETHUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "ETHUSDT", "fundingTime": 1704067200000_i64, "fundingRate": "0.00010000", "markPrice": "2300"},
                {"symbol": "ETHUSDT", "fundingTime": 1704096000000_i64, "fundingRate": "-0.00008000", "markPrice": "2310"}
            ])))
            .mount(&server)
            .await;

        let client = BinanceClient::with_base_url(&server.uri()).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let history = client.fetch_history("ETH", start, end).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].hourly_pct, dec!(0.00125));
        assert_eq!(history[1].hourly_pct, dec!(-0.001));
    }
}
