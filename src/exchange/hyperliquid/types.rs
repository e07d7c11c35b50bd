//! Type definitions for Hyperliquid API responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request type for Hyperliquid info endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InfoRequest {
    /// Get metadata and asset contexts (funding rates, prices).
    #[serde(rename = "metaAndAssetCtxs")]
    MetaAndAssetCtxs,

    /// Get funding rate history.
    #[serde(rename = "fundingHistory")]
    FundingHistory {
        coin: String,
        #[serde(rename = "startTime")]
        start_time: i64,
        #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
        end_time: Option<i64>,
    },
}

/// Response from metaAndAssetCtxs endpoint.
/// Returns a tuple of (Meta, Vec<AssetCtx>).
pub type MetaAndAssetCtxsResponse = (Meta, Vec<AssetCtx>);

/// Universe metadata for perpetuals.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

/// Metadata for a single asset in the universe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    /// Asset name (e.g., "BTC", "ETH")
    pub name: String,
    /// Size decimal precision
    pub sz_decimals: u8,
}

/// Real-time context for an asset. Only the fields the carry engine reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    /// Current funding rate (hourly fraction, as decimal string)
    pub funding: String,
    /// Mark price
    #[serde(default)]
    pub mark_px: Option<String>,
}

/// Historical funding rate record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingHistoryRecord {
    /// Asset symbol
    pub coin: String,
    /// Hourly funding rate fraction, as decimal string
    pub funding_rate: String,
    /// Timestamp in milliseconds
    pub time: i64,
}

/// Asset name paired with its parsed hourly funding fraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperliquidFunding {
    pub name: String,
    pub funding_rate: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_asset_ctx() {
        let json = r#"{
            "funding": "0.00001234",
            "openInterest": "1234567.89",
            "prevDayPx": "50000.0",
            "dayNtlVlm": "999999999.0",
            "premium": "0.0001",
            "oraclePx": "50000.0",
            "markPx": "50005.0",
            "midPx": "50002.5"
        }"#;

        let ctx: AssetCtx = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.funding, "0.00001234");
        assert_eq!(ctx.mark_px.as_deref(), Some("50005.0"));
    }

    #[test]
    fn test_info_request_serialization() {
        let req = InfoRequest::MetaAndAssetCtxs;
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"metaAndAssetCtxs"}"#);

        let req = InfoRequest::FundingHistory {
            coin: "BTC".to_string(),
            start_time: 1234567890000,
            end_time: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"fundingHistory""#));
        assert!(json.contains(r#""coin":"BTC""#));
        assert!(!json.contains("endTime"));
    }
}
