//! Historical funding data for backtesting.
//!
//! Provides CSV import/export and collection from a live [`FundingFeed`].

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::exchange::{FundingFeed, FundingSnapshot, Venue};
use crate::utils::parse_rate;

/// Header of the funding-history CSV.
pub const CSV_HEADER: &str = "timestamp,venue,market,hourly_pct";

/// Trait for loading historical funding observations.
pub trait DataLoader: Send + Sync {
    /// Observations for one venue and market in `[start, end]`, oldest first.
    fn load_series(
        &self,
        venue: Venue,
        market: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FundingSnapshot>>;

    /// Get the available date range in the data.
    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)>;

    /// Get all markets present in the data, sorted.
    fn available_markets(&self) -> Vec<String>;
}

/// CSV data loader for historical backtesting.
///
/// Expected CSV format:
/// ```csv
/// timestamp,venue,market,hourly_pct
/// 2024-01-01T00:00:00Z,hyperliquid,SOL,0.0012
/// 2024-01-01T00:00:00Z,binance,SOL,-0.0008
/// ```
#[derive(Debug, Clone)]
pub struct CsvDataLoader {
    /// All observations, sorted by timestamp
    snapshots: Vec<FundingSnapshot>,
    markets: Vec<String>,
}

impl CsvDataLoader {
    /// Load data from a CSV file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

        Self::from_csv_content(&content)
    }

    /// Load data from CSV content string.
    pub fn from_csv_content(content: &str) -> Result<Self> {
        let mut snapshots = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            if line_num == 0 && line.trim_start().starts_with("timestamp") {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            let snapshot = parse_row(line)
                .with_context(|| format!("Failed to parse line {}: {}", line_num + 1, line))?;
            snapshots.push(snapshot);
        }

        if snapshots.is_empty() {
            anyhow::bail!("CSV file contains no data rows");
        }

        Ok(Self::from_snapshots(snapshots))
    }

    /// Create a loader from in-memory observations.
    pub fn from_snapshots(mut snapshots: Vec<FundingSnapshot>) -> Self {
        snapshots.sort_by_key(|s| s.timestamp);

        let markets: BTreeSet<String> = snapshots.iter().map(|s| s.market.clone()).collect();

        Self {
            snapshots,
            markets: markets.into_iter().collect(),
        }
    }

    /// Get total number of observations.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the loader has no data.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl DataLoader for CsvDataLoader {
    fn load_series(
        &self,
        venue: Venue,
        market: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FundingSnapshot>> {
        Ok(self
            .snapshots
            .iter()
            .filter(|s| s.venue == venue && s.market == market)
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .cloned()
            .collect())
    }

    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.snapshots.first()?;
        let last = self.snapshots.last()?;
        Some((first.timestamp, last.timestamp))
    }

    fn available_markets(&self) -> Vec<String> {
        self.markets.clone()
    }
}

fn parse_row(line: &str) -> Result<FundingSnapshot> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 4 {
        anyhow::bail!(
            "Expected 4 columns (timestamp,venue,market,hourly_pct), got {}",
            parts.len()
        );
    }

    let timestamp: DateTime<Utc> = parts[0]
        .parse()
        .with_context(|| format!("Invalid timestamp: {}", parts[0]))?;
    let venue: Venue = parts[1]
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .with_context(|| format!("Invalid venue: {}", parts[1]))?;
    let market = parts[2];
    if market.is_empty() {
        anyhow::bail!("Empty market");
    }
    let hourly_pct = parse_rate(parts[3])
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Invalid hourly_pct: {}", parts[3]))?;

    Ok(FundingSnapshot::from_hourly_pct(venue, market, hourly_pct, timestamp))
}

/// Render observations in the loader's CSV format, header included.
pub fn snapshots_to_csv(snapshots: &[FundingSnapshot]) -> String {
    let mut out = String::with_capacity(32 * (snapshots.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');

    for s in snapshots {
        out.push_str(&format!(
            "{},{},{},{}\n",
            s.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            s.venue.to_string().to_lowercase(),
            s.market,
            s.hourly_pct.normalize(),
        ));
    }
    out
}

/// Pull settled funding history for one market from a live feed.
pub async fn collect_history(
    feed: &dyn FundingFeed,
    market: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<FundingSnapshot>> {
    let venue = feed.venue();
    info!(%venue, %market, %start, %end, "Collecting funding history");

    let snapshots = feed
        .fetch_history(market, start, end)
        .await
        .with_context(|| format!("Failed to fetch {} history for {}", venue, market))?;

    info!(%venue, %market, points = snapshots.len(), "Collected funding history");
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockFundingFeed;
    use chrono::{Datelike, TimeZone};
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "timestamp,venue,market,hourly_pct
2024-01-01T00:00:00Z,hyperliquid,SOL,0.0012
2024-01-01T00:00:00Z,binance,SOL,-0.0008

2024-01-01T01:00:00Z,hyperliquid,SOL,1.5e-3
2024-01-01T01:00:00Z,hyperliquid,ETH,0.0001
";

    #[test]
    fn test_csv_parsing() {
        let loader = CsvDataLoader::from_csv_content(SAMPLE).unwrap();

        assert_eq!(loader.len(), 4);
        assert_eq!(loader.available_markets(), vec!["ETH", "SOL"]);

        let range = loader.available_range().unwrap();
        assert_eq!(range.0, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(range.1, Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_load_series_filters_venue_and_market() {
        let loader = CsvDataLoader::from_csv_content(SAMPLE).unwrap();
        let (start, end) = loader.available_range().unwrap();

        let hl = loader.load_series(Venue::Hyperliquid, "SOL", start, end).unwrap();
        assert_eq!(hl.len(), 2);
        assert_eq!(hl[1].hourly_pct, dec!(0.0015));
        assert_eq!(hl[0].apr_pct, dec!(10.512));

        let bn = loader.load_series(Venue::Binance, "SOL", start, end).unwrap();
        assert_eq!(bn.len(), 1);
        assert_eq!(bn[0].hourly_pct, dec!(-0.0008));
    }

    #[test]
    fn test_filter_by_date_range() {
        let csv = "timestamp,venue,market,hourly_pct
2024-01-01T00:00:00Z,hl,SOL,0.001
2024-01-02T00:00:00Z,hl,SOL,0.001
2024-01-03T00:00:00Z,hl,SOL,0.001
";
        let loader = CsvDataLoader::from_csv_content(csv).unwrap();

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();

        let filtered = loader.load_series(Venue::Hyperliquid, "SOL", start, end).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].timestamp.day(), 2);
    }

    #[test]
    fn test_malformed_rows_report_line() {
        let bad_rate = "timestamp,venue,market,hourly_pct\n2024-01-01T00:00:00Z,hl,SOL,abc\n";
        let err = CsvDataLoader::from_csv_content(bad_rate).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));

        let bad_venue = "2024-01-01T00:00:00Z,mango,SOL,0.001\n";
        assert!(CsvDataLoader::from_csv_content(bad_venue).is_err());

        let short = "2024-01-01T00:00:00Z,hl,SOL\n";
        assert!(CsvDataLoader::from_csv_content(short).is_err());

        assert!(CsvDataLoader::from_csv_content("timestamp,venue,market,hourly_pct\n").is_err());
    }

    #[test]
    fn test_snapshots_to_csv_reloads() {
        let loader = CsvDataLoader::from_csv_content(SAMPLE).unwrap();
        let (start, end) = loader.available_range().unwrap();
        let series = loader.load_series(Venue::Hyperliquid, "SOL", start, end).unwrap();

        let csv = snapshots_to_csv(&series);
        assert!(csv.starts_with(CSV_HEADER));
        assert!(csv.contains("2024-01-01T01:00:00Z,hyperliquid,SOL,0.0015\n"));

        let reloaded = CsvDataLoader::from_csv_content(&csv).unwrap();
        assert_eq!(
            reloaded.load_series(Venue::Hyperliquid, "SOL", start, end).unwrap(),
            series
        );
    }

    #[tokio::test]
    async fn test_collect_history_from_feed() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut feed = MockFundingFeed::new();
        feed.expect_venue().return_const(Venue::Binance);
        feed.expect_fetch_history()
            .times(1)
            .returning(move |market, start, _| {
                Ok(vec![FundingSnapshot::from_hourly_pct(
                    Venue::Binance,
                    market,
                    dec!(0.00125),
                    start,
                )])
            });

        let history = collect_history(&feed, "SOL", t0, t0 + chrono::Duration::days(1))
            .await
            .unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, t0);
        assert_eq!(history[0].venue, Venue::Binance);
    }
}
