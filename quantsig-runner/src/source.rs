//! Price history sources.
//!
//! A [`PriceHistorySource`] hands the engine a sorted bar series for one
//! symbol and interval. Two implementations ship here:
//! - [`CsvSource`]: one CSV file per symbol under a root directory
//! - [`SyntheticSource`]: deterministic random walk for demos and tests

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use quantsig_core::domain::{check_ordering, Bar, BarError};
use quantsig_core::rng::RngHierarchy;
use quantsig_core::synthetic::random_walk;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no price history for {symbol} ({interval}) under {}", root.display())]
    NotFound {
        symbol: String,
        interval: Interval,
        root: PathBuf,
    },
    #[error("{}: row {row}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        row: usize,
        reason: String,
    },
    #[error("unknown interval: {0}")]
    UnknownInterval(String),
    #[error("invalid bar series for {symbol}: {source}")]
    Bars {
        symbol: String,
        #[source]
        source: BarError,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bar interval of a price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "1h")]
    Hour1,
    #[default]
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1wk")]
    Week1,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Hour1 => "1h",
            Interval::Day1 => "1d",
            Interval::Week1 => "1wk",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Interval::Minute1),
            "5m" => Ok(Interval::Minute5),
            "15m" => Ok(Interval::Minute15),
            "1h" | "60m" => Ok(Interval::Hour1),
            "1d" | "d" | "daily" => Ok(Interval::Day1),
            "1wk" | "1w" | "weekly" => Ok(Interval::Week1),
            other => Err(SourceError::UnknownInterval(other.to_string())),
        }
    }
}

/// Supplies bars for a symbol; the result is sorted and free of duplicates.
pub trait PriceHistorySource: Send + Sync {
    fn fetch(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, SourceError>;
}

// ─── CSV ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(
        alias = "Date",
        alias = "date",
        alias = "Datetime",
        alias = "datetime",
        alias = "Timestamp"
    )]
    timestamp: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume", default)]
    volume: f64,
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Reads `<root>/<SYMBOL>_<interval>.csv`, falling back to `<root>/<SYMBOL>.csv`.
///
/// Expected header: `timestamp` (or `Date`), `open`, `high`, `low`, `close`,
/// `volume`. Rows are sorted, duplicate timestamps keep the last row, and
/// bars with inconsistent OHLC values are dropped with a warning.
#[derive(Debug, Clone)]
pub struct CsvSource {
    root: PathBuf,
}

impl CsvSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, symbol: &str, interval: Interval) -> Option<PathBuf> {
        let symbol = symbol.to_ascii_uppercase();
        [
            self.root.join(format!("{symbol}_{interval}.csv")),
            self.root.join(format!("{symbol}.csv")),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    pub fn read_file(path: &Path) -> Result<Vec<Bar>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(File::open(path)?);

        let mut bars = Vec::new();
        for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row?;
            let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| SourceError::Parse {
                path: path.to_path_buf(),
                row: i + 1,
                reason: format!("unrecognised timestamp {:?}", row.timestamp),
            })?;
            bars.push(Bar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }
        Ok(bars)
    }
}

/// Sort by timestamp, keep the last of duplicates, drop insane bars.
fn clean(symbol: &str, mut bars: Vec<Bar>) -> Result<Vec<Bar>, SourceError> {
    bars.sort_by_key(|b| b.timestamp);
    let mut cleaned: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        if !bar.is_sane() {
            warn!(symbol, timestamp = %bar.timestamp, "dropping inconsistent bar");
            continue;
        }
        match cleaned.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => cleaned.push(bar),
        }
    }
    check_ordering(&cleaned).map_err(|source| SourceError::Bars {
        symbol: symbol.to_string(),
        source,
    })?;
    Ok(cleaned)
}

impl PriceHistorySource for CsvSource {
    fn fetch(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, SourceError> {
        let path = self.resolve(symbol, interval).ok_or_else(|| SourceError::NotFound {
            symbol: symbol.to_string(),
            interval,
            root: self.root.clone(),
        })?;
        let bars = clean(symbol, Self::read_file(&path)?)?;
        debug!(symbol, path = %path.display(), bars = bars.len(), "loaded price history");
        Ok(bars)
    }
}

// ─── Synthetic ───────────────────────────────────────────────────────

/// Random-walk bars seeded per symbol from a master seed.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    bars: usize,
}

impl SyntheticSource {
    pub fn new(seed: u64, bars: usize) -> Self {
        Self { seed, bars }
    }
}

impl PriceHistorySource for SyntheticSource {
    fn fetch(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, SourceError> {
        let seed = RngHierarchy::new(self.seed).sub_seed(interval.as_str(), symbol, 0);
        Ok(random_walk(self.bars, seed))
    }
}
