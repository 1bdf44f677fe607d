use crate::error::BacktestError;
use api_client::ExchangeClient;
use chrono::{DateTime, Duration, Utc};
use core_types::{interval_minutes, Kline};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Extra bars fetched before the requested start so the first simulated bar
/// already has a full indicator lookback window.
const WARMUP_BARS: i64 = 200;

/// Range-aware on-disk cache of OHLCV bars, one CSV file per
/// (symbol, interval), shared across backtest runs.
///
/// Writers never touch the live file directly: the merged range is written
/// to a temp sibling and atomically renamed over it, so concurrent readers
/// from overlapping runs always see a complete file.
pub struct KlineCache {
    dir: PathBuf,
}

impl KlineCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, BacktestError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn cache_path(&self, symbol: &str, interval: &str) -> PathBuf {
        self.dir.join(format!("{symbol}_{interval}.csv"))
    }

    /// Ensures the cache covers `[start - warmup, end]`, fetching only the
    /// uncovered portion, and returns the covering bar sequence.
    ///
    /// Overlap handling: full containment fetches nothing; partial overlap
    /// fetches only the missing prefix/suffix; a disjoint request fetches
    /// the full buffered range. Merging deduplicates by open timestamp with
    /// the later-fetched bar winning, and always persists ascending.
    pub async fn ensure_coverage(
        &self,
        client: &dyn ExchangeClient,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, BacktestError> {
        let minutes = interval_minutes(interval)
            .ok_or_else(|| BacktestError::Cache(format!("unparseable interval: {interval}")))?;
        let bar = Duration::minutes(minutes);
        let buffered_start = start - bar * WARMUP_BARS as i32;

        let cached = self.load(symbol, interval);
        let mut merged: BTreeMap<i64, Kline> = cached
            .iter()
            .map(|k| (k.open_time.timestamp_millis(), k.clone()))
            .collect();

        let fetch_ranges = coverage_gaps(&cached, buffered_start, end, bar);
        let mut fetched_any = false;
        for (range_start, range_end) in fetch_ranges {
            tracing::info!(
                symbol,
                interval,
                from = %range_start,
                to = %range_end,
                "cache gap, fetching from the historical data source"
            );
            let fresh = client
                .get_historical_klines(symbol, interval, range_start, range_end)
                .await?;
            for kline in fresh {
                // Later-fetched bars win on timestamp conflicts.
                merged.insert(kline.open_time.timestamp_millis(), kline);
            }
            fetched_any = true;
        }

        if fetched_any {
            self.persist(symbol, interval, merged.values())?;
        } else {
            tracing::debug!(symbol, interval, "cache hit, range fully covered");
        }

        Ok(merged
            .into_values()
            .filter(|k| k.open_time >= buffered_start && k.open_time <= end)
            .collect())
    }

    /// Loads the cached range. A corrupted or partial file is treated as a
    /// cache miss for the whole range, never as fatal.
    fn load(&self, symbol: &str, interval: &str) -> Vec<Kline> {
        let path = self.cache_path(symbol, interval);
        if !path.exists() {
            return Vec::new();
        }

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable cache file, refetching");
                return Vec::new();
            }
        };

        let mut reader = csv::Reader::from_reader(file);
        let mut klines = Vec::new();
        for row in reader.deserialize::<Kline>() {
            match row {
                Ok(kline) => klines.push(kline),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "corrupted cache file, treating the whole range as a miss"
                    );
                    return Vec::new();
                }
            }
        }
        klines.sort_by_key(|k| k.open_time);
        klines
    }

    /// Copy-then-atomic-replace persist of the merged range.
    fn persist<'a>(
        &self,
        symbol: &str,
        interval: &str,
        klines: impl Iterator<Item = &'a Kline>,
    ) -> Result<(), BacktestError> {
        let path = self.cache_path(symbol, interval);
        let tmp = path.with_extension("csv.tmp");

        let mut writer = csv::Writer::from_writer(File::create(&tmp)?);
        for kline in klines {
            writer
                .serialize(kline)
                .map_err(|e| BacktestError::Cache(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| BacktestError::Cache(e.to_string()))?;
        drop(writer);

        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// The sub-ranges of `[buffered_start, end]` the cache does not yet cover.
fn coverage_gaps(
    cached: &[Kline],
    buffered_start: DateTime<Utc>,
    end: DateTime<Utc>,
    bar: Duration,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let (Some(first), Some(last)) = (cached.first(), cached.last()) else {
        return vec![(buffered_start, end)];
    };

    let covered_start = first.open_time;
    let covered_end = last.open_time;

    // Disjoint: the request misses the cached range entirely.
    if end < covered_start - bar || buffered_start > covered_end + bar {
        return vec![(buffered_start, end)];
    }

    let mut gaps = Vec::new();
    if buffered_start < covered_start {
        gaps.push((buffered_start, covered_start));
    }
    if end > covered_end {
        gaps.push((covered_end, end));
    }
    gaps
}
