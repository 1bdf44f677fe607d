use crate::indicators::{atr, ema, rsi, swing_markers, SWING_WING};
use chrono::{DateTime, Utc};
use core_types::Kline;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The bar sequence for one timeframe plus its derived indicator columns,
/// all aligned index-for-index with `klines`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeSeries {
    pub interval: String,
    pub klines: Vec<Kline>,
    pub ema: Vec<Option<Decimal>>,
    pub rsi: Vec<Option<Decimal>>,
    pub atr: Vec<Option<Decimal>>,
    pub swing_highs: Vec<bool>,
    pub swing_lows: Vec<bool>,
}

impl TimeframeSeries {
    /// Builds the series and computes every indicator column once.
    pub fn from_klines(
        interval: &str,
        klines: Vec<Kline>,
        ma_period: usize,
        rsi_period: usize,
    ) -> Self {
        let closes: Vec<Decimal> = klines.iter().map(|k| k.close).collect();
        let ema = ema(&closes, ma_period);
        let rsi = rsi(&closes, rsi_period);
        let atr = atr(&klines, rsi_period);
        let (swing_highs, swing_lows) = swing_markers(&klines);

        Self {
            interval: interval.to_string(),
            klines,
            ema,
            rsi,
            atr,
            swing_highs,
            swing_lows,
        }
    }

    pub fn last_kline(&self) -> Option<&Kline> {
        self.klines.last()
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.klines.last().map(|k| k.close)
    }

    pub fn last_ema(&self) -> Option<Decimal> {
        self.ema.last().copied().flatten()
    }

    pub fn last_rsi(&self) -> Option<Decimal> {
        self.rsi.last().copied().flatten()
    }

    /// The RSI one bar before the latest, for midline-flip detection.
    pub fn prev_rsi(&self) -> Option<Decimal> {
        let n = self.rsi.len();
        if n < 2 {
            return None;
        }
        self.rsi[n - 2]
    }

    /// The most recently confirmed swing high within `lookback` bars.
    pub fn last_swing_high(&self, lookback: usize) -> Option<Decimal> {
        self.last_swing(&self.swing_highs, lookback)
            .map(|i| self.klines[i].high)
    }

    /// The most recently confirmed swing low within `lookback` bars.
    pub fn last_swing_low(&self, lookback: usize) -> Option<Decimal> {
        self.last_swing(&self.swing_lows, lookback)
            .map(|i| self.klines[i].low)
    }

    fn last_swing(&self, markers: &[bool], lookback: usize) -> Option<usize> {
        let n = markers.len();
        // The trailing wing is never confirmed, so start before it.
        let confirmed_end = n.saturating_sub(SWING_WING);
        let window_start = confirmed_end.saturating_sub(lookback);
        (window_start..confirmed_end).rev().find(|&i| markers[i])
    }
}

/// One symbol's complete market view for a single iteration: three
/// timeframes of bars-plus-indicators and the derivative metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub execution: TimeframeSeries,
    pub structure: TimeframeSeries,
    pub trend: TimeframeSeries,
    pub funding_rate: Option<Decimal>,
    pub open_interest: Option<Decimal>,
}

impl MarketSnapshot {
    /// The current bar on the execution timeframe.
    pub fn current_bar(&self) -> Option<&Kline> {
        self.execution.last_kline()
    }

    /// The latest traded price: the execution timeframe's last close.
    pub fn price(&self) -> Option<Decimal> {
        self.execution.last_close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bars(highs: &[i64]) -> Vec<Kline> {
        highs
            .iter()
            .enumerate()
            .map(|(i, h)| Kline {
                open_time: Utc.timestamp_opt(i as i64 * 900, 0).unwrap(),
                open: Decimal::from(h - 1),
                high: Decimal::from(*h),
                low: Decimal::from(h - 2),
                close: Decimal::from(h - 1),
                volume: Decimal::ONE,
                close_time: Utc.timestamp_opt(i as i64 * 900 + 899, 0).unwrap(),
                interval: "1h".to_string(),
            })
            .collect()
    }

    #[test]
    fn swing_lookup_skips_unconfirmed_tail() {
        let series =
            TimeframeSeries::from_klines("1h", bars(&[10, 11, 15, 11, 10, 9, 8, 12, 13]), 5, 5);
        // 15 at index 2 is the last confirmed swing high; 13 at the tail is not.
        assert_eq!(series.last_swing_high(20), Some(dec!(15)));
        assert_eq!(series.last_swing_low(20), Some(dec!(6)));
    }

    #[test]
    fn swing_lookback_window_is_honored() {
        let series = TimeframeSeries::from_klines(
            "1h",
            bars(&[10, 11, 15, 11, 10, 9, 8, 9, 10, 11, 10]),
            5,
            5,
        );
        // A lookback of 2 bars cannot reach the swing high at index 2.
        assert_eq!(series.last_swing_high(2), None);
    }

    #[test]
    fn empty_series_is_harmless() {
        let series = TimeframeSeries::from_klines("1h", Vec::new(), 5, 5);
        assert_eq!(series.last_close(), None);
        assert_eq!(series.last_swing_high(10), None);
        assert_eq!(series.prev_rsi(), None);
    }
}
