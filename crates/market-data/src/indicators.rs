use core_types::Kline;
use rust_decimal::Decimal;

/// Exponential moving average over `values`.
///
/// Seeded with the simple average of the first `period` samples, so the
/// first `period - 1` slots are `None`.
pub fn ema(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let k = Decimal::from(2) / Decimal::from(period as u64 + 1);
    let seed: Decimal = values[..period].iter().sum::<Decimal>() / Decimal::from(period as u64);
    out[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..values.len() {
        prev += k * (values[i] - prev);
        out[i] = Some(prev);
    }
    out
}

/// Relative Strength Index with Wilder smoothing, aligned with `closes`.
pub fn rsi(closes: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let hundred = Decimal::from(100);
    let period_dec = Decimal::from(period as u64);

    let mut avg_gain = Decimal::ZERO;
    let mut avg_loss = Decimal::ZERO;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change.is_sign_positive() {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period_dec;
    avg_loss /= period_dec;

    let rsi_at = |gain: Decimal, loss: Decimal| {
        if loss.is_zero() {
            hundred
        } else {
            hundred - hundred / (Decimal::ONE + gain / loss)
        }
    };
    out[period] = Some(rsi_at(avg_gain, avg_loss));

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change.is_sign_positive() {
            (change, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -change)
        };
        avg_gain = (avg_gain * (period_dec - Decimal::ONE) + gain) / period_dec;
        avg_loss = (avg_loss * (period_dec - Decimal::ONE) + loss) / period_dec;
        out[i] = Some(rsi_at(avg_gain, avg_loss));
    }
    out
}

/// Average True Range with Wilder smoothing, aligned with `klines`.
pub fn atr(klines: &[Kline], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; klines.len()];
    if period == 0 || klines.len() <= period {
        return out;
    }

    let true_range = |current: &Kline, prev_close: Decimal| {
        let hl = current.high - current.low;
        let hc = (current.high - prev_close).abs();
        let lc = (current.low - prev_close).abs();
        hl.max(hc).max(lc)
    };

    let period_dec = Decimal::from(period as u64);
    let mut smoothed: Decimal = (1..=period)
        .map(|i| true_range(&klines[i], klines[i - 1].close))
        .sum::<Decimal>()
        / period_dec;
    out[period] = Some(smoothed);

    for i in (period + 1)..klines.len() {
        let tr = true_range(&klines[i], klines[i - 1].close);
        smoothed = (smoothed * (period_dec - Decimal::ONE) + tr) / period_dec;
        out[i] = Some(smoothed);
    }
    out
}

/// Width of the confirmation window on each side of a swing point.
pub const SWING_WING: usize = 2;

/// Marks confirmed swing highs and lows: a bar whose high (low) is the
/// strict extreme of the `SWING_WING` bars on both sides. The trailing
/// `SWING_WING` bars can never be marked; they are not yet confirmed.
pub fn swing_markers(klines: &[Kline]) -> (Vec<bool>, Vec<bool>) {
    let n = klines.len();
    let mut highs = vec![false; n];
    let mut lows = vec![false; n];

    if n < 2 * SWING_WING + 1 {
        return (highs, lows);
    }

    for i in SWING_WING..(n - SWING_WING) {
        let window = &klines[i - SWING_WING..=i + SWING_WING];
        let is_high = window
            .iter()
            .enumerate()
            .all(|(j, k)| j == SWING_WING || k.high < klines[i].high);
        let is_low = window
            .iter()
            .enumerate()
            .all(|(j, k)| j == SWING_WING || k.low > klines[i].low);
        highs[i] = is_high;
        lows[i] = is_low;
    }

    (highs, lows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn kline_with(high: Decimal, low: Decimal, close: Decimal) -> Kline {
        Kline {
            open_time: Utc.timestamp_opt(0, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: Decimal::ONE,
            close_time: Utc.timestamp_opt(899, 0).unwrap(),
            interval: "15m".to_string(),
        }
    }

    #[test]
    fn ema_starts_at_simple_average() {
        let values = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        let result = ema(&values, 3);
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(dec!(2)));
        // k = 0.5, next = 2 + 0.5 * (4 - 2) = 3
        assert_eq!(result[3], Some(dec!(3)));
    }

    #[test]
    fn rsi_is_100_in_a_pure_uptrend() {
        let closes: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        let result = rsi(&closes, 14);
        assert_eq!(result[19], Some(dec!(100)));
        assert_eq!(result[13], None);
    }

    #[test]
    fn rsi_midline_in_alternation() {
        // Perfectly alternating +1/-1 changes keep gains equal to losses.
        let closes: Vec<Decimal> = (0..30)
            .map(|i| if i % 2 == 0 { dec!(100) } else { dec!(101) })
            .collect();
        let result = rsi(&closes, 14);
        let last = result.last().unwrap().unwrap();
        assert!(last > dec!(45) && last < dec!(55));
    }

    #[test]
    fn swing_markers_find_local_extremes() {
        let highs = [10, 11, 15, 11, 10, 9, 8, 12, 13];
        let klines: Vec<Kline> = highs
            .iter()
            .map(|h| kline_with(Decimal::from(*h), Decimal::from(h - 2), Decimal::from(h - 1)))
            .collect();
        let (swing_highs, swing_lows) = swing_markers(&klines);
        assert!(swing_highs[2]); // 15 towers over both wings
        assert!(swing_lows[6]); // 6 is the local low before the recovery
        assert!(!swing_highs[8]); // trailing bars are unconfirmed
    }

    #[test]
    fn atr_positive_once_seeded() {
        let klines: Vec<Kline> = (0..20)
            .map(|i| {
                kline_with(
                    Decimal::from(102 + i % 3),
                    Decimal::from(98 - i % 2),
                    Decimal::from(100),
                )
            })
            .collect();
        let result = atr(&klines, 14);
        assert_eq!(result[13], None);
        assert!(result[14].unwrap() > Decimal::ZERO);
    }
}
