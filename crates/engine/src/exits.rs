use configuration::ExitSettings;
use core_types::{ExitReason, Position, Side};
use market_data::MarketSnapshot;
use rust_decimal::Decimal;

/// A close instruction produced by the evaluator, fed back into the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    /// The price the close settles at: the stop/target level itself for
    /// sl_hit/tp_hit, the current close for evaluator-initiated exits.
    pub exit_price: Decimal,
}

/// Inspects every open position once per iteration and emits close
/// instructions. Runs identically in live and replay mode.
pub struct ExitEvaluator {
    settings: ExitSettings,
}

impl ExitEvaluator {
    pub fn new(settings: ExitSettings) -> Self {
        Self { settings }
    }

    /// Evaluates the exit rules in precedence order; the first match wins.
    ///
    /// 1. Stop-loss / take-profit crossed by the current bar's range.
    /// 2. Structure break on the intermediate timeframe.
    /// 3. Trend reversal on the highest timeframe.
    ///
    /// Rules 2 and 3 are suppressed while price sits inside the proximity
    /// guard band around the stop; in that zone only the stop or target
    /// itself may close the position.
    pub fn evaluate(&self, position: &Position, snapshot: &MarketSnapshot) -> Option<ExitSignal> {
        if let Some(signal) = self.check_stop_and_target(position, snapshot) {
            return Some(signal);
        }

        let price = snapshot.price()?;
        if self.within_proximity_guard(position, price) {
            tracing::debug!(
                symbol = %position.symbol,
                %price,
                stop = %position.stop_loss,
                "proximity guard active, structural exits suppressed"
            );
            return None;
        }

        if let Some(signal) = self.check_structure_break(position, snapshot, price) {
            return Some(signal);
        }
        self.check_trend_reversal(position, snapshot, price)
    }

    /// Rule 1: the bar's high/low range crossing the stop or target. When a
    /// single bar crosses both, the stop wins (conservative fill).
    fn check_stop_and_target(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
    ) -> Option<ExitSignal> {
        let bar = snapshot.current_bar()?;

        let (stop_crossed, target_crossed) = match position.side {
            Side::Long => (
                bar.low <= position.stop_loss,
                bar.high >= position.take_profit,
            ),
            Side::Short => (
                bar.high >= position.stop_loss,
                bar.low <= position.take_profit,
            ),
        };

        if stop_crossed {
            return Some(ExitSignal {
                reason: ExitReason::SlHit,
                exit_price: position.stop_loss,
            });
        }
        if target_crossed {
            return Some(ExitSignal {
                reason: ExitReason::TpHit,
                exit_price: position.take_profit,
            });
        }
        None
    }

    /// Whether price is within the configured fraction of the stop distance
    /// from the stop level.
    fn within_proximity_guard(&self, position: &Position, price: Decimal) -> bool {
        let stop_distance = (position.entry_price - position.stop_loss).abs();
        if stop_distance.is_zero() {
            return false;
        }
        (price - position.stop_loss).abs() <= self.settings.proximity_guard_pct * stop_distance
    }

    /// Rule 2: the structure timeframe closing beyond the most recent
    /// confirmed swing extreme against the position.
    fn check_structure_break(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
        price: Decimal,
    ) -> Option<ExitSignal> {
        let structure_close = snapshot.structure.last_close()?;

        let broken = match position.side {
            Side::Long => {
                let swing_low = snapshot.structure.last_swing_low(self.settings.swing_lookback)?;
                structure_close < swing_low
            }
            Side::Short => {
                let swing_high =
                    snapshot.structure.last_swing_high(self.settings.swing_lookback)?;
                structure_close > swing_high
            }
        };

        broken.then(|| ExitSignal {
            reason: ExitReason::StructureBreak,
            exit_price: price,
        })
    }

    /// Rule 3: the trend timeframe closing beyond the long-period moving
    /// average while the momentum oscillator flips across its midline.
    fn check_trend_reversal(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
        price: Decimal,
    ) -> Option<ExitSignal> {
        let trend_close = snapshot.trend.last_close()?;
        let trend_ma = snapshot.trend.last_ema()?;
        let rsi = snapshot.trend.last_rsi()?;
        let prev_rsi = snapshot.trend.prev_rsi()?;

        let midline = Decimal::from(50);
        let reversed = match position.side {
            Side::Long => trend_close < trend_ma && prev_rsi >= midline && rsi < midline,
            Side::Short => trend_close > trend_ma && prev_rsi <= midline && rsi > midline,
        };

        reversed.then(|| ExitSignal {
            reason: ExitReason::TrendReversal,
            exit_price: price,
        })
    }
}
