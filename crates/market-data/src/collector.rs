use crate::error::MarketDataError;
use crate::snapshot::{MarketSnapshot, TimeframeSeries};
use api_client::ExchangeClient;
use configuration::{EngineSettings, ExitSettings};
use std::sync::Arc;

/// Extra bars fetched beyond the longest indicator period, so the first
/// usable value is fully seeded.
const LOOKBACK_PADDING: usize = 60;

/// Assembles `MarketSnapshot`s from whichever `ExchangeClient` it is handed.
pub struct SnapshotCollector {
    client: Arc<dyn ExchangeClient>,
    engine: EngineSettings,
    exits: ExitSettings,
}

impl SnapshotCollector {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        engine: EngineSettings,
        exits: ExitSettings,
    ) -> Self {
        Self {
            client,
            engine,
            exits,
        }
    }

    fn bars_needed(&self) -> usize {
        self.exits
            .trend_ma_period
            .max(self.exits.rsi_period)
            .max(self.exits.swing_lookback)
            + LOOKBACK_PADDING
    }

    /// Collects one symbol's snapshot: bars at all three timeframes plus
    /// indicator columns, funding rate, and open interest.
    ///
    /// Missing klines on any timeframe abandon the snapshot (the engine
    /// retries next iteration); funding rate and open interest are optional
    /// extras whose failure is tolerated and logged.
    pub async fn collect(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError> {
        let limit = self.bars_needed();

        let mut series = Vec::with_capacity(3);
        for interval in [
            &self.engine.interval,
            &self.engine.structure_interval,
            &self.engine.trend_interval,
        ] {
            let klines = self
                .client
                .get_recent_klines(symbol, interval, limit)
                .await?;
            if klines.is_empty() {
                return Err(MarketDataError::NoData(
                    symbol.to_string(),
                    interval.clone(),
                ));
            }
            series.push(TimeframeSeries::from_klines(
                interval,
                klines,
                self.exits.trend_ma_period,
                self.exits.rsi_period,
            ));
        }

        let trend = series.pop().expect("three series were pushed");
        let structure = series.pop().expect("three series were pushed");
        let execution = series.pop().expect("three series were pushed");

        let timestamp = execution
            .last_kline()
            .map(|k| k.close_time)
            .ok_or_else(|| {
                MarketDataError::NoData(symbol.to_string(), self.engine.interval.clone())
            })?;

        let funding_rate = match self.client.get_funding_rate(symbol, 1).await {
            Ok(entries) => entries.last().map(|e| e.funding_rate),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "funding rate unavailable, continuing without it");
                None
            }
        };

        let open_interest = match self.client.get_open_interest(symbol, "5m", 1).await {
            Ok(entries) => entries.last().map(|e| e.sum_open_interest),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "open interest unavailable, continuing without it");
                None
            }
        };

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            timestamp,
            execution,
            structure,
            trend,
            funding_rate,
            open_interest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::error::ApiError;
    use api_client::responses::{FundingRateEntry, OpenInterestEntry, OrderAck};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use core_types::{CloseIntent, Kline, OrderIntent};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// A stub exchange that serves a fixed ramp of bars and fails the
    /// optional endpoints, mimicking a flaky funding-rate API.
    struct StubExchange {
        fail_funding: bool,
    }

    fn ramp(count: usize) -> Vec<Kline> {
        (0..count)
            .map(|i| Kline {
                open_time: Utc.timestamp_opt(i as i64 * 900, 0).unwrap(),
                open: Decimal::from(100 + i as i64),
                high: Decimal::from(101 + i as i64),
                low: Decimal::from(99 + i as i64),
                close: Decimal::from(100 + i as i64),
                volume: Decimal::ONE,
                close_time: Utc.timestamp_opt(i as i64 * 900 + 899, 0).unwrap(),
                interval: "15m".to_string(),
            })
            .collect()
    }

    #[async_trait]
    impl ExchangeClient for StubExchange {
        async fn get_recent_klines(
            &self,
            _symbol: &str,
            _interval: &str,
            limit: usize,
        ) -> Result<Vec<Kline>, ApiError> {
            Ok(ramp(limit))
        }

        async fn get_historical_klines(
            &self,
            _symbol: &str,
            _interval: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Kline>, ApiError> {
            Ok(Vec::new())
        }

        async fn get_funding_rate(
            &self,
            symbol: &str,
            _limit: usize,
        ) -> Result<Vec<FundingRateEntry>, ApiError> {
            if self.fail_funding {
                return Err(ApiError::InvalidData("boom".to_string()));
            }
            Ok(vec![FundingRateEntry {
                symbol: symbol.to_string(),
                funding_rate: dec!(0.0001),
                funding_time: 0,
            }])
        }

        async fn get_open_interest(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: usize,
        ) -> Result<Vec<OpenInterestEntry>, ApiError> {
            Ok(Vec::new())
        }

        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), ApiError> {
            Ok(())
        }

        async fn place_order(&self, _intent: &OrderIntent) -> Result<OrderAck, ApiError> {
            Err(ApiError::Unsupported("stub".to_string()))
        }

        async fn close_position(&self, _intent: &CloseIntent) -> Result<OrderAck, ApiError> {
            Err(ApiError::Unsupported("stub".to_string()))
        }
    }

    fn collector(fail_funding: bool) -> SnapshotCollector {
        SnapshotCollector::new(
            Arc::new(StubExchange { fail_funding }),
            EngineSettings {
                symbols: vec!["ETHUSDT".to_string()],
                interval: "15m".to_string(),
                structure_interval: "1h".to_string(),
                trend_interval: "4h".to_string(),
                starting_capital: dec!(10000),
            },
            ExitSettings {
                proximity_guard_pct: dec!(0.2),
                swing_lookback: 10,
                trend_ma_period: 50,
                rsi_period: 14,
            },
        )
    }

    #[tokio::test]
    async fn snapshot_carries_three_seeded_timeframes() {
        let snapshot = collector(false).collect("ETHUSDT").await.unwrap();
        assert_eq!(snapshot.symbol, "ETHUSDT");
        assert!(snapshot.execution.last_ema().is_some());
        assert!(snapshot.structure.last_rsi().is_some());
        assert!(snapshot.trend.last_ema().is_some());
        assert_eq!(snapshot.funding_rate, Some(dec!(0.0001)));
    }

    #[tokio::test]
    async fn funding_failure_does_not_abandon_the_snapshot() {
        let snapshot = collector(true).collect("ETHUSDT").await.unwrap();
        assert_eq!(snapshot.funding_rate, None);
        assert!(snapshot.price().is_some());
    }
}
