use crate::error::ApiError;
use crate::responses::{FundingRateEntry, OpenInterestEntry, OrderAck};
use crate::ExchangeClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clock::{ReplayClock, TimeProvider};
use core_types::{CloseIntent, Kline, OrderIntent};
use std::collections::HashMap;
use std::sync::Arc;

/// An `ExchangeClient` that serves pre-loaded historical frames, filtered to
/// the replay clock's current position.
///
/// The replay harness hands this client the cached bar sequences for every
/// (symbol, interval) pair a run touches, then advances the shared
/// `ReplayClock` bar by bar. Queries only ever see bars whose open time is at
/// or before "now", so the downstream pipeline cannot peek into the future.
pub struct HistoricalClient {
    frames: HashMap<String, HashMap<String, Vec<Kline>>>,
    clock: Arc<ReplayClock>,
}

impl HistoricalClient {
    /// `frames` maps symbol -> interval -> ascending bar sequence.
    pub fn new(
        frames: HashMap<String, HashMap<String, Vec<Kline>>>,
        clock: Arc<ReplayClock>,
    ) -> Self {
        Self { frames, clock }
    }

    fn frame(&self, symbol: &str, interval: &str) -> Result<&Vec<Kline>, ApiError> {
        self.frames
            .get(symbol)
            .and_then(|by_interval| by_interval.get(interval))
            .ok_or_else(|| ApiError::MissingFrame {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
            })
    }
}

#[async_trait]
impl ExchangeClient for HistoricalClient {
    async fn get_recent_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ApiError> {
        let now = self.clock.now();
        let frame = self.frame(symbol, interval)?;

        let visible: Vec<&Kline> = frame.iter().filter(|k| k.open_time <= now).collect();
        let start = visible.len().saturating_sub(limit);
        Ok(visible[start..].iter().map(|k| (*k).clone()).collect())
    }

    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, ApiError> {
        let now = self.clock.now();
        let frame = self.frame(symbol, interval)?;
        Ok(frame
            .iter()
            .filter(|k| k.open_time >= start && k.open_time <= end && k.open_time <= now)
            .cloned()
            .collect())
    }

    /// Funding history is not replayed; snapshot assembly tolerates its absence.
    async fn get_funding_rate(
        &self,
        _symbol: &str,
        _limit: usize,
    ) -> Result<Vec<FundingRateEntry>, ApiError> {
        Ok(Vec::new())
    }

    /// Open interest is not replayed; snapshot assembly tolerates its absence.
    async fn get_open_interest(
        &self,
        _symbol: &str,
        _interval: &str,
        _limit: usize,
    ) -> Result<Vec<OpenInterestEntry>, ApiError> {
        Ok(Vec::new())
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), ApiError> {
        Err(ApiError::Unsupported(
            "leverage changes cannot be forwarded during replay".to_string(),
        ))
    }

    async fn place_order(&self, _intent: &OrderIntent) -> Result<OrderAck, ApiError> {
        Err(ApiError::Unsupported(
            "orders cannot be forwarded during replay".to_string(),
        ))
    }

    async fn close_position(&self, _intent: &CloseIntent) -> Result<OrderAck, ApiError> {
        Err(ApiError::Unsupported(
            "closes cannot be forwarded during replay".to_string(),
        ))
    }
}
