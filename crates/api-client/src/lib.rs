use crate::auth::sign_request;
use crate::error::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use configuration::ApiConfig;
use core_types::{CloseIntent, Kline, OrderIntent, Side};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

mod auth;
pub mod error;
pub mod historical;
pub mod responses;

// --- Public API ---
pub use historical::HistoricalClient;
pub use responses::{ApiErrorResponse, FundingRateEntry, OpenInterestEntry, OrderAck};

/// The capability set the engine needs from an exchange.
///
/// This trait is the contract the execution pipeline depends on, so the
/// underlying implementation (live REST client or historical replay client)
/// can be swapped without the engine noticing.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Fetches the most recent klines for a symbol, newest last.
    async fn get_recent_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ApiError>;

    /// Fetches historical klines inside an explicit time range.
    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, ApiError>;

    /// Fetches recent funding-rate records for a perpetual symbol.
    async fn get_funding_rate(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<FundingRateEntry>, ApiError>;

    /// Fetches open-interest history for a symbol.
    async fn get_open_interest(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<OpenInterestEntry>, ApiError>;

    /// Sets the leverage used for subsequent forwarded orders. (Authenticated)
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ApiError>;

    /// Forwards an order intent to the exchange. (Authenticated)
    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderAck, ApiError>;

    /// Forwards a close intent (reduce-only, opposite side). (Authenticated)
    async fn close_position(&self, intent: &CloseIntent) -> Result<OrderAck, ApiError>;
}

/// A concrete implementation of `ExchangeClient` for Binance USDT-M futures.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
}

impl BinanceClient {
    pub fn new(api_config: &ApiConfig) -> Self {
        let (base_url, keys) = if api_config.use_testnet {
            (
                "https://testnet.binancefuture.com".to_string(),
                &api_config.testnet,
            )
        } else {
            ("https://fapi.binance.com".to_string(), &api_config.production)
        };

        let mut headers = HeaderMap::new();
        if !keys.key.is_empty() {
            headers.insert(
                "X-MBX-APIKEY",
                HeaderValue::from_str(&keys.key).expect("Invalid API Key"),
            );
        }

        Self {
            client: reqwest::Client::builder()
                .default_headers(headers)
                .build()
                .expect("Failed to build reqwest client"),
            base_url,
            api_secret: keys.secret.clone(),
        }
    }

    fn timestamp_ms() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis()
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        params.insert("timestamp", Self::timestamp_ms().to_string());

        let query_string = serde_qs::to_string(params)
            .map_err(|e| ApiError::InvalidData(e.to_string()))?;
        let signature = sign_request(&self.api_secret, &query_string);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        let response = self.client.get(&url).send().await?;
        Self::decode_response(response).await
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        params.insert("timestamp", Self::timestamp_ms().to_string());

        let query_string = serde_qs::to_string(params)
            .map_err(|e| ApiError::InvalidData(e.to_string()))?;
        let signature = sign_request(&self.api_secret, &query_string);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        let response = self.client.post(&url).send().await?;
        Self::decode_response(response).await
    }

    async fn decode_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
        } else {
            let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
                ApiError::Deserialization(format!(
                    "Failed to deserialize error response: {}. Original text: {}",
                    e, text
                ))
            })?;
            Err(ApiError::ExchangeError(api_error.code, api_error.msg))
        }
    }
}

// Intermediate struct for deserializing klines from the Binance API. The
// response is a positional array: open time, OHLCV as strings, close time,
// then volume breakdown fields we ignore.
#[derive(Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
);

impl RawKline {
    fn into_kline(self, interval: &str) -> Result<Kline, ApiError> {
        let parse = |s: &str| {
            Decimal::from_str(s).map_err(|e| ApiError::Deserialization(e.to_string()))
        };
        Ok(Kline {
            open_time: Utc
                .timestamp_millis_opt(self.0)
                .single()
                .ok_or_else(|| ApiError::InvalidData(format!("Invalid open_time: {}", self.0)))?,
            open: parse(&self.1)?,
            high: parse(&self.2)?,
            low: parse(&self.3)?,
            close: parse(&self.4)?,
            volume: parse(&self.5)?,
            close_time: Utc
                .timestamp_millis_opt(self.6)
                .single()
                .ok_or_else(|| ApiError::InvalidData(format!("Invalid close_time: {}", self.6)))?,
            interval: interval.to_string(),
        })
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn get_recent_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ApiError> {
        let url = format!("{}/fapi/v1/klines", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?
            .json::<Vec<RawKline>>()
            .await?;

        response
            .into_iter()
            .map(|raw| raw.into_kline(interval))
            .collect()
    }

    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, ApiError> {
        let url = format!("{}/fapi/v1/klines", self.base_url);
        let mut klines = Vec::new();
        let mut cursor = start;

        // Binance caps a single response at 1000 bars; page forward until the
        // requested end is covered or the exchange runs out of data.
        while cursor < end {
            let page = self
                .client
                .get(&url)
                .query(&[
                    ("symbol", symbol),
                    ("interval", interval),
                    ("startTime", &cursor.timestamp_millis().to_string()),
                    ("endTime", &end.timestamp_millis().to_string()),
                    ("limit", "1000"),
                ])
                .send()
                .await?
                .json::<Vec<RawKline>>()
                .await?;

            if page.is_empty() {
                break;
            }

            let parsed = page
                .into_iter()
                .map(|raw| raw.into_kline(interval))
                .collect::<Result<Vec<Kline>, ApiError>>()?;

            let Some(last_close) = parsed.last().map(|k| k.close_time) else {
                break;
            };
            klines.extend(parsed);

            if last_close <= cursor {
                break; // No forward progress; avoid spinning on a bad response.
            }
            cursor = last_close;
        }

        Ok(klines)
    }

    async fn get_funding_rate(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<FundingRateEntry>, ApiError> {
        let url = format!("{}/fapi/v1/fundingRate", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("limit", &limit.to_string())])
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn get_open_interest(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<OpenInterestEntry>, ApiError> {
        let url = format!("{}/futures/data/openInterestHist", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("period", interval),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("leverage", leverage.to_string());

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        #[allow(dead_code)]
        struct LeverageResponse {
            leverage: u32,
            symbol: String,
        }
        self.post_signed::<LeverageResponse>("/fapi/v1/leverage", &mut params)
            .await?;
        Ok(())
    }

    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderAck, ApiError> {
        let side = match intent.side {
            Side::Long => "BUY",
            Side::Short => "SELL",
        };

        let mut params = BTreeMap::new();
        params.insert("symbol", intent.symbol.clone());
        params.insert("side", side.to_string());
        params.insert("type", "MARKET".to_string());
        params.insert("quantity", intent.quantity.to_string());

        self.post_signed("/fapi/v1/order", &mut params).await
    }

    async fn close_position(&self, intent: &CloseIntent) -> Result<OrderAck, ApiError> {
        // Closing a long means selling it, and vice versa.
        let side = match intent.side {
            Side::Long => "SELL",
            Side::Short => "BUY",
        };

        let mut params = BTreeMap::new();
        params.insert("symbol", intent.symbol.clone());
        params.insert("side", side.to_string());
        params.insert("type", "MARKET".to_string());
        params.insert("quantity", intent.quantity.to_string());
        params.insert("reduceOnly", "true".to_string());

        self.post_signed("/fapi/v1/order", &mut params).await
    }
}
