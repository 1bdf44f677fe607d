use rust_decimal::Decimal;
use serde::Deserialize;

// `#[serde(rename_all = "camelCase")]` maps the exchange's JSON field names
// onto Rust snake_case.

/// The acknowledgement from a successful `POST /fapi/v1/order` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub client_order_id: String,
    pub order_id: i64,
    pub symbol: String,
    pub status: String,
    pub orig_qty: Decimal,
    // The response carries more fields; these are the ones we act on.
}

/// One funding-rate record from `GET /fapi/v1/fundingRate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateEntry {
    pub symbol: String,
    pub funding_rate: Decimal,
    pub funding_time: i64,
}

/// One open-interest record from `GET /futures/data/openInterestHist`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterestEntry {
    pub symbol: String,
    pub sum_open_interest: Decimal,
    pub timestamp: i64,
}

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub msg: String,
}
