use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Exchange client error: {0}")]
    Api(#[from] api_client::error::ApiError),

    #[error("No kline data returned for {0} at interval {1}")]
    NoData(String, String),
}
