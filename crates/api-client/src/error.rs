use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to build or send the HTTP request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("The exchange returned an error: code {0}, {1}")]
    ExchangeError(i32, String),

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("No historical data loaded for {symbol} at interval {interval}")]
    MissingFrame { symbol: String, interval: String },

    #[error("Operation not supported by this client: {0}")]
    Unsupported(String),
}
