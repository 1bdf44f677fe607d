use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Persistence I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize portfolio state: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("A position is already open for symbol: {0}")]
    PositionAlreadyOpen(String),

    #[error("No open position for symbol: {0}")]
    PositionNotFound(String),

    #[error("Balance {available} cannot cover margin plus fee {required}")]
    InsufficientBalance { required: String, available: String },

    #[error("Missing mark price for symbol: {0}")]
    MissingPrice(String),
}
