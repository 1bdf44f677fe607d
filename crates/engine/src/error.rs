use thiserror::Error;

/// Fatal errors of the execution pipeline.
///
/// Decision rejections are deliberately NOT here: a rejected entry is a
/// normal, ledgered outcome (`RejectReason`), while an `EngineError` aborts
/// the current iteration.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Persistence failure: {0}")]
    Store(#[from] portfolio_store::StoreError),

    #[error("Market data failure: {0}")]
    MarketData(#[from] market_data::MarketDataError),

    #[error("Exchange client error: {0}")]
    Api(#[from] api_client::error::ApiError),

    #[error("Risk model error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("The decision source returned malformed output: {0}")]
    MalformedDecision(String),

    #[error("Decision source request failed: {0}")]
    DecisionSource(String),

    #[error("No market snapshot available for symbol: {0}")]
    MissingSnapshot(String),
}

/// Why an entry decision was refused. Recorded in the decision ledger so no
/// rejection is silent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("a position is already open for this symbol")]
    PositionAlreadyOpen,

    #[error("entry decision carries no stop-loss")]
    MissingStopLoss,

    #[error("stop-loss is inconsistent with the side: {0}")]
    InvalidStopLoss(String),

    #[error("take-profit is inconsistent with the side: {0}")]
    InvalidTakeProfit(String),

    #[error("implied risk {risk} exceeds the limit {limit}")]
    RiskLimitExceeded { risk: String, limit: String },

    #[error("required margin {required} exceeds the free balance {available}")]
    InsufficientMargin { required: String, available: String },

    #[error("leverage {0} is outside the configured bounds")]
    InvalidLeverage(u32),

    #[error("entry decision is missing required fields: {0}")]
    MalformedDecision(String),

    #[error("no open position to close")]
    PositionNotFound,
}
