use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Exchange client error while filling the cache: {0}")]
    Api(#[from] api_client::error::ApiError),

    #[error("Engine error during replay: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("Persistence error: {0}")]
    Store(#[from] portfolio_store::StoreError),

    #[error("Analytics calculation error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Cache I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache file error: {0}")]
    Cache(String),

    #[error("Failed to serialize the run summary: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),

    #[error("Historical data for the requested range is incomplete or missing.")]
    DataUnavailable,
}

impl From<indicatif::style::TemplateError> for BacktestError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        BacktestError::ProgressBarTemplate(error.to_string())
    }
}
