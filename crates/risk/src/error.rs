use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Leverage {0} is invalid; leverage must be at least 1.")]
    InvalidLeverage(u32),

    #[error("A calculation error occurred: {0}")]
    Calculation(String),
}
