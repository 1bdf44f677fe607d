use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The terminal summary record of a run.
///
/// This struct is the final output of the `AnalyticsEngine`, persisted as
/// `summary.json` in each backtest run directory and printed by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    // I. Outcome
    pub final_equity: Decimal,
    pub total_return_pct: Decimal,
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,

    // II. Risk-adjusted ratios
    pub sortino_ratio: Decimal,
    pub sharpe_ratio: Option<Decimal>, // Option<> for runs with no return variance
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,

    // III. Trade-level statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: Option<Decimal>, // Option<> for runs with 0 trades

    // IV. Time
    #[serde(with = "humantime_serde")]
    pub average_holding_period: Duration,
}

impl RunReport {
    /// Creates a new, zeroed-out RunReport.
    pub fn new() -> Self {
        Self {
            final_equity: Decimal::ZERO,
            total_return_pct: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            sortino_ratio: Decimal::ZERO,
            sharpe_ratio: None,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: Decimal::ZERO,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate_pct: None,
            average_holding_period: Duration::ZERO,
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
