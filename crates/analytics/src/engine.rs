use crate::error::AnalyticsError;
use crate::report::RunReport;
use core_types::{interval_minutes, EquityPoint, TradeRecord};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::time::Duration;

const MINUTES_PER_YEAR: i64 = 525_600;

/// How many bars of the given interval fit in a year, for annualization.
fn periods_per_year(interval: &str) -> Decimal {
    let minutes = interval_minutes(interval).unwrap_or(60);
    Decimal::from(MINUTES_PER_YEAR / minutes.max(1))
}

/// Periodic returns derived from consecutive equity observations.
fn periodic_returns(equity_curve: &[EquityPoint]) -> Vec<Decimal> {
    equity_curve
        .windows(2)
        .filter(|w| !w[0].equity.is_zero())
        .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
        .collect()
}

/// Annualized Sortino ratio over an equity curve.
///
/// Only returns below the per-period risk-free target enter the downside
/// deviation. When no downside samples exist the ratio is 0, not NaN; a run
/// that never lost money has nothing meaningful to annualize.
pub fn sortino(equity_curve: &[EquityPoint], risk_free_rate: Decimal, interval: &str) -> Decimal {
    let periods = periods_per_year(interval);
    let returns = periodic_returns(equity_curve);
    if returns.is_empty() {
        return Decimal::ZERO;
    }

    let target = risk_free_rate / periods;
    let mean: Decimal = returns.iter().sum::<Decimal>() / Decimal::from(returns.len());

    let downside: Vec<Decimal> = returns
        .iter()
        .filter(|r| **r < target)
        .map(|r| (*r - target) * (*r - target))
        .collect();
    if downside.is_empty() {
        return Decimal::ZERO;
    }

    let downside_variance: Decimal =
        downside.iter().sum::<Decimal>() / Decimal::from(returns.len());
    let downside_dev = match downside_variance.sqrt() {
        Some(dev) if !dev.is_zero() => dev,
        _ => return Decimal::ZERO,
    };

    let annualizer = periods.sqrt().unwrap_or(Decimal::ONE);
    (mean - target) / downside_dev * annualizer
}

/// Annualized Sharpe ratio over a series of periodic returns.
///
/// Returns `None` when there are fewer than two samples or no variance,
/// mirroring the undefined cases rather than fabricating a number.
pub fn sharpe(returns: &[Decimal], interval: &str) -> Option<Decimal> {
    if returns.len() < 2 {
        return None;
    }

    let n = Decimal::from(returns.len());
    let mean: Decimal = returns.iter().sum::<Decimal>() / n;
    let variance: Decimal = returns.iter().map(|r| (*r - mean) * (*r - mean)).sum::<Decimal>() / n;
    let std_dev = variance.sqrt()?;
    if std_dev.is_zero() {
        return None;
    }

    let annualizer = periods_per_year(interval).sqrt().unwrap_or(Decimal::ONE);
    Some(mean / std_dev * annualizer)
}

/// A stateless calculator for deriving a `RunReport` from run output.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {
    /// Annual risk-free rate used as the Sortino target (0 is a fine default).
    risk_free_rate: Decimal,
}

impl AnalyticsEngine {
    pub fn new(risk_free_rate: Decimal) -> Self {
        Self { risk_free_rate }
    }

    /// The main entry point for calculating run statistics.
    ///
    /// # Arguments
    ///
    /// * `trades` - all terminal trade records of the run.
    /// * `equity_curve` - the run's equity ledger, in insertion order.
    /// * `initial_capital` - the starting capital of the run.
    /// * `interval` - the execution timeframe, for annualization.
    pub fn calculate(
        &self,
        trades: &[TradeRecord],
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
        interval: &str,
    ) -> Result<RunReport, AnalyticsError> {
        if initial_capital <= Decimal::ZERO {
            return Err(AnalyticsError::NotEnoughData(
                "initial capital must be positive".to_string(),
            ));
        }

        let mut report = RunReport::new();

        report.final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);
        report.total_return_pct =
            (report.final_equity - initial_capital) / initial_capital * Decimal::from(100);

        self.aggregate_trades(trades, &mut report);
        self.calculate_drawdown(equity_curve, &mut report);

        report.sortino_ratio = sortino(equity_curve, self.risk_free_rate, interval);
        report.sharpe_ratio = sharpe(&periodic_returns(equity_curve), interval);

        Ok(report)
    }

    /// Trade-count, PnL, fee, and holding-time aggregates.
    fn aggregate_trades(&self, trades: &[TradeRecord], report: &mut RunReport) {
        report.total_trades = trades.len();

        for trade in trades {
            report.realized_pnl += trade.net_pnl;
            report.total_fees += trade.entry_fee + trade.exit_fee;
            if trade.net_pnl.is_sign_positive() && !trade.net_pnl.is_zero() {
                report.winning_trades += 1;
            } else {
                report.losing_trades += 1;
            }
        }

        if report.total_trades > 0 {
            report.win_rate_pct = Some(
                Decimal::from(report.winning_trades) / Decimal::from(report.total_trades)
                    * Decimal::from(100),
            );

            let total_secs: i64 = trades.iter().map(|t| t.holding_secs).sum();
            report.average_holding_period =
                Duration::from_secs((total_secs / report.total_trades as i64).max(0) as u64);
        }
    }

    /// Maximum peak-to-trough drawdown over the equity curve.
    fn calculate_drawdown(&self, equity_curve: &[EquityPoint], report: &mut RunReport) {
        let Some(first) = equity_curve.first() else {
            return;
        };

        let mut peak = first.equity;
        let mut max_drawdown = Decimal::ZERO;
        let mut max_drawdown_pct = Decimal::ZERO;

        for point in equity_curve {
            if point.equity > peak {
                peak = point.equity;
            }
            let drawdown = peak - point.equity;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
                if !peak.is_zero() {
                    max_drawdown_pct = drawdown / peak * Decimal::from(100);
                }
            }
        }

        report.max_drawdown = max_drawdown;
        report.max_drawdown_pct = max_drawdown_pct;
    }
}
