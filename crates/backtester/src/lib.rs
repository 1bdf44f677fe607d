//! # Meridian Backtester
//!
//! The replay harness and its historical kline cache. The harness swaps in a
//! bar-sequence clock and a cache-backed data client, then drives the exact
//! same `TradingPipeline` used live, one bar at a time. Everything downstream
//! of the clock and the data source is shared code; a backtest that behaves
//! differently from live operation on the same inputs is a bug, not a
//! variant.

use analytics::{AnalyticsEngine, RunReport};
use api_client::{ExchangeClient, HistoricalClient};
use chrono::{DateTime, Utc};
use clock::ReplayClock;
use configuration::Config;
use core_types::Kline;
use engine::{DecisionSource, ExitEvaluator, TradeEngine, TradingPipeline};
use indicatif::{ProgressBar, ProgressStyle};
use portfolio_store::PortfolioStore;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub mod cache;
pub mod error;

pub use cache::KlineCache;
pub use error::BacktestError;

/// The terminal result of one backtest run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub run_dir: PathBuf,
    pub report: RunReport,
}

/// Drives the shared trading pipeline over a historical window.
pub struct ReplayHarness {
    config: Config,
    decision_source: Arc<dyn DecisionSource>,
}

impl ReplayHarness {
    pub fn new(config: Config, decision_source: Arc<dyn DecisionSource>) -> Self {
        Self {
            config,
            decision_source,
        }
    }

    /// Runs a backtest over `[start, end]`, using `data_source` to fill the
    /// historical cache. Artifacts land in an isolated `run-<id>` directory;
    /// runs never share or mutate each other's ledgers.
    pub async fn run(
        &self,
        data_source: &dyn ExchangeClient,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RunOutcome, BacktestError> {
        let run_id = Uuid::new_v4();
        let run_dir = self.config.paths.backtest_dir.join(format!("run-{run_id}"));
        tracing::info!(%run_id, from = %start, to = %end, "backtest run starting");

        // 1. Fill the shared kline cache for every symbol and timeframe.
        let cache = KlineCache::new(&self.config.paths.cache_dir)?;
        let intervals = [
            self.config.engine.interval.clone(),
            self.config.engine.structure_interval.clone(),
            self.config.engine.trend_interval.clone(),
        ];

        let mut frames: HashMap<String, HashMap<String, Vec<Kline>>> = HashMap::new();
        for symbol in &self.config.engine.symbols {
            let mut by_interval = HashMap::new();
            for interval in &intervals {
                let bars = cache
                    .ensure_coverage(data_source, symbol, interval, start, end)
                    .await?;
                if bars.is_empty() {
                    return Err(BacktestError::DataUnavailable);
                }
                by_interval.insert(interval.clone(), bars);
            }
            frames.insert(symbol.clone(), by_interval);
        }

        // 2. The simulated timeline: every execution-timeframe bar open in
        // the window, across all symbols.
        let timeline: BTreeSet<DateTime<Utc>> = frames
            .values()
            .filter_map(|by_interval| by_interval.get(&self.config.engine.interval))
            .flatten()
            .filter(|k| k.open_time >= start && k.open_time <= end)
            .map(|k| k.open_time)
            .collect();
        if timeline.is_empty() {
            return Err(BacktestError::DataUnavailable);
        }

        // 3. Assemble the pipeline around the replay clock and the
        // cache-backed client; everything downstream is the live code path.
        let replay_clock = Arc::new(ReplayClock::new(start));
        let historical = Arc::new(HistoricalClient::new(frames, Arc::clone(&replay_clock)));

        let store = PortfolioStore::new(&run_dir, self.config.engine.starting_capital)?;
        let trade_engine = TradeEngine::new(
            store.clone(),
            self.config.risk_management.clone(),
            self.config.simulation.clone(),
            replay_clock.clone(),
        )?;
        let collector = market_data::SnapshotCollector::new(
            historical,
            self.config.engine.clone(),
            self.config.exits.clone(),
        );
        let mut pipeline = TradingPipeline::new(
            self.config.engine.symbols.clone(),
            collector,
            Arc::clone(&self.decision_source),
            ExitEvaluator::new(self.config.exits.clone()),
            trade_engine,
            replay_clock.clone(),
        );

        // 4. Replay: advance the clock to each bar and run one iteration.
        let progress_bar = ProgressBar::new(timeline.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("=>-"),
        );

        for bar_time in timeline {
            replay_clock.advance_to(bar_time);
            pipeline.run_iteration().await?;
            progress_bar.inc(1);
        }
        progress_bar.finish_with_message("Replay complete. Analyzing results...");

        // 5. Summarize from the run's own ledgers and seal the artifact dir.
        let trades = store.read_trade_records()?;
        let equity_curve = store.read_equity_curve()?;
        let report = AnalyticsEngine::new(Decimal::ZERO).calculate(
            &trades,
            &equity_curve,
            self.config.engine.starting_capital,
            &self.config.engine.interval,
        )?;

        let summary_path = run_dir.join("summary.json");
        fs::write(&summary_path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(
            %run_id,
            final_equity = %report.final_equity,
            trades = report.total_trades,
            "backtest run finished"
        );

        Ok(RunOutcome {
            run_id,
            run_dir,
            report,
        })
    }
}
