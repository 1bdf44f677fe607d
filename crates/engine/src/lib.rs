//! # Meridian Engine
//!
//! The orchestrating crate: the trade execution engine, the per-iteration
//! exit evaluator, the decision-source abstraction, and the iteration
//! pipeline they run in.
//!
//! ## Architectural Principles
//!
//! - **One pipeline, two clocks:** `TradingPipeline::run_iteration` is the
//!   single code path for both live trading and historical replay. Live mode
//!   wraps it in a paced loop (`LiveEngine`); the backtester drives it bar by
//!   bar. Any behavioral divergence between the two is a correctness bug.
//! - **Persist before anything observable:** the execution engine commits
//!   every state transition to the portfolio store before notification or
//!   live forwarding happen.
//! - **Rejections are data:** invalid decisions are recorded in the decision
//!   ledger with their reason, not raised as errors.

use clock::TimeProvider;
use market_data::{MarketSnapshot, SnapshotCollector};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub mod decision;
pub mod error;
pub mod execution;
pub mod exits;

// Re-export the key components to provide a clean, public-facing API.
pub use decision::{DecisionSource, LlmDecisionSource, ScriptedDecisionSource};
pub use error::{EngineError, RejectReason};
pub use execution::TradeEngine;
pub use exits::{ExitEvaluator, ExitSignal};

/// One complete trading iteration, shared verbatim between live and replay:
/// fetch snapshots, evaluate exits, consult the decision source, execute,
/// record equity.
pub struct TradingPipeline {
    symbols: Vec<String>,
    collector: SnapshotCollector,
    decision_source: Arc<dyn DecisionSource>,
    exit_evaluator: ExitEvaluator,
    engine: TradeEngine,
    clock: Arc<dyn TimeProvider>,
}

impl TradingPipeline {
    pub fn new(
        symbols: Vec<String>,
        collector: SnapshotCollector,
        decision_source: Arc<dyn DecisionSource>,
        exit_evaluator: ExitEvaluator,
        engine: TradeEngine,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            symbols,
            collector,
            decision_source,
            exit_evaluator,
            engine,
            clock,
        }
    }

    pub fn engine(&self) -> &TradeEngine {
        &self.engine
    }

    /// Runs one iteration to completion.
    ///
    /// Collaborator failures (market data, decision source) surface as
    /// errors and leave positions untouched; the caller retries on the next
    /// tick. Persistence failures also surface as errors but must halt the
    /// run instead.
    pub async fn run_iteration(&mut self) -> Result<(), EngineError> {
        // 1. Fetch a snapshot for every symbol, or abandon the iteration.
        let mut snapshots: HashMap<String, MarketSnapshot> = HashMap::new();
        for symbol in &self.symbols {
            let snapshot = self.collector.collect(symbol).await?;
            snapshots.insert(symbol.clone(), snapshot);
        }

        let marks: HashMap<String, Decimal> = snapshots
            .iter()
            .filter_map(|(symbol, snap)| snap.price().map(|p| (symbol.clone(), p)))
            .collect();

        // 2. Evaluate exits over every open position, in symbol order.
        for symbol in self.engine.portfolio().open_symbols() {
            let Some(snapshot) = snapshots.get(&symbol) else {
                tracing::warn!(%symbol, "no snapshot for open position, skipping exit check");
                continue;
            };
            let Some(position) = self.engine.portfolio().position(&symbol) else {
                continue;
            };
            if let Some(signal) = self.exit_evaluator.evaluate(position, snapshot) {
                self.engine
                    .close_position(&symbol, signal.exit_price, signal.reason)
                    .await?;
            }
        }

        // 3. Consult the decision source and apply, in symbol order.
        let decisions = self
            .decision_source
            .decide(&snapshots, self.engine.portfolio())
            .await?;
        let mut decided: Vec<String> = decisions.keys().cloned().collect();
        decided.sort();
        for symbol in decided {
            let Some(snapshot) = snapshots.get(&symbol) else {
                tracing::warn!(%symbol, "decision for unknown symbol ignored");
                continue;
            };
            let Some(price) = snapshot.price() else {
                continue;
            };
            self.engine
                .apply_decision(&symbol, &decisions[&symbol], price, &marks)
                .await?;
        }

        // 4. Record the iteration's equity observation.
        let equity = self.engine.record_equity(&marks)?;
        tracing::debug!(time = %self.clock.now(), %equity, "iteration complete");

        Ok(())
    }
}

/// The live loop: runs the pipeline once per configured interval and honors
/// interrupts only between iterations, never mid-mutation.
pub struct LiveEngine {
    pipeline: TradingPipeline,
    pace: Duration,
}

impl LiveEngine {
    pub fn new(pipeline: TradingPipeline, pace: Duration) -> Self {
        Self { pipeline, pace }
    }

    pub async fn run(&mut self) -> Result<(), EngineError> {
        tracing::info!(pace_secs = self.pace.as_secs(), "live engine started");

        loop {
            match self.pipeline.run_iteration().await {
                Ok(()) => {}
                // A persistence failure must halt the run: continuing would
                // let in-memory state drift from disk.
                Err(e @ EngineError::Store(_)) => {
                    tracing::error!(error = %e, "persistence failure, halting");
                    return Err(e);
                }
                // Collaborator failures abandon the iteration; positions are
                // left untouched and re-evaluated on the next tick.
                Err(e) => {
                    tracing::warn!(error = %e, "iteration abandoned, retrying next tick");
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received between iterations, shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.pace) => {}
            }
        }
    }
}
