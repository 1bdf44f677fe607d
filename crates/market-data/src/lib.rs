//! # Meridian Market Data
//!
//! Assembles the per-symbol `MarketSnapshot` the engine and exit evaluator
//! consume: OHLCV bars at the execution, structure, and trend timeframes plus
//! the derived indicator columns (EMAs, RSI, ATR, swing markers).
//!
//! The collector is handed an `ExchangeClient` and never knows whether it is
//! talking to the live exchange or the historical replay client; that is what
//! keeps the live and replay pipelines on a single code path.

pub mod collector;
pub mod error;
pub mod indicators;
pub mod snapshot;

pub use collector::SnapshotCollector;
pub use error::MarketDataError;
pub use snapshot::{MarketSnapshot, TimeframeSeries};
