//! # Meridian Analytics
//!
//! Quantitative statistics for finished runs: annualized Sortino and Sharpe
//! ratios, drawdown, and trade-level aggregates. This crate is the "unbiased
//! judge" of the system.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** a pure calculation crate with no knowledge of
//!   external systems. It depends only on `core-types`.
//! - **Stateless Calculation:** `AnalyticsEngine` takes raw trading data as
//!   input and produces a `RunReport` as output, which makes it reliable and
//!   easy to test.

pub mod engine;
pub mod error;
pub mod report;

// Re-export the key components to create a clean, public-facing API.
pub use engine::{sharpe, sortino, AnalyticsEngine};
pub use error::AnalyticsError;
pub use report::RunReport;
