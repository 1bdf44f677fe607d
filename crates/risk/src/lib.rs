//! # Meridian Risk & Fee Model
//!
//! Pure, stateless arithmetic for margin, fees, and PnL. Every balance
//! mutation in the system flows through these functions so that the engine,
//! the replay harness, and the tests all agree on the same numbers.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This crate has no knowledge of external systems and
//!   no side effects. It depends only on `core-types`.
//! - **Decimal everywhere:** all money values are `rust_decimal::Decimal`;
//!   there is no floating point in any balance path.

pub mod error;
pub mod model;

// Re-export the key components to provide a clean, public-facing API.
pub use error::RiskError;
pub use model::{fee, margin, realized_pnl, unrealized_pnl};
