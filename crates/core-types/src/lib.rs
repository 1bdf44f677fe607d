pub mod enums;
pub mod error;
pub mod interval;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{DecisionSignal, ExitReason, Side, Timeframe};
pub use error::CoreError;
pub use interval::{interval_duration, interval_minutes};
pub use structs::{
    CloseIntent, Decision, DecisionOutcome, DecisionRecord, EquityPoint, Kline, OrderIntent,
    Position, TradeRecord,
};
