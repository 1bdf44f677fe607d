use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The direction of a leveraged exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// The PnL sign multiplier: +1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// The action requested by the decision source for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSignal {
    Entry,
    Hold,
    Close,
}

/// Why a position was closed. Recorded verbatim in the trade ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    SlHit,
    TpHit,
    StructureBreak,
    TrendReversal,
    DecisionClose,
}

impl ExitReason {
    /// The ledger string for this reason (e.g. "sl_hit").
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::SlHit => "sl_hit",
            ExitReason::TpHit => "tp_hit",
            ExitReason::StructureBreak => "structure_break",
            ExitReason::TrendReversal => "trend_reversal",
            ExitReason::DecisionClose => "decision_close",
        }
    }
}

/// The three kline resolutions a market snapshot carries.
///
/// Execution is the trading resolution, Structure the intermediate one used
/// for swing tracking, Trend the highest one used for reversal detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Execution,
    Structure,
    Trend,
}
