use crate::enums::{DecisionSignal, ExitReason, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single OHLCV candlestick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
    pub interval: String,
}

/// A single open leveraged exposure to one symbol.
///
/// At most one position per symbol exists at any time. A position is created
/// only by the execution engine on a validated entry decision and is always
/// closed whole; there are no partial exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Quote-currency margin committed at open: quantity * entry / leverage.
    pub margin: Decimal,
    /// Entry-leg fee, debited from the balance at open.
    pub entry_fee: Decimal,
    /// Quote-currency amount at risk: |entry - stop| * quantity.
    pub risk_amount: Decimal,
    /// Free-text condition under which the thesis is considered invalidated.
    pub invalidation_condition: String,
    pub opened_at: DateTime<Utc>,
}

/// A structured trade decision consumed from the decision source.
///
/// Only `signal` and `justification` are always present; the remaining
/// fields are required or ignored depending on the signal, and the engine
/// rejects entries whose required fields are missing rather than guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub signal: DecisionSignal,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub target: Option<Decimal>,
    #[serde(default)]
    pub stop: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(default)]
    pub confidence: Option<Decimal>,
    #[serde(default)]
    pub risk_amount: Option<Decimal>,
    #[serde(default)]
    pub invalidation_condition: Option<String>,
    pub justification: String,
}

/// What became of a consulted decision. Every consultation appends exactly
/// one `DecisionRecord`, so rejections and holds are as auditable as fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Opened,
    Closed,
    Held,
    Rejected,
}

/// One append-only row in the decision ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub signal: DecisionSignal,
    pub side: Option<Side>,
    pub price: Decimal,
    pub confidence: Option<Decimal>,
    pub outcome: DecisionOutcome,
    /// Populated when `outcome` is `Rejected`.
    pub reject_reason: Option<String>,
    /// Unrealized PnL snapshot at decision time, for hold rows on an open position.
    pub unrealized_pnl: Option<Decimal>,
    pub justification: String,
}

/// One append-only row in the trade-history ledger, written when a position
/// reaches its terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub leverage: u32,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub holding_secs: i64,
    /// PnL before fees.
    pub gross_pnl: Decimal,
    /// PnL net of both fee legs; the whole-trade economic result.
    pub net_pnl: Decimal,
    pub entry_fee: Decimal,
    pub exit_fee: Decimal,
    pub exit_reason: ExitReason,
}

/// One append-only row in the equity ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// An order intent forwarded to the live exchange when a simulated position
/// opens. Forwarding is best-effort and never affects simulated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub leverage: u32,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// The companion intent forwarded when a simulated position closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseIntent {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_minimal_hold() {
        let d: Decision =
            serde_json::from_str(r#"{"signal":"hold","justification":"no setup"}"#).unwrap();
        assert_eq!(d.signal, DecisionSignal::Hold);
        assert!(d.side.is_none());
    }

    #[test]
    fn decision_rejects_unknown_signal() {
        let result = serde_json::from_str::<Decision>(
            r#"{"signal":"yolo","justification":"?"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn decision_rejects_missing_justification() {
        let result = serde_json::from_str::<Decision>(r#"{"signal":"hold"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn exit_reason_ledger_strings() {
        assert_eq!(ExitReason::SlHit.as_str(), "sl_hit");
        assert_eq!(ExitReason::StructureBreak.as_str(), "structure_break");
    }
}
