use crate::error::StoreError;
use core_types::{Position, TradeRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The single source of truth for account state: cash balance, open
/// positions, and cumulative totals.
///
/// Equity is always recomputed from balance plus margins plus unrealized
/// PnL; it is never stored, so it can never drift from its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    balance: Decimal,
    positions: HashMap<String, Position>,
    realized_pnl: Decimal,
    fees_paid: Decimal,
}

impl Portfolio {
    /// Creates a fresh portfolio with the configured starting capital.
    pub fn new(starting_capital: Decimal) -> Self {
        Self {
            balance: starting_capital,
            positions: HashMap::new(),
            realized_pnl: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn fees_paid(&self) -> Decimal {
        self.fees_paid
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Open symbols in sorted order, so iteration over positions is
    /// deterministic and live/replay ledgers stay byte-identical.
    pub fn open_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.positions.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Equity at the given mark prices: balance + committed margins +
    /// unrealized PnL of every open position.
    pub fn equity(&self, marks: &HashMap<String, Decimal>) -> Result<Decimal, StoreError> {
        let mut equity = self.balance;
        for (symbol, position) in &self.positions {
            let mark = marks
                .get(symbol)
                .ok_or_else(|| StoreError::MissingPrice(symbol.clone()))?;
            equity += position.margin + risk::unrealized_pnl(position, *mark);
        }
        Ok(equity)
    }

    /// Commits an entry: debits margin plus entry fee and records the
    /// position. The engine has already validated the decision; the checks
    /// here uphold the store's own invariants.
    pub fn apply_open(&mut self, position: Position) -> Result<(), StoreError> {
        if self.positions.contains_key(&position.symbol) {
            return Err(StoreError::PositionAlreadyOpen(position.symbol));
        }

        let required = position.margin + position.entry_fee;
        if required > self.balance {
            return Err(StoreError::InsufficientBalance {
                required: required.to_string(),
                available: self.balance.to_string(),
            });
        }

        self.balance -= required;
        self.fees_paid += position.entry_fee;
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// Commits a full close at `exit_price`: releases the margin, settles
    /// the gross PnL less the exit fee, and removes the position.
    ///
    /// Returns the closed position with its gross and net PnL. The entry fee
    /// was already debited at open, so only the exit fee is charged here;
    /// `net` nevertheless reports the whole-trade result including both legs,
    /// which is what the trade ledger records.
    pub fn apply_close(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        exit_fee: Decimal,
    ) -> Result<(Position, Decimal, Decimal), StoreError> {
        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| StoreError::PositionNotFound(symbol.to_string()))?;

        let gross = risk::unrealized_pnl(&position, exit_price);
        let net = risk::realized_pnl(&position, exit_price, exit_fee);

        self.balance += position.margin + gross - exit_fee;
        self.realized_pnl += net;
        self.fees_paid += exit_fee;

        Ok((position, gross, net))
    }

    /// Replays a trade ledger from starting capital. With no open positions
    /// the result must equal the persisted balance; the store uses this as a
    /// reconciliation check and the tests as a correctness property.
    pub fn reconstructed_balance(starting_capital: Decimal, trades: &[TradeRecord]) -> Decimal {
        starting_capital + trades.iter().map(|t| t.net_pnl).sum::<Decimal>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::Side;
    use rust_decimal_macros::dec;

    fn eth_long() -> Position {
        Position {
            symbol: "ETHUSDT".to_string(),
            side: Side::Long,
            entry_price: dec!(3000),
            quantity: dec!(1.5),
            leverage: 5,
            stop_loss: dec!(2880),
            take_profit: dec!(3150),
            margin: dec!(900),
            entry_fee: dec!(1.8),
            risk_amount: dec!(180),
            invalidation_condition: "1h close below 2880".to_string(),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn open_debits_margin_and_fee() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio.apply_open(eth_long()).unwrap();
        assert_eq!(portfolio.balance(), dec!(10000) - dec!(900) - dec!(1.8));
        assert_eq!(portfolio.fees_paid(), dec!(1.8));
        assert!(portfolio.position("ETHUSDT").is_some());
    }

    #[test]
    fn second_open_same_symbol_rejected() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio.apply_open(eth_long()).unwrap();
        assert!(matches!(
            portfolio.apply_open(eth_long()),
            Err(StoreError::PositionAlreadyOpen(_))
        ));
    }

    #[test]
    fn open_rejected_when_margin_exceeds_balance() {
        let mut portfolio = Portfolio::new(dec!(500));
        assert!(matches!(
            portfolio.apply_open(eth_long()),
            Err(StoreError::InsufficientBalance { .. })
        ));
        assert_eq!(portfolio.balance(), dec!(500));
    }

    #[test]
    fn close_round_trip_balance_identity() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio.apply_open(eth_long()).unwrap();

        let exit_fee = dec!(2880) * dec!(1.5) * dec!(0.0004);
        let (position, gross, net) = portfolio.apply_close("ETHUSDT", dec!(2880), exit_fee).unwrap();

        assert_eq!(gross, dec!(-180));
        assert_eq!(net, dec!(-180) - dec!(1.8) - exit_fee);
        assert_eq!(position.symbol, "ETHUSDT");
        // The whole round trip moved the balance by exactly net.
        assert_eq!(portfolio.balance(), dec!(10000) + net);
        assert!(portfolio.position("ETHUSDT").is_none());
        assert_eq!(portfolio.realized_pnl(), net);
    }

    #[test]
    fn equity_is_conserved_across_a_close_up_to_the_exit_fee() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio.apply_open(eth_long()).unwrap();

        let marks = HashMap::from([("ETHUSDT".to_string(), dec!(3100))]);
        let equity_before = portfolio.equity(&marks).unwrap();

        let exit_fee = dec!(3100) * dec!(1.5) * dec!(0.0004);
        portfolio.apply_close("ETHUSDT", dec!(3100), exit_fee).unwrap();
        let equity_after = portfolio.equity(&marks).unwrap();

        assert_eq!(equity_before - equity_after, exit_fee);
    }

    #[test]
    fn equity_requires_a_mark_for_every_open_symbol() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio.apply_open(eth_long()).unwrap();
        assert!(matches!(
            portfolio.equity(&HashMap::new()),
            Err(StoreError::MissingPrice(_))
        ));
    }
}
