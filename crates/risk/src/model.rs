use crate::error::RiskError;
use core_types::Position;
use rust_decimal::Decimal;

/// The fee charged on one leg of a trade: notional * rate.
///
/// Used identically for entry and exit legs; maker and taker rates are
/// configured independently and passed in by the caller.
pub fn fee(notional: Decimal, rate: Decimal) -> Decimal {
    notional * rate
}

/// The margin committed for a position: quantity * price / leverage.
pub fn margin(quantity: Decimal, price: Decimal, leverage: u32) -> Result<Decimal, RiskError> {
    if leverage < 1 {
        return Err(RiskError::InvalidLeverage(leverage));
    }
    Ok(quantity * price / Decimal::from(leverage))
}

/// PnL of an open position at `current_price`, before fees.
pub fn unrealized_pnl(position: &Position, current_price: Decimal) -> Decimal {
    (current_price - position.entry_price) * position.quantity * position.side.sign()
}

/// The whole-trade result at `exit_price`: gross PnL minus both fee legs.
///
/// The entry fee is read from the position (it was determined, and debited,
/// at open time); the exit fee depends on the exit leg and is passed in.
pub fn realized_pnl(position: &Position, exit_price: Decimal, exit_fee: Decimal) -> Decimal {
    unrealized_pnl(position, exit_price) - position.entry_fee - exit_fee
}
