use crate::error::{EngineError, RejectReason};
use alerter::TelegramAlerter;
use api_client::ExchangeClient;
use clock::TimeProvider;
use configuration::{RiskManagement, Simulation};
use core_types::{
    CloseIntent, Decision, DecisionOutcome, DecisionRecord, DecisionSignal, ExitReason,
    OrderIntent, Position, TradeRecord,
};
use portfolio_store::{Portfolio, PortfolioStore};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The trade execution engine: validates decisions against the risk policy
/// and drives every position through its NONE -> OPEN -> CLOSED lifecycle.
///
/// All state mutation goes through the portfolio store's methods and is
/// persisted before it counts as committed. Live forwarding and notification
/// run strictly after persistence and are best-effort.
pub struct TradeEngine {
    store: PortfolioStore,
    portfolio: Portfolio,
    risk_policy: RiskManagement,
    fees: Simulation,
    clock: Arc<dyn TimeProvider>,
    forwarder: Option<Arc<dyn ExchangeClient>>,
    alerter: Option<TelegramAlerter>,
}

impl TradeEngine {
    /// Creates the engine, loading (or initializing) the persisted portfolio.
    pub fn new(
        store: PortfolioStore,
        risk_policy: RiskManagement,
        fees: Simulation,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<Self, EngineError> {
        let portfolio = store.load()?;
        Ok(Self {
            store,
            portfolio,
            risk_policy,
            fees,
            clock,
            forwarder: None,
            alerter: None,
        })
    }

    /// Attaches a live-forwarding exchange client. Its failures never roll
    /// back simulated state.
    pub fn with_forwarder(mut self, forwarder: Arc<dyn ExchangeClient>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Attaches the Telegram alerter for post-persistence notifications.
    pub fn with_alerter(mut self, alerter: TelegramAlerter) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn store(&self) -> &PortfolioStore {
        &self.store
    }

    /// Applies one consulted decision. Every call appends exactly one row to
    /// the decision ledger, whatever the outcome.
    pub async fn apply_decision(
        &mut self,
        symbol: &str,
        decision: &Decision,
        price: Decimal,
        marks: &HashMap<String, Decimal>,
    ) -> Result<(), EngineError> {
        match decision.signal {
            DecisionSignal::Entry => match self.validate_entry(symbol, decision, price, marks) {
                Ok(position) => {
                    self.portfolio.apply_open(position.clone())?;
                    self.store.save(&self.portfolio)?;
                    self.append_decision_row(
                        symbol,
                        decision,
                        price,
                        DecisionOutcome::Opened,
                        None,
                        None,
                    )?;
                    tracing::info!(
                        symbol,
                        side = ?position.side,
                        quantity = %position.quantity,
                        entry = %position.entry_price,
                        stop = %position.stop_loss,
                        target = %position.take_profit,
                        leverage = position.leverage,
                        "position opened"
                    );

                    self.forward_open(&position).await;
                    self.notify_open(&position).await;
                }
                Err(reason) => {
                    tracing::info!(symbol, %reason, "entry decision rejected");
                    self.append_decision_row(
                        symbol,
                        decision,
                        price,
                        DecisionOutcome::Rejected,
                        Some(reason.to_string()),
                        None,
                    )?;
                }
            },
            DecisionSignal::Hold => {
                let unrealized = self
                    .portfolio
                    .position(symbol)
                    .map(|p| risk::unrealized_pnl(p, price));
                self.append_decision_row(
                    symbol,
                    decision,
                    price,
                    DecisionOutcome::Held,
                    None,
                    unrealized,
                )?;
            }
            DecisionSignal::Close => {
                if self.portfolio.position(symbol).is_some() {
                    self.close_position(symbol, price, ExitReason::DecisionClose)
                        .await?;
                    self.append_decision_row(
                        symbol,
                        decision,
                        price,
                        DecisionOutcome::Closed,
                        None,
                        None,
                    )?;
                } else {
                    let reason = RejectReason::PositionNotFound;
                    tracing::info!(symbol, %reason, "close decision rejected");
                    self.append_decision_row(
                        symbol,
                        decision,
                        price,
                        DecisionOutcome::Rejected,
                        Some(reason.to_string()),
                        None,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Closes an open position in full at `exit_price` and appends the
    /// terminal trade record. Used for both decision closes and evaluator
    /// exits.
    pub async fn close_position(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        reason: ExitReason,
    ) -> Result<TradeRecord, EngineError> {
        let now = self.clock.now();
        let quantity = self
            .portfolio
            .position(symbol)
            .map(|p| p.quantity)
            .ok_or_else(|| {
                EngineError::Store(portfolio_store::StoreError::PositionNotFound(
                    symbol.to_string(),
                ))
            })?;

        let exit_fee = risk::fee(exit_price * quantity, self.fees.taker_fee_pct);
        let (position, gross, net) = self.portfolio.apply_close(symbol, exit_price, exit_fee)?;
        self.store.save(&self.portfolio)?;

        // Name-based id: replaying an identical bar-and-decision sequence
        // must yield a byte-identical trade ledger.
        let trade_id = Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!(
                "{}:{}:{}:{}",
                position.symbol,
                position.opened_at.timestamp_millis(),
                now.timestamp_millis(),
                exit_price
            )
            .as_bytes(),
        );

        let record = TradeRecord {
            trade_id,
            symbol: position.symbol.clone(),
            side: position.side,
            quantity: position.quantity,
            leverage: position.leverage,
            entry_price: position.entry_price,
            exit_price,
            opened_at: position.opened_at,
            closed_at: now,
            holding_secs: (now - position.opened_at).num_seconds(),
            gross_pnl: gross,
            net_pnl: net,
            entry_fee: position.entry_fee,
            exit_fee,
            exit_reason: reason,
        };
        self.store.append_trade_record(&record)?;

        tracing::info!(
            symbol,
            reason = reason.as_str(),
            exit = %exit_price,
            gross = %gross,
            net = %net,
            "position closed"
        );

        self.forward_close(&position).await;
        self.notify_close(&record).await;

        Ok(record)
    }

    /// Appends the iteration's equity observation.
    pub fn record_equity(
        &mut self,
        marks: &HashMap<String, Decimal>,
    ) -> Result<Decimal, EngineError> {
        let equity = self.portfolio.equity(marks)?;
        self.store.append_equity_snapshot(self.clock.now(), equity)?;
        Ok(equity)
    }

    /// Runs the entry gate in its fixed order. The first failed check wins,
    /// so ledger reject reasons are deterministic.
    fn validate_entry(
        &self,
        symbol: &str,
        decision: &Decision,
        price: Decimal,
        marks: &HashMap<String, Decimal>,
    ) -> Result<Position, RejectReason> {
        // 1. At most one open position per symbol.
        if self.portfolio.position(symbol).is_some() {
            return Err(RejectReason::PositionAlreadyOpen);
        }

        // 2. Required fields, then stop/target consistency with the side.
        let side = decision
            .side
            .ok_or_else(|| RejectReason::MalformedDecision("side".to_string()))?;
        let quantity = decision
            .quantity
            .filter(|q| *q > Decimal::ZERO)
            .ok_or_else(|| RejectReason::MalformedDecision("quantity".to_string()))?;
        let leverage = decision
            .leverage
            .ok_or_else(|| RejectReason::MalformedDecision("leverage".to_string()))?;
        let stop = decision.stop.ok_or(RejectReason::MissingStopLoss)?;
        let target = decision
            .target
            .ok_or_else(|| RejectReason::MalformedDecision("target".to_string()))?;

        match side {
            core_types::Side::Long => {
                if stop >= price {
                    return Err(RejectReason::InvalidStopLoss(format!(
                        "long stop {stop} must be below entry {price}"
                    )));
                }
                if target <= price {
                    return Err(RejectReason::InvalidTakeProfit(format!(
                        "long target {target} must be above entry {price}"
                    )));
                }
            }
            core_types::Side::Short => {
                if stop <= price {
                    return Err(RejectReason::InvalidStopLoss(format!(
                        "short stop {stop} must be above entry {price}"
                    )));
                }
                if target >= price {
                    return Err(RejectReason::InvalidTakeProfit(format!(
                        "short target {target} must be below entry {price}"
                    )));
                }
            }
        }

        // 3. Implied risk against the equity-scaled limit.
        let risk_amount = (price - stop).abs() * quantity;
        let equity = self
            .portfolio
            .equity(marks)
            .map_err(|e| RejectReason::MalformedDecision(e.to_string()))?;
        let risk_limit = self.risk_policy.max_risk_pct * equity;
        if risk_amount > risk_limit {
            return Err(RejectReason::RiskLimitExceeded {
                risk: risk_amount.to_string(),
                limit: risk_limit.to_string(),
            });
        }

        // 4. Margin plus entry fee against the free balance.
        let margin = risk::margin(quantity, price, leverage)
            .map_err(|_| RejectReason::InvalidLeverage(leverage))?;
        let entry_fee = risk::fee(quantity * price, self.fees.taker_fee_pct);
        if margin + entry_fee > self.portfolio.balance() {
            return Err(RejectReason::InsufficientMargin {
                required: (margin + entry_fee).to_string(),
                available: self.portfolio.balance().to_string(),
            });
        }

        // 5. Leverage within the configured bounds.
        if leverage < self.risk_policy.min_leverage || leverage > self.risk_policy.max_leverage {
            return Err(RejectReason::InvalidLeverage(leverage));
        }

        Ok(Position {
            symbol: symbol.to_string(),
            side,
            entry_price: price,
            quantity,
            leverage,
            stop_loss: stop,
            take_profit: target,
            margin,
            entry_fee,
            risk_amount,
            invalidation_condition: decision.invalidation_condition.clone().unwrap_or_default(),
            opened_at: self.clock.now(),
        })
    }

    fn append_decision_row(
        &self,
        symbol: &str,
        decision: &Decision,
        price: Decimal,
        outcome: DecisionOutcome,
        reject_reason: Option<String>,
        unrealized_pnl: Option<Decimal>,
    ) -> Result<(), EngineError> {
        self.store.append_decision_record(&DecisionRecord {
            timestamp: self.clock.now(),
            symbol: symbol.to_string(),
            signal: decision.signal,
            side: decision.side,
            price,
            confidence: decision.confidence,
            outcome,
            reject_reason,
            unrealized_pnl,
            justification: decision.justification.clone(),
        })?;
        Ok(())
    }

    async fn forward_open(&self, position: &Position) {
        let Some(forwarder) = &self.forwarder else {
            return;
        };

        if let Err(e) = forwarder
            .set_leverage(&position.symbol, position.leverage)
            .await
        {
            tracing::warn!(symbol = %position.symbol, error = %e, "leverage forwarding failed");
        }

        let intent = OrderIntent {
            symbol: position.symbol.clone(),
            side: position.side,
            quantity: position.quantity,
            leverage: position.leverage,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
        };
        match forwarder.place_order(&intent).await {
            Ok(ack) => {
                tracing::info!(symbol = %position.symbol, order_id = ack.order_id, "order intent forwarded")
            }
            Err(e) => tracing::warn!(
                symbol = %position.symbol,
                error = %e,
                "order forwarding failed; simulated state is unaffected"
            ),
        }
    }

    async fn forward_close(&self, position: &Position) {
        let Some(forwarder) = &self.forwarder else {
            return;
        };

        let intent = CloseIntent {
            symbol: position.symbol.clone(),
            side: position.side,
            quantity: position.quantity,
        };
        match forwarder.close_position(&intent).await {
            Ok(ack) => {
                tracing::info!(symbol = %position.symbol, order_id = ack.order_id, "close intent forwarded")
            }
            Err(e) => tracing::warn!(
                symbol = %position.symbol,
                error = %e,
                "close forwarding failed; simulated state is unaffected"
            ),
        }
    }

    async fn notify_open(&self, position: &Position) {
        let Some(alerter) = &self.alerter else {
            return;
        };
        if let Err(e) = alerter.notify_open(position).await {
            tracing::warn!(symbol = %position.symbol, error = %e, "open notification failed");
        }
    }

    async fn notify_close(&self, record: &TradeRecord) {
        let Some(alerter) = &self.alerter else {
            return;
        };
        if let Err(e) = alerter.notify_close(record).await {
            tracing::warn!(symbol = %record.symbol, error = %e, "close notification failed");
        }
    }
}
