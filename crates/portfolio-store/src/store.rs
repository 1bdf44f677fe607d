use crate::error::StoreError;
use crate::portfolio::Portfolio;
use chrono::{DateTime, Utc};
use core_types::{DecisionRecord, EquityPoint, TradeRecord};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const PORTFOLIO_FILE: &str = "portfolio.json";
const DECISIONS_FILE: &str = "decisions.jsonl";
const TRADES_FILE: &str = "trades.jsonl";
const EQUITY_FILE: &str = "equity.jsonl";

/// Durable persistence for one portfolio and its ledgers, rooted at a
/// directory: the live state dir in live mode, a run-scoped artifact dir in
/// replay mode.
#[derive(Debug, Clone)]
pub struct PortfolioStore {
    dir: PathBuf,
    starting_capital: Decimal,
}

impl PortfolioStore {
    /// Creates the store, making the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, starting_capital: Decimal) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            starting_capital,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the persisted portfolio. A missing file initializes a fresh
    /// portfolio with the starting capital; this is the only implicit
    /// creation path. A corrupt file is a persistence error, not a reset.
    pub fn load(&self) -> Result<Portfolio, StoreError> {
        let path = self.dir.join(PORTFOLIO_FILE);
        if !path.exists() {
            tracing::info!(
                dir = %self.dir.display(),
                capital = %self.starting_capital,
                "no persisted portfolio found, initializing fresh state"
            );
            return Ok(Portfolio::new(self.starting_capital));
        }

        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Atomically persists the full portfolio snapshot: the JSON is written
    /// to a temp sibling and renamed over the live file, so readers never
    /// observe a torn write.
    pub fn save(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        let path = self.dir.join(PORTFOLIO_FILE);
        let tmp = self.dir.join(format!("{PORTFOLIO_FILE}.tmp"));

        let json = serde_json::to_string_pretty(portfolio)?;
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Appends one row to the decision ledger.
    pub fn append_decision_record(&self, record: &DecisionRecord) -> Result<(), StoreError> {
        self.append_line(DECISIONS_FILE, record)
    }

    /// Appends one terminal row to the trade-history ledger.
    pub fn append_trade_record(&self, record: &TradeRecord) -> Result<(), StoreError> {
        self.append_line(TRADES_FILE, record)
    }

    /// Appends one observation to the equity ledger.
    pub fn append_equity_snapshot(
        &self,
        timestamp: DateTime<Utc>,
        equity: Decimal,
    ) -> Result<(), StoreError> {
        self.append_line(EQUITY_FILE, &EquityPoint { timestamp, equity })
    }

    pub fn read_decision_records(&self) -> Result<Vec<DecisionRecord>, StoreError> {
        self.read_lines(DECISIONS_FILE)
    }

    pub fn read_trade_records(&self) -> Result<Vec<TradeRecord>, StoreError> {
        self.read_lines(TRADES_FILE)
    }

    pub fn read_equity_curve(&self) -> Result<Vec<EquityPoint>, StoreError> {
        self.read_lines(EQUITY_FILE)
    }

    /// Checks the reconciliation property: starting capital plus the trade
    /// ledger's net PnLs must equal the persisted balance when no positions
    /// are open. Returns the reconstructed balance for reporting.
    pub fn reconcile(&self, portfolio: &Portfolio) -> Result<Decimal, StoreError> {
        let trades = self.read_trade_records()?;
        let reconstructed = Portfolio::reconstructed_balance(self.starting_capital, &trades);
        if portfolio.open_positions().count() == 0 && reconstructed != portfolio.balance() {
            tracing::error!(
                persisted = %portfolio.balance(),
                reconstructed = %reconstructed,
                "trade ledger does not reconcile with the persisted balance"
            );
        }
        Ok(reconstructed)
    }

    fn append_line<T: Serialize>(&self, file_name: &str, record: &T) -> Result<(), StoreError> {
        let path = self.dir.join(file_name);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn read_lines<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{ExitReason, Position, Side};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn store() -> (tempfile::TempDir, PortfolioStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PortfolioStore::new(dir.path().join("state"), dec!(10000)).unwrap();
        (dir, store)
    }

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
            invalidation_condition: String::new(),
            opened_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn load_initializes_fresh_state_when_absent() {
        let (_guard, store) = store();
        let portfolio = store.load().unwrap();
        assert_eq!(portfolio.balance(), dec!(10000));
        assert_eq!(portfolio.open_positions().count(), 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_guard, store) = store();
        let mut portfolio = store.load().unwrap();
        portfolio.apply_open(eth_long()).unwrap();
        store.save(&portfolio).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, portfolio);
        assert_eq!(reloaded.position("ETHUSDT").unwrap().margin, dec!(900));
    }

    #[test]
    fn corrupt_snapshot_is_an_error_not_a_reset() {
        let (_guard, store) = store();
        fs::write(store.dir().join("portfolio.json"), "{not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn ledgers_append_in_order() {
        let (_guard, store) = store();
        for i in 0..3 {
            store
                .append_equity_snapshot(
                    Utc.timestamp_opt(1_700_000_000 + i * 900, 0).unwrap(),
                    dec!(10000) + Decimal::from(i),
                )
                .unwrap();
        }
        let curve = store.read_equity_curve().unwrap();
        assert_eq!(curve.len(), 3);
        assert!(curve.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn trade_ledger_reconciles_with_balance() {
        let (_guard, store) = store();
        let mut portfolio = store.load().unwrap();
        portfolio.apply_open(eth_long()).unwrap();

        let exit_fee = dec!(2880) * dec!(1.5) * dec!(0.0004);
        let (position, gross, net) =
            portfolio.apply_close("ETHUSDT", dec!(2880), exit_fee).unwrap();
        store
            .append_trade_record(&TradeRecord {
                trade_id: Uuid::new_v4(),
                symbol: position.symbol.clone(),
                side: position.side,
                quantity: position.quantity,
                leverage: position.leverage,
                entry_price: position.entry_price,
                exit_price: dec!(2880),
                opened_at: position.opened_at,
                closed_at: position.opened_at,
                holding_secs: 0,
                gross_pnl: gross,
                net_pnl: net,
                entry_fee: position.entry_fee,
                exit_fee,
                exit_reason: ExitReason::SlHit,
            })
            .unwrap();
        store.save(&portfolio).unwrap();

        let reconstructed = store.reconcile(&portfolio).unwrap();
        assert_eq!(reconstructed, portfolio.balance());
    }
}
