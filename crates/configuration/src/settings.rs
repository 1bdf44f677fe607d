use crate::error::ConfigError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineSettings,
    pub simulation: Simulation,
    pub risk_management: RiskManagement,
    pub exits: ExitSettings,
    pub paths: Paths,
    pub api: ApiConfig,
    pub llm: LlmConfig,
    pub telegram: TelegramConfig,
    pub backtest: BacktestDefaults,
}

/// Parameters of the iteration pipeline shared by live and replay mode.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// The symbols the engine trades (e.g., ["BTCUSDT", "ETHUSDT"]).
    pub symbols: Vec<String>,
    /// Execution timeframe; also the live iteration pace (e.g., "15m").
    pub interval: String,
    /// Intermediate timeframe used for swing/structure tracking (e.g., "1h").
    pub structure_interval: String,
    /// Highest timeframe used for trend-reversal detection (e.g., "4h").
    pub trend_interval: String,
    /// The starting capital a fresh portfolio is initialized with.
    pub starting_capital: Decimal,
}

/// Fee model parameters. These are policy values, not engine behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct Simulation {
    /// Fee rate applied to market ("taker") legs. 0.0004 corresponds to 0.04%.
    pub taker_fee_pct: Decimal,
    /// Fee rate applied to limit ("maker") legs.
    pub maker_fee_pct: Decimal,
}

/// Trade-level risk policy enforced by the execution engine.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskManagement {
    /// Max fraction of current equity a single trade may put at risk
    /// (|entry - stop| * quantity), e.g. 0.02 for 2%.
    pub max_risk_pct: Decimal,
    /// Lowest accepted leverage. Must be >= 1.
    pub min_leverage: u32,
    /// Highest accepted leverage.
    pub max_leverage: u32,
}

/// Parameters of the per-iteration exit evaluator.
#[derive(Debug, Clone, Deserialize)]
pub struct ExitSettings {
    /// Fraction of the stop distance around the stop level inside which only
    /// the stop/target themselves may close a position (e.g., 0.2).
    pub proximity_guard_pct: Decimal,
    /// How many structure-timeframe bars back to scan for swing extremes.
    pub swing_lookback: usize,
    /// Long-period moving average on the trend timeframe.
    pub trend_ma_period: usize,
    /// Momentum oscillator (RSI) period on the trend timeframe.
    pub rsi_period: usize,
}

/// Where durable state lives on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct Paths {
    /// Live-mode state directory (portfolio snapshot + ledgers).
    pub live_dir: PathBuf,
    /// Backtest base directory; run artifacts go into run-<id> below it.
    pub backtest_dir: PathBuf,
    /// Historical kline cache directory, shared across runs.
    pub cache_dir: PathBuf,
}

/// A single API key pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeys {
    pub key: String,
    pub secret: String,
}

/// Exchange API configuration for live forwarding.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// When false, order intents are logged but never forwarded.
    pub live_forwarding_enabled: bool,
    /// When true, forwarded orders go to the exchange testnet.
    pub use_testnet: bool,
    pub production: ApiKeys,
    pub testnet: ApiKeys,
}

/// The decision-source endpoint (an LLM consulted over a network API).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Chat-completions style endpoint URL.
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Telegram notification settings. Empty token disables alerting.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

/// Default window for `backtest` runs when not given on the command line.
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestDefaults {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Config {
    /// Rejects configurations that would make the risk policy nonsensical.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = Decimal::ONE;

        if self.engine.symbols.is_empty() {
            return Err(ConfigError::ValidationError(
                "engine.symbols must not be empty".to_string(),
            ));
        }
        if self.engine.starting_capital <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "engine.starting_capital must be positive".to_string(),
            ));
        }
        if self.risk_management.max_risk_pct <= Decimal::ZERO
            || self.risk_management.max_risk_pct >= unit
        {
            return Err(ConfigError::ValidationError(
                "risk_management.max_risk_pct must be between 0 and 1".to_string(),
            ));
        }
        if self.risk_management.min_leverage < 1 {
            return Err(ConfigError::ValidationError(
                "risk_management.min_leverage must be at least 1".to_string(),
            ));
        }
        if self.risk_management.max_leverage < self.risk_management.min_leverage {
            return Err(ConfigError::ValidationError(
                "risk_management.max_leverage must be >= min_leverage".to_string(),
            ));
        }
        for (name, rate) in [
            ("simulation.taker_fee_pct", self.simulation.taker_fee_pct),
            ("simulation.maker_fee_pct", self.simulation.maker_fee_pct),
        ] {
            if rate < Decimal::ZERO || rate >= unit {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be in [0, 1)"
                )));
            }
        }
        if self.exits.proximity_guard_pct < Decimal::ZERO
            || self.exits.proximity_guard_pct >= unit
        {
            return Err(ConfigError::ValidationError(
                "exits.proximity_guard_pct must be in [0, 1)".to_string(),
            ));
        }
        if self.backtest.start_date >= self.backtest.end_date {
            return Err(ConfigError::ValidationError(
                "backtest.start_date must precede end_date".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_config() -> Config {
        Config {
            engine: EngineSettings {
                symbols: vec!["ETHUSDT".to_string()],
                interval: "15m".to_string(),
                structure_interval: "1h".to_string(),
                trend_interval: "4h".to_string(),
                starting_capital: dec!(10000),
            },
            simulation: Simulation {
                taker_fee_pct: dec!(0.0004),
                maker_fee_pct: dec!(0.0002),
            },
            risk_management: RiskManagement {
                max_risk_pct: dec!(0.02),
                min_leverage: 1,
                max_leverage: 20,
            },
            exits: ExitSettings {
                proximity_guard_pct: dec!(0.2),
                swing_lookback: 10,
                trend_ma_period: 50,
                rsi_period: 14,
            },
            paths: Paths {
                live_dir: "data-live".into(),
                backtest_dir: "data-backtest".into(),
                cache_dir: "data-backtest/cache".into(),
            },
            api: ApiConfig {
                live_forwarding_enabled: false,
                use_testnet: true,
                production: ApiKeys {
                    key: String::new(),
                    secret: String::new(),
                },
                testnet: ApiKeys {
                    key: String::new(),
                    secret: String::new(),
                },
            },
            llm: LlmConfig {
                endpoint: "http://localhost:9999/v1/chat/completions".to_string(),
                model: "test".to_string(),
                api_key: String::new(),
                temperature: 0.2,
                max_tokens: 1024,
            },
            telegram: TelegramConfig {
                token: String::new(),
                chat_id: String::new(),
            },
            backtest: BacktestDefaults {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn risk_fraction_of_one_rejected() {
        let mut config = sample_config();
        config.risk_management.max_risk_pct = dec!(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_leverage_bounds_rejected() {
        let mut config = sample_config();
        config.risk_management.max_leverage = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_fee_rejected() {
        let mut config = sample_config();
        config.simulation.taker_fee_pct = dec!(-0.01);
        assert!(config.validate().is_err());
    }
}
