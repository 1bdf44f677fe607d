use crate::error::EngineError;
use async_trait::async_trait;
use configuration::LlmConfig;
use core_types::Decision;
use market_data::MarketSnapshot;
use portfolio_store::Portfolio;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// The external decision producer: maps the current market view and
/// portfolio state to at most one `Decision` per symbol.
///
/// The engine treats the source as opaque. A failure here abandons the
/// iteration (positions are left untouched and re-evaluated next tick), and
/// malformed output is rejected rather than repaired.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    async fn decide(
        &self,
        snapshots: &HashMap<String, MarketSnapshot>,
        portfolio: &Portfolio,
    ) -> Result<HashMap<String, Decision>, EngineError>;
}

const SYSTEM_PROMPT: &str = "You are the trade decision module of a leveraged \
crypto portfolio. For every symbol in the payload reply with a JSON object \
mapping symbol to a decision: {\"signal\": \"entry\"|\"hold\"|\"close\", \
\"side\": \"long\"|\"short\", \"quantity\": number, \"target\": number, \
\"stop\": number, \"leverage\": integer, \"confidence\": number 0-1, \
\"risk_amount\": number, \"invalidation_condition\": string, \
\"justification\": string}. Entries must carry side, quantity, stop, target \
and leverage. Reply with JSON only.";

/// A `DecisionSource` backed by a chat-completions LLM endpoint.
pub struct LlmDecisionSource {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl LlmDecisionSource {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Condenses the snapshots and portfolio into the user-message payload.
    ///
    /// The model sees recent execution closes, the trend indicators, the
    /// tracked swing levels, and the current account state. It never sees
    /// anything the exit evaluator does not also see.
    fn build_payload(
        snapshots: &HashMap<String, MarketSnapshot>,
        portfolio: &Portfolio,
    ) -> serde_json::Value {
        let markets: serde_json::Map<String, serde_json::Value> = snapshots
            .iter()
            .map(|(symbol, snap)| {
                let recent_closes: Vec<Decimal> = snap
                    .execution
                    .klines
                    .iter()
                    .rev()
                    .take(20)
                    .rev()
                    .map(|k| k.close)
                    .collect();
                let value = json!({
                    "price": snap.price(),
                    "recent_closes": recent_closes,
                    "trend_ema": snap.trend.last_ema(),
                    "trend_rsi": snap.trend.last_rsi(),
                    "swing_high": snap.structure.last_swing_high(20),
                    "swing_low": snap.structure.last_swing_low(20),
                    "funding_rate": snap.funding_rate,
                    "open_interest": snap.open_interest,
                });
                (symbol.clone(), value)
            })
            .collect();

        let positions: Vec<serde_json::Value> = portfolio
            .open_positions()
            .map(|p| {
                json!({
                    "symbol": p.symbol,
                    "side": p.side,
                    "entry_price": p.entry_price,
                    "quantity": p.quantity,
                    "stop_loss": p.stop_loss,
                    "take_profit": p.take_profit,
                    "invalidation_condition": p.invalidation_condition,
                })
            })
            .collect();

        json!({
            "markets": markets,
            "balance": portfolio.balance(),
            "open_positions": positions,
        })
    }

    /// Strips a Markdown code fence if the model wrapped its JSON in one.
    fn strip_code_fence(content: &str) -> &str {
        let trimmed = content.trim();
        let Some(inner) = trimmed.strip_prefix("```") else {
            return trimmed;
        };
        let inner = inner.strip_prefix("json").unwrap_or(inner);
        inner.strip_suffix("```").unwrap_or(inner).trim()
    }

    fn parse_decisions(content: &str) -> Result<HashMap<String, Decision>, EngineError> {
        let cleaned = Self::strip_code_fence(content);
        serde_json::from_str(cleaned)
            .map_err(|e| EngineError::MalformedDecision(format!("{e}: {cleaned}")))
    }
}

#[async_trait]
impl DecisionSource for LlmDecisionSource {
    async fn decide(
        &self,
        snapshots: &HashMap<String, MarketSnapshot>,
        portfolio: &Portfolio,
    ) -> Result<HashMap<String, Decision>, EngineError> {
        let payload = Self::build_payload(snapshots, portfolio);

        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": payload.to_string()},
            ],
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::DecisionSource(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::DecisionSource(format!(
                "decision endpoint returned {}",
                response.status()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::DecisionSource(e.to_string()))?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| EngineError::MalformedDecision("empty choices array".to_string()))?;

        Self::parse_decisions(content)
    }
}

/// A `DecisionSource` that replays a fixed per-iteration script. Used by the
/// test suites and for deterministic replay experiments.
pub struct ScriptedDecisionSource {
    steps: Mutex<VecDeque<HashMap<String, Decision>>>,
}

impl ScriptedDecisionSource {
    pub fn new(steps: Vec<HashMap<String, Decision>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
        }
    }

    /// A source that always answers with no decisions.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecisionSource {
    async fn decide(
        &self,
        _snapshots: &HashMap<String, MarketSnapshot>,
        _portfolio: &Portfolio,
    ) -> Result<HashMap<String, Decision>, EngineError> {
        let mut steps = self.steps.lock().expect("script mutex poisoned");
        Ok(steps.pop_front().unwrap_or_default())
    }
}
