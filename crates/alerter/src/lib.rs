use crate::error::AlerterError;
use configuration::TelegramConfig;
use core_types::{Position, TradeRecord};
use reqwest::Client;
use serde::Serialize;

pub mod error;

/// The JSON payload for the Telegram `sendMessage` endpoint.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// A client for sending trade notifications to the Telegram Bot API.
///
/// Dispatch is strictly best-effort and happens only after the state store
/// has persisted the transition; a delivery failure is logged by the caller
/// and never affects portfolio state.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    /// Creates a new `TelegramAlerter`.
    ///
    /// Returns `None` if the token or chat_id is missing from the
    /// configuration, allowing the system to gracefully disable alerting.
    pub fn new(config: &TelegramConfig) -> Option<Self> {
        if config.token.is_empty() || config.chat_id.is_empty() {
            tracing::warn!("Telegram alerter is not configured (missing token or chat_id).");
            return None;
        }
        Some(Self {
            client: Client::new(),
            token: config.token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Sends a text message to the configured Telegram chat.
    pub async fn send_message(&self, message: &str) -> Result<(), AlerterError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to decode error response".to_string());
            return Err(AlerterError::ApiError(error_text));
        }

        Ok(())
    }

    /// Notifies that a position was opened.
    pub async fn notify_open(&self, position: &Position) -> Result<(), AlerterError> {
        let message = format!(
            "📈 *{:?} {}* opened\n`{}` @ `{}` \\({}x\\)\nstop `{}` / target `{}`",
            position.side,
            escape_markdown(&position.symbol),
            position.quantity,
            position.entry_price,
            position.leverage,
            position.stop_loss,
            position.take_profit,
        );
        self.send_message(&message).await
    }

    /// Notifies that a position was closed, with its terminal result.
    pub async fn notify_close(&self, trade: &TradeRecord) -> Result<(), AlerterError> {
        let icon = if trade.net_pnl.is_sign_positive() { "✅" } else { "🔻" };
        let message = format!(
            "{} *{}* closed \\({}\\)\nentry `{}` → exit `{}`\nnet PnL `{}`",
            icon,
            escape_markdown(&trade.symbol),
            escape_markdown(trade.exit_reason.as_str()),
            trade.entry_price,
            trade.exit_price,
            trade.net_pnl,
        );
        self.send_message(&message).await
    }
}

/// Escapes characters that have special meaning in Telegram's MarkdownV2.
fn escape_markdown(text: &str) -> String {
    let special_chars = r"_*[]()~`>#+-=|{}.!";
    special_chars
        .chars()
        .fold(text.to_string(), |s, c| s.replace(c, &format!("\\{}", c)))
}
