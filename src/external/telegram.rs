use crate::config::TelegramConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramService {
    client: Client,
    config: TelegramConfig,
}

impl TelegramService {
    pub fn new(config: TelegramConfig) -> Self {
        let client = Client::builder()
            .user_agent("sorteos-backend/telegram")
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.bot_token.is_empty()
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> AppResult<()> {
        if !self.is_enabled() {
            return Err(AppError::ConfigError("Telegram bot token not configured".into()));
        }
        let url = format!("{TELEGRAM_API}/bot{}/sendMessage", self.config.bot_token);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        let status = resp.status();
        let body: TelegramResponse = resp.json().await?;
        if !status.is_success() || !body.ok {
            return Err(AppError::ExternalApiError(format!(
                "Telegram sendMessage failed: HTTP {}: {}",
                status.as_u16(),
                body.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}
