use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::CoinTrackerError;
use crate::notify::ChatTransport;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramTransport {
    client: Client,
    token: String,
}

impl TelegramTransport {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, CoinTrackerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send(&self, owner: &str, message: &str) -> Result<(), CoinTrackerError> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_URL, self.token);
        let body = serde_json::json!({
            "chat_id": owner,
            "text": message,
            "parse_mode": "Markdown",
        });
        let response: SendMessageResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        if !response.ok {
            return Err(CoinTrackerError::Delivery(
                response
                    .description
                    .unwrap_or_else(|| "telegram rejected the message".to_string()),
            ));
        }
        Ok(())
    }
}
