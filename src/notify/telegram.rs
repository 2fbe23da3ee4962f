use super::Channel;
use crate::CrawlerError;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends every message to each recipient chat through the Bot API.
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
    token: String,
    recipients: Vec<String>,
}

impl TelegramChannel {
    pub fn new(token: String, recipients: Vec<String>) -> Self {
        Self::with_api_base(API_BASE, token, recipients)
    }

    pub fn with_api_base(api_base: &str, token: String, recipients: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            recipients,
        }
    }

    async fn send_to(&self, chat_id: &str, text: &str) -> Result<(), CrawlerError> {
        let message = SendMessage {
            chat_id,
            text,
            disable_web_page_preview: true,
        };
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_base, self.token))
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        let reply: TelegramResponse = response.json().await?;
        if !reply.ok {
            let reason = reply.description.unwrap_or_else(|| status.to_string());
            error!("Telegram rejected message for {}: {}", chat_id, reason);
            return Err(CrawlerError::NotifyError(reason));
        }

        debug!("Telegram message sent to {}", chat_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Channel for TelegramChannel {
    async fn send(&self, text: &str) -> Result<(), CrawlerError> {
        // Every recipient is tried, the first failure is reported.
        let mut result = Ok(());
        for chat_id in &self.recipients {
            if let Err(e) = self.send_to(chat_id, text).await {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}
