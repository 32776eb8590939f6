// src/services/telegram.rs

//! Telegram Bot API client.
//!
//! Only the two methods the bot needs are wrapped: `sendMessage` for
//! notifications and replies, and `getUpdates` for operator commands.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::TelegramConfig;
use crate::services::{InlineAction, NotificationSink};

/// Envelope every Bot API response is wrapped in.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

/// One inbound update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

/// Inbound chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

/// Chat the message was sent in.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Minimal Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_root: String,
    long_poll: Duration,
}

impl TelegramClient {
    pub fn new(client: Client, config: &TelegramConfig) -> Self {
        Self {
            client,
            api_root: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            long_poll: Duration::from_secs(config.long_poll_secs),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_root, method)
    }

    /// Send an HTML message, optionally with URL buttons.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        actions: &[InlineAction],
    ) -> Result<()> {
        let mut form = vec![
            ("chat_id", chat_id.to_string()),
            ("text", text.to_string()),
            ("parse_mode", "HTML".to_string()),
            ("disable_web_page_preview", "true".to_string()),
        ];
        if let Some(markup) = reply_markup(actions) {
            form.push(("reply_markup", markup));
        }

        let body = self
            .client
            .post(self.method_url("sendMessage"))
            .form(&form)
            .send()
            .await?
            .text()
            .await?;

        decode::<serde_json::Value>("sendMessage", &body).map(|_| ())
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let mut query = vec![("timeout", self.long_poll.as_secs().to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let body = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            // Must outlast the server-side long poll.
            .timeout(self.long_poll + Duration::from_secs(20))
            .send()
            .await?
            .text()
            .await?;

        decode("getUpdates", &body)
    }
}

/// Inline keyboard with one URL button per row.
fn reply_markup(actions: &[InlineAction]) -> Option<String> {
    if actions.is_empty() {
        return None;
    }
    let rows: Vec<_> = actions
        .iter()
        .map(|a| json!([{ "text": a.text, "url": a.url }]))
        .collect();
    Some(json!({ "inline_keyboard": rows }).to_string())
}

fn decode<T: DeserializeOwned>(method: &str, body: &str) -> Result<T> {
    let response: ApiResponse<T> = serde_json::from_str(body)?;
    match (response.ok, response.result) {
        (true, Some(result)) => Ok(result),
        (_, _) => Err(AppError::telegram(
            method,
            response
                .description
                .unwrap_or_else(|| "no description".to_string()),
        )),
    }
}

#[async_trait]
impl NotificationSink for TelegramClient {
    async fn send(&self, destination: &str, text: &str, actions: &[InlineAction]) -> Result<()> {
        self.send_message(destination, text, actions).await
    }
}
