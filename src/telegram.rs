//! Telegram Bot API transport: long polling for updates and replying with
//! `sendMessage`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::pipeline::{InboundMessage, ReplySink, RequestHandler};

const RETRY_PAUSE: Duration = Duration::from_secs(3);

/// Longest text the Bot API accepts in one `sendMessage`, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
}

impl Message {
    /// Text messages become inbound events; stickers, photos and the like
    /// are ignored.
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        let text = self.text.as_ref()?;
        Some(InboundMessage {
            user_id: self.from.as_ref().map(|u| u.id).unwrap_or(self.chat.id),
            text: text.clone(),
        })
    }
}

pub struct TelegramClient {
    client: Client,
    base: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, token: &str) -> Result<Self> {
        // Long polls hold the connection open for poll_timeout_secs.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            client,
            base: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}/{}", self.base, method);
        let response: ApiResponse<T> = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Telegram {} request failed", method))?
            .json()
            .await
            .with_context(|| format!("Telegram {} returned malformed JSON", method))?;

        if !response.ok {
            return Err(anyhow!(
                "Telegram {} failed: {}",
                method,
                response.description.unwrap_or_else(|| "no description".to_string())
            ));
        }
        response
            .result
            .ok_or_else(|| anyhow!("Telegram {} returned no result", method))
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<()> {
        let _: Message = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "reply_to_message_id": reply_to,
                }),
            )
            .await?;
        Ok(())
    }

    /// Drops updates queued while the bot was offline and returns the offset
    /// to poll from.
    pub async fn skip_pending(&self) -> Result<Option<i64>> {
        let pending: Vec<Update> = self
            .call("getUpdates", json!({ "offset": -1, "timeout": 0 }))
            .await?;
        Ok(pending.last().map(|u| u.update_id + 1))
    }
}

/// Replies to one Telegram message.
pub struct TelegramReply {
    client: Arc<TelegramClient>,
    chat_id: i64,
    message_id: i64,
}

impl TelegramReply {
    pub fn new(client: Arc<TelegramClient>, message: &Message) -> Self {
        Self {
            client,
            chat_id: message.chat.id,
            message_id: message.message_id,
        }
    }
}

#[async_trait]
impl ReplySink for TelegramReply {
    /// Long texts go out as several messages; only the first one is
    /// threaded as a reply.
    async fn reply(&self, text: &str) -> Result<()> {
        let mut reply_to = Some(self.message_id);
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.client
                .send_message(self.chat_id, &chunk, reply_to.take())
                .await?;
        }
        Ok(())
    }
}

/// Splits `text` into pieces of at most `limit` characters, breaking at the
/// last newline, else the last space, inside each window. The separator a
/// piece is cut at is dropped.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let window_end = rest
            .char_indices()
            .nth(limit)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let window = &rest[..window_end];

        match window.rfind('\n').or_else(|| window.rfind(' ')) {
            Some(cut) if cut > 0 => {
                chunks.push(window[..cut].to_string());
                rest = &rest[cut + 1..];
            }
            _ => {
                chunks.push(window.to_string());
                rest = &rest[window_end..];
            }
        }
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Polls until the process is stopped. Each message is handled on its own
/// task so a slow answer for one user does not hold up the others.
pub async fn run_polling(
    client: Arc<TelegramClient>,
    handler: Arc<RequestHandler>,
    config: &TelegramConfig,
) -> Result<()> {
    let mut offset = if config.skip_pending {
        let offset = client.skip_pending().await?;
        tracing::info!("Skipped pending updates, polling from offset {:?}", offset);
        offset
    } else {
        None
    };

    loop {
        let updates = match client.get_updates(offset, config.poll_timeout_secs).await {
            Ok(updates) => updates,
            Err(err) => {
                tracing::error!("Polling Telegram failed: {:#}", err);
                tokio::time::sleep(RETRY_PAUSE).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(inbound) = message.to_inbound() else {
                tracing::debug!("Ignoring non-text message {}", message.message_id);
                continue;
            };

            let sink = TelegramReply::new(client.clone(), &message);
            let handler = handler.clone();
            tokio::spawn(async move {
                handler.handle(&inbound, &sink).await;
            });
        }
    }
}
