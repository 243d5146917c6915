//! Telegram transport — Bot API implementation of `ChatTransport`.
//!
//! Sends go through `sendMessage` (Markdown first, plain-text fallback,
//! split at the 4096-char limit). Destination capability comes from
//! `getChat` + `getChatMember`. The Bot API has no history endpoint, so
//! recent messages are served from an in-memory cache fed by a `getUpdates`
//! long-poll loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OnceCell, RwLock};

use crate::error::TransportError;
use crate::transport::{ChatTransport, DestinationInfo, TranscriptMessage};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Per-chat cap on cached history messages.
const HISTORY_CACHE_CAP: usize = 200;

/// Telegram Bot API transport.
pub struct TelegramTransport {
    bot_token: String,
    client: reqwest::Client,
    /// Bot's own user id, fetched lazily via getMe.
    bot_id: OnceCell<i64>,
    /// Recent messages per chat id, oldest first.
    history: RwLock<HashMap<String, VecDeque<TranscriptMessage>>>,
}

impl TelegramTransport {
    pub fn new(bot_token: String) -> Arc<Self> {
        Arc::new(Self {
            bot_token,
            client: reqwest::Client::new(),
            bot_id: OnceCell::new(),
            history: RwLock::new(HashMap::new()),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    async fn call_api(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = resp.status();
        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Http(format!("{method} returned non-JSON: {e}")))?;

        if !status.is_success() || payload.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = payload
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return Err(TransportError::Http(format!(
                "{method} failed ({status}): {description}"
            )));
        }

        Ok(payload.get("result").cloned().unwrap_or_default())
    }

    async fn bot_id(&self) -> Result<i64, TransportError> {
        self.bot_id
            .get_or_try_init(|| async {
                let me = self.call_api("getMe", &serde_json::json!({})).await?;
                me.get("id").and_then(|v| v.as_i64()).ok_or_else(|| {
                    TransportError::Http("getMe result missing id".to_string())
                })
            })
            .await
            .copied()
    }

    /// Record an observed message into the history cache.
    pub async fn record_message(&self, chat_id: &str, message: TranscriptMessage) {
        let mut history = self.history.write().await;
        let entries = history.entry(chat_id.to_string()).or_default();
        if entries.len() >= HISTORY_CACHE_CAP {
            entries.pop_front();
        }
        entries.push_back(message);
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with
    /// plain-text fallback.
    async fn send_chunk(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        match self.call_api("sendMessage", &markdown_body).await {
            Ok(_) => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    chat_id,
                    error = %e,
                    "sendMessage with Markdown failed; retrying without parse_mode"
                );
            }
        }

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.call_api("sendMessage", &plain_body)
            .await
            .map_err(|e| TransportError::SendFailed {
                destination: chat_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Spawn the getUpdates long-poll loop that feeds the history cache.
    pub fn spawn_update_poller(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut offset: i64 = 0;
            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "channel_post"],
                });
                let updates = match self.call_api("getUpdates", &body).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(error = %e, "getUpdates failed; backing off");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let bot_id = self.bot_id().await.unwrap_or(0);
                for update in updates.as_array().into_iter().flatten() {
                    if let Some(id) = update.get("update_id").and_then(|v| v.as_i64()) {
                        offset = offset.max(id + 1);
                    }
                    let message = update
                        .get("message")
                        .or_else(|| update.get("channel_post"));
                    let Some(message) = message else { continue };
                    let Some(chat_id) = message
                        .get("chat")
                        .and_then(|c| c.get("id"))
                        .and_then(|v| v.as_i64())
                    else {
                        continue;
                    };
                    let Some(text) = message.get("text").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    let from_self = message
                        .get("from")
                        .and_then(|f| f.get("id"))
                        .and_then(|v| v.as_i64())
                        == Some(bot_id);
                    self.record_message(
                        &chat_id.to_string(),
                        TranscriptMessage {
                            from_self,
                            body: text.to_string(),
                        },
                    )
                    .await;
                }
            }
        })
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn fetch_recent_messages(
        &self,
        destination: &str,
        limit: usize,
    ) -> Result<Vec<TranscriptMessage>, TransportError> {
        let history = self.history.read().await;
        let entries = history.get(destination).cloned().unwrap_or_default();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }

    async fn destination_info(
        &self,
        destination: &str,
    ) -> Result<DestinationInfo, TransportError> {
        let chat = self
            .call_api("getChat", &serde_json::json!({ "chat_id": destination }))
            .await
            .map_err(|e| TransportError::DestinationLookup {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;

        let is_channel = chat.get("type").and_then(|v| v.as_str()) == Some("channel");
        if !is_channel {
            return Ok(DestinationInfo {
                is_channel: false,
                is_read_only: false,
            });
        }

        // Posting to a channel requires the bot to be an administrator with
        // can_post_messages.
        let bot_id = self.bot_id().await?;
        let member = self
            .call_api(
                "getChatMember",
                &serde_json::json!({ "chat_id": destination, "user_id": bot_id }),
            )
            .await
            .map_err(|e| TransportError::DestinationLookup {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;

        let status = member.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let can_post = member
            .get("can_post_messages")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let is_read_only = !(status == "administrator" && can_post) && status != "creator";

        Ok(DestinationInfo {
            is_channel: true,
            is_read_only,
        })
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_chunk(destination, &chunk).await?;
        }
        // Our own sends become part of the conversation history.
        self.record_message(
            destination,
            TranscriptMessage {
                from_self: true,
                body: text.to_string(),
            },
        )
        .await;
        Ok(())
    }
}

/// Split a message into chunks below `max_len`, preferring newline breaks.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.len() + line.len() > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if line.len() > max_len {
            // A single oversized line: hard-split on char boundaries.
            let mut rest = line;
            while rest.len() > max_len {
                let mut end = max_len;
                while !rest.is_char_boundary(end) {
                    end -= 1;
                }
                chunks.push(rest[..end].to_string());
                rest = &rest[end..];
            }
            current.push_str(rest);
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
