//! Telegram Bot API channel: REST calls + long polling.
//!
//! `getUpdates` is polled in a background task that feeds an unbounded
//! channel; the receiving half is exposed as the event stream. Polling
//! reconnects with exponential backoff on transport errors.

use async_trait::async_trait;
use bdaybot_core::config::TelegramConfig;
use bdaybot_core::error::{BdayError, Result};
use bdaybot_core::traits::Channel;
use bdaybot_core::types::{
    CallbackQuery, Choice, IncomingEvent, IncomingMessage, MessageRef, OutgoingMessage,
};
use futures::stream::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

const INITIAL_BACKOFF_SECS: u64 = 5;
const MAX_BACKOFF_SECS: u64 = 60;

/// Thin client over the Bot API methods the bot needs.
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    base: String,
    poll_timeout_secs: u64,
}

impl TelegramApi {
    pub fn new(config: &TelegramConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("bdaybot/0.3")
            // Long polls hold the request open for `poll_timeout_secs`.
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            poll_timeout_secs: config.poll_timeout_secs,
        }
    }

    /// Call a Bot API method and unwrap the `{ok, result}` envelope.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, body: &serde_json::Value) -> Result<T> {
        let url = format!("{}/{method}", self.base);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            // Error URLs carry the bot token.
            .map_err(|e| BdayError::channel(format!("Telegram {method} failed: {}", e.without_url())))?;

        let status = response.status();
        let envelope: TgResponse<T> = response.json().await.map_err(|e| {
            BdayError::channel(format!("Telegram {method} {status}: invalid response: {}", e.without_url()))
        })?;

        match envelope {
            TgResponse { ok: true, result: Some(result), .. } => Ok(result),
            TgResponse { description, .. } => Err(BdayError::channel(format!(
                "Telegram {method} {status}: {}",
                description.unwrap_or_else(|| "no description".into())
            ))),
        }
    }

    pub async fn get_me(&self) -> Result<TgUser> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body).await
    }

    pub async fn send_message(&self, message: &OutgoingMessage) -> Result<TgMessage> {
        let mut body = serde_json::json!({
            "chat_id": message.chat_id,
            "text": message.text,
        });
        if !message.choices.is_empty() {
            body["reply_markup"] = inline_keyboard(&message.choices);
        }
        self.call("sendMessage", &body).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        choices: &[Vec<Choice>],
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if !choices.is_empty() {
            body["reply_markup"] = inline_keyboard(choices);
        }
        // Returns the edited Message, or `true` for inline messages.
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<()> {
        let body = serde_json::json!({ "callback_query_id": callback_id });
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}

/// `reply_markup` object for rows of inline buttons.
pub fn inline_keyboard(choices: &[Vec<Choice>]) -> serde_json::Value {
    let rows: Vec<Vec<TgInlineButton<'_>>> = choices
        .iter()
        .map(|row| {
            row.iter()
                .map(|c| TgInlineButton { text: &c.label, callback_data: &c.action })
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

/// Telegram Bot channel.
pub struct TelegramChannel {
    api: TelegramApi,
    bot_username: Option<String>,
    connected: bool,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            api: TelegramApi::new(config),
            bot_username: None,
            connected: false,
        }
    }

    /// Start long polling and return a stream of inbound events.
    /// The poll task stops once the stream is dropped.
    pub fn start_polling(&self) -> TelegramUpdateStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let api = self.api.clone();
        let username = self.bot_username.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            let mut backoff_secs = INITIAL_BACKOFF_SECS;

            loop {
                if tx.is_closed() {
                    tracing::info!("Telegram stream closed (receiver dropped)");
                    return;
                }

                let updates = match api.get_updates(offset).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::error!("{e}, retrying in {backoff_secs}s...");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                        continue;
                    }
                };
                backoff_secs = INITIAL_BACKOFF_SECS;

                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let Some(event) = parse_update(update, username.as_deref()) else {
                        continue;
                    };
                    if tx.send(event).is_err() {
                        tracing::info!("Telegram stream closed (receiver dropped)");
                        return;
                    }
                }
            }
        });

        TelegramUpdateStream { rx }
    }
}

/// Stream of inbound Telegram events.
pub struct TelegramUpdateStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingEvent>,
}

impl Stream for TelegramUpdateStream {
    type Item = IncomingEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str { "telegram" }

    async fn connect(&mut self) -> Result<()> {
        let me = self.api.get_me().await?;
        tracing::info!(
            "Telegram bot: @{} ({})",
            me.username.as_deref().unwrap_or("?"),
            me.id
        );
        self.bot_username = me.username;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool { self.connected }

    fn bot_username(&self) -> Option<String> {
        self.bot_username.clone()
    }

    async fn send(&self, message: OutgoingMessage) -> Result<MessageRef> {
        if !self.connected {
            return Err(BdayError::ChannelNotConnected("telegram".into()));
        }
        let sent = self.api.send_message(&message).await?;
        Ok(MessageRef { chat_id: sent.chat.id, message_id: sent.message_id })
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        choices: &[Vec<Choice>],
    ) -> Result<()> {
        self.api.edit_message_text(chat_id, message_id, text, choices).await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.api.answer_callback_query(callback_id).await
    }

    async fn listen(&self) -> Result<Box<dyn Stream<Item = IncomingEvent> + Send + Unpin>> {
        if !self.connected {
            return Err(BdayError::ChannelNotConnected("telegram".into()));
        }
        Ok(Box::new(self.start_polling()))
    }
}

/// Convert a raw update into an event. Updates without text or callback
/// data, and messages from bots, yield `None`.
pub fn parse_update(update: TgUpdate, bot_username: Option<&str>) -> Option<IncomingEvent> {
    if let Some(query) = update.callback_query {
        let message = query.message?;
        return Some(IncomingEvent::Callback(CallbackQuery {
            id: query.id,
            chat_id: message.chat.id,
            chat_title: message.chat.title.unwrap_or_default(),
            sender_id: query.from.id,
            message_id: message.message_id,
            data: query.data?,
        }));
    }

    let message = update.message?;
    let from = message.from.as_ref()?;
    if from.is_bot {
        return None;
    }
    let text = message.text.clone()?;
    let mentions_bot = bot_username.is_some_and(|name| mentions(&text, &message.entities, name));

    Some(IncomingEvent::Message(IncomingMessage {
        channel: "telegram".into(),
        chat_id: message.chat.id,
        chat_title: message.chat.title.clone().unwrap_or_default(),
        sender_id: from.id,
        sender_name: from.username.clone().or_else(|| Some(from.first_name.clone())),
        message_id: message.message_id,
        text,
        mentions_bot,
        reply_to: message.reply_to_message.as_ref().map(|m| m.message_id),
        timestamp: chrono::DateTime::from_timestamp(message.date, 0)
            .unwrap_or_else(chrono::Utc::now),
    }))
}

/// Whether any `mention` entity is `@bot_username`. Entity offsets count
/// UTF-16 code units.
fn mentions(text: &str, entities: &[TgEntity], bot_username: &str) -> bool {
    let units: Vec<u16> = text.encode_utf16().collect();
    let target = format!("@{bot_username}");
    entities
        .iter()
        .filter(|e| e.kind == "mention")
        .filter_map(|e| units.get(e.offset..e.offset.checked_add(e.length)?))
        .any(|slice| String::from_utf16_lossy(slice).eq_ignore_ascii_case(&target))
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TgResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub from: Option<TgUser>,
    pub chat: TgChat,
    #[serde(default)]
    pub date: i64,
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<TgEntity>,
    pub reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<TgMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    pub message: Option<TgMessage>,
    pub callback_query: Option<TgCallbackQuery>,
}

#[derive(Serialize)]
struct TgInlineButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}
