//! Telegram channel: receives updates from the Bot API by long-polling or
//! by webhook, and sends replies with reply keyboards.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::channels::{
    Channel, InboundEvent, IncomingMessage, MessageStream, OutgoingMessage, ParseMode,
    ReplyMarkup,
};
use crate::config::TelegramMode;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Path Telegram posts updates to in webhook mode.
pub const WEBHOOK_PATH: &str = "/telegram/webhook";

/// Header carrying the secret registered with `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Thin Bot API client shared by the channel and the staff notifier.
#[derive(Clone)]
pub struct TelegramApi {
    bot_token: SecretString,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Send a message. Long texts are split; the keyboard rides on the last chunk.
    pub async fn send_message(
        &self,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(&message.text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last {
                message.markup.as_ref()
            } else {
                None
            };
            self.send_message_chunk(chat_id, chunk, markup, message.parse_mode)
                .await?;
        }
        Ok(())
    }

    /// Send a single chunk. Formatted text falls back to plain text if
    /// Telegram rejects the markup.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&ReplyMarkup>,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = markup {
            body["reply_markup"] = reply_markup_json(markup);
        }

        let Some(mode) = parse_mode else {
            return self.post_send(&body).await;
        };

        let mut formatted = body.clone();
        formatted["parse_mode"] = Value::String(parse_mode_name(mode).into());

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&formatted)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if resp.status().is_success() {
            return Ok(());
        }

        tracing::warn!(
            status = ?resp.status(),
            "Telegram sendMessage with parse_mode failed; retrying as plain text"
        );
        self.post_send(&body).await
    }

    async fn post_send(&self, body: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(send_failed(format!("sendMessage returned {status}: {err}")));
        }
        Ok(())
    }

    /// Fetch updates after `offset`, waiting up to 30 seconds.
    async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<Value>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": 30,
            "allowed_updates": ["message"]
        });
        let data: Value = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if data.get("ok").and_then(Value::as_bool) != Some(true) {
            anyhow::bail!(
                "getUpdates failed: {}",
                data.get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
            );
        }

        Ok(data
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Point Telegram at our webhook endpoint. Telegram echoes `secret_token`
    /// in the [`SECRET_TOKEN_HEADER`] of every update it posts.
    async fn set_webhook(&self, url: &str, secret_token: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(self.api_url("setWebhook"))
            .json(&serde_json::json!({
                "url": url,
                "secret_token": secret_token,
                "allowed_updates": ["message"]
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram setWebhook failed: {err}");
        }
        Ok(())
    }

    /// Remove any registered webhook; `getUpdates` is refused while one is set.
    async fn delete_webhook(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(self.api_url("deleteWebhook"))
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram deleteWebhook failed: {err}");
        }
        Ok(())
    }

    /// The bot's own username, from `getMe`.
    async fn get_me(&self) -> Result<String, ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| startup_failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(startup_failed(format!("getMe returned {}", resp.status())));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| startup_failed(e.to_string()))?;
        data.get("result")
            .and_then(|r| r.get("username"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| startup_failed("getMe response has no username".into()))
    }
}

/// Telegram channel.
pub struct TelegramChannel {
    api: TelegramApi,
    mode: TelegramMode,
}

impl TelegramChannel {
    pub fn new(api: TelegramApi, mode: TelegramMode) -> Self {
        Self { api, mode }
    }

    fn spawn_polling(
        &self,
        tx: mpsc::UnboundedSender<IncomingMessage>,
        bot_username: Option<String>,
    ) {
        let api = self.api.clone();

        tokio::spawn(async move {
            if let Err(e) = api.delete_webhook().await {
                tracing::warn!("Telegram deleteWebhook before polling failed: {e}");
            }

            let mut offset: i64 = 0;
            tracing::info!("Telegram channel polling for updates...");

            loop {
                let updates = match api.get_updates(offset).await {
                    Ok(u) => u,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in &updates {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, bot_username.as_deref()) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });
    }

    async fn spawn_webhook(
        &self,
        public_url: &str,
        port: u16,
        tx: mpsc::UnboundedSender<IncomingMessage>,
        bot_username: Option<String>,
    ) -> Result<(), ChannelError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| startup_failed(format!("cannot bind {addr}: {e}")))?;

        // Fresh per start; setWebhook below replaces the previous one.
        let secret_token = Uuid::new_v4().simple().to_string();
        let hook_url = format!("{public_url}{WEBHOOK_PATH}");
        self.api
            .set_webhook(&hook_url, &secret_token)
            .await
            .map_err(|e| startup_failed(e.to_string()))?;

        let mut state = WebhookState::new(tx, secret_token);
        if let Some(name) = bot_username {
            state = state.with_bot_username(name);
        }
        let app = webhook_router(state);
        tokio::spawn(async move {
            tracing::info!(port, url = %hook_url, "Telegram webhook server started");
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Telegram webhook server stopped: {e}");
            }
        });
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let bot_username = match self.api.get_me().await {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!("Telegram getMe failed, @bot suffixes will not be checked: {e}");
                None
            }
        };

        match &self.mode {
            TelegramMode::Polling => self.spawn_polling(tx, bot_username),
            TelegramMode::Webhook { public_url, port } => {
                self.spawn_webhook(public_url, *port, tx, bot_username).await?
            }
        }

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, chat_id: &str, message: OutgoingMessage) -> Result<(), ChannelError> {
        self.api.send_message(chat_id, &message).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.api.get_me().await.map(|_| ())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Webhook ─────────────────────────────────────────────────────────

/// What the webhook endpoint needs to accept and forward updates.
#[derive(Clone)]
pub struct WebhookState {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    secret_token: String,
    bot_username: Option<String>,
}

impl WebhookState {
    /// Forward updates to `tx`, accepting only requests that carry
    /// `secret_token` in the [`SECRET_TOKEN_HEADER`].
    pub fn new(tx: mpsc::UnboundedSender<IncomingMessage>, secret_token: impl Into<String>) -> Self {
        Self {
            tx,
            secret_token: secret_token.into(),
            bot_username: None,
        }
    }

    pub fn with_bot_username(mut self, name: impl Into<String>) -> Self {
        self.bot_username = Some(name.into());
        self
    }
}

async fn receive_update(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    Json(update): Json<Value>,
) -> StatusCode {
    let presented = headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(state.secret_token.as_str()) {
        tracing::warn!("Telegram webhook request without a valid secret token rejected");
        return StatusCode::UNAUTHORIZED;
    }

    if let Some(incoming) = parse_update(&update, state.bot_username.as_deref()) {
        if state.tx.send(incoming).is_err() {
            tracing::warn!("Telegram webhook received an update after the listener closed");
        }
    }
    // Always acknowledge, otherwise Telegram redelivers the update.
    StatusCode::OK
}

/// Router that accepts Telegram webhook posts and forwards parsed updates.
pub fn webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(receive_update))
        .with_state(Arc::new(state))
}

// ── Helpers ─────────────────────────────────────────────────────────

fn startup_failed(reason: String) -> ChannelError {
    ChannelError::StartupFailed {
        name: "telegram".into(),
        reason,
    }
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason,
    }
}

fn parse_mode_name(mode: ParseMode) -> &'static str {
    match mode {
        ParseMode::Html => "HTML",
    }
}

/// Bot API `reply_markup` object for a markup choice.
pub fn reply_markup_json(markup: &ReplyMarkup) -> Value {
    match markup {
        ReplyMarkup::Keyboard(keyboard) => {
            let rows: Vec<Vec<Value>> = keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| {
                            if button.request_contact {
                                serde_json::json!({"text": button.label, "request_contact": true})
                            } else {
                                serde_json::json!({"text": button.label})
                            }
                        })
                        .collect()
                })
                .collect();
            serde_json::json!({"keyboard": rows, "resize_keyboard": true})
        }
        ReplyMarkup::Remove => serde_json::json!({"remove_keyboard": true}),
    }
}

/// Turn a Bot API update into an inbound message.
///
/// Only user messages carrying text or a contact are kept. With
/// `bot_username`, commands addressed to other bots are not treated as ours.
pub fn parse_update(update: &Value, bot_username: Option<&str>) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let from = message.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?;

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .unwrap_or(user_id);

    let event = if let Some(contact) = message.get("contact") {
        let phone = contact
            .get("phone_number")
            .and_then(Value::as_str)
            .unwrap_or_default();
        InboundEvent::contact(phone)
    } else {
        let text = message.get("text").and_then(Value::as_str)?;
        InboundEvent::from_text_for(text, bot_username)
    };

    let mut incoming =
        IncomingMessage::new("telegram", user_id.to_string(), chat_id.to_string(), event);

    let display_name = from
        .get("first_name")
        .and_then(Value::as_str)
        .or_else(|| from.get("username").and_then(Value::as_str));
    if let Some(name) = display_name {
        incoming = incoming.with_user_name(name);
    }

    Some(incoming)
}

/// Split a message into chunks of at most `max_len` bytes.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
