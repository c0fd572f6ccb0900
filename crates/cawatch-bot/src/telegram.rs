//! Telegram Bot API transport.
//!
//! Outbound: `sendMessage` with HTML captions. Inbound: a `getUpdates`
//! long-poll loop feeding `InboundMessage`s into a channel. The bot token is
//! part of every request URL, so transport errors are stripped of their URL
//! before they are logged.

use crate::caption;
use crate::coordinator::InboundMessage;
use crate::dispatch::{DispatchResult, Dispatcher};
use crate::error::{AppError, AppResult};
use cawatch_core::{ChartSeries, PushTarget, Task, TokenMetrics};
use cawatch_sources::BoxFuture;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const POLL_BACKOFF_BASE_MS: u64 = 1000;
const POLL_BACKOFF_MAX_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub channel_post: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub chat: TgChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub from: Option<TgUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    #[serde(default)]
    pub is_bot: bool,
}

impl Update {
    /// Message or channel post with text (or a media caption).
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message.or(self.channel_post)?;
        let text = message.text.or(message.caption)?;
        Some(InboundMessage {
            chat_id: message.chat.id,
            text,
            sender_is_bot: message.from.is_some_and(|u| u.is_bot),
        })
    }
}

/// Minimal Bot API client.
pub struct TelegramClient {
    http: Client,
    base_url: String,
    token: Zeroizing<String>,
}

impl TelegramClient {
    pub fn new(base_url: impl Into<String>, token: String, request_timeout: Duration) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Telegram(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Zeroizing::new(token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token.as_str(), method)
    }

    async fn call<T>(&self, method: &str, body: serde_json::Value) -> AppResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Telegram(format!("{method}: {}", e.without_url())))?;
        let status = response.status();
        let api: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::Telegram(format!("{method}: bad response ({status}): {}", e.without_url())))?;
        if !api.ok {
            return Err(AppError::Telegram(format!(
                "{method}: {}",
                api.description.unwrap_or_else(|| status.to_string())
            )));
        }
        api.result
            .ok_or_else(|| AppError::Telegram(format!("{method}: missing result")))
    }

    /// Send an HTML message. `chat` is a numeric id or `@username`.
    pub async fn send_message(&self, chat: &str, text: &str) -> AppResult<()> {
        let chat_id = chat
            .parse::<i64>()
            .map_or_else(|_| json!(chat), |id| json!(id));
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> AppResult<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "channel_post"],
            }),
        )
        .await
    }
}

/// Dispatcher that posts captions through the Bot API.
pub struct TelegramDispatcher {
    client: Arc<TelegramClient>,
}

impl TelegramDispatcher {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }
}

impl Dispatcher for TelegramDispatcher {
    fn send<'a>(
        &'a self,
        target: &'a PushTarget,
        metrics: &'a TokenMetrics,
        chart: Option<&'a ChartSeries>,
        _task: &'a Task,
    ) -> BoxFuture<'a, DispatchResult> {
        Box::pin(async move {
            let text = caption::render(metrics, chart, target.kind, Utc::now());
            match self.client.send_message(&target.chat, &text).await {
                Ok(()) => DispatchResult::Delivered,
                Err(e) => DispatchResult::Failed(e.to_string()),
            }
        })
    }
}

/// `getUpdates` long-poll loop.
pub struct TelegramPoller {
    client: Arc<TelegramClient>,
    poll_timeout_secs: u64,
}

fn poll_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    Duration::from_millis(
        POLL_BACKOFF_BASE_MS
            .saturating_mul(1u64 << exponent)
            .min(POLL_BACKOFF_MAX_MS),
    )
}

impl TelegramPoller {
    pub fn new(client: Arc<TelegramClient>, poll_timeout_secs: u64) -> Self {
        Self {
            client,
            poll_timeout_secs,
        }
    }

    /// Poll until `shutdown` is cancelled or the receiver is dropped.
    pub async fn run(self, tx: mpsc::Sender<InboundMessage>, shutdown: CancellationToken) {
        info!(poll_timeout_secs = self.poll_timeout_secs, "Telegram poller started");
        let mut offset: Option<i64> = None;
        let mut failures = 0u32;
        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.client.get_updates(offset, self.poll_timeout_secs) => result,
            };
            match result {
                Ok(updates) => {
                    failures = 0;
                    debug!(count = updates.len(), "Updates received");
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if let Some(message) = update.into_inbound() {
                            if tx.send(message).await.is_err() {
                                info!("Inbound channel closed, poller exiting");
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    let delay = poll_backoff(failures);
                    warn!(error = %e, failures, delay_ms = delay.as_millis() as u64, "getUpdates failed, backing off");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        info!("Telegram poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::Value;

    #[test]
    fn test_update_conversion() {
        let updates: Vec<Update> = serde_json::from_value(json!([
            {"update_id": 1, "message": {"chat": {"id": -100123}, "text": "hi", "from": {"is_bot": false}}},
            {"update_id": 2, "channel_post": {"chat": {"id": -100999}, "caption": "photo caption"}},
            {"update_id": 3, "message": {"chat": {"id": 5}, "text": "x", "from": {"is_bot": true}}},
            {"update_id": 4, "message": {"chat": {"id": 5}}},
            {"update_id": 5, "edited_message": {"chat": {"id": 5}, "text": "x"}}
        ]))
        .unwrap();
        let inbound: Vec<_> = updates.into_iter().filter_map(Update::into_inbound).collect();
        assert_eq!(inbound.len(), 3);
        assert_eq!(inbound[0], InboundMessage::new(-100123, "hi"));
        assert_eq!(inbound[1].text, "photo caption");
        assert!(inbound[2].sender_is_bot);
    }

    #[test]
    fn test_poll_backoff_capped() {
        assert_eq!(poll_backoff(1), Duration::from_millis(1000));
        assert_eq!(poll_backoff(3), Duration::from_millis(4000));
        assert_eq!(poll_backoff(30), Duration::from_millis(60_000));
    }

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn send_message(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        seen.lock().push(body);
        Json(json!({"ok": true, "result": {"message_id": 1}}))
    }

    async fn get_updates() -> Json<Value> {
        Json(json!({"ok": true, "result": [
            {"update_id": 41, "message": {"chat": {"id": -100123}, "text": "ca here"}}
        ]}))
    }

    async fn forbidden() -> Json<Value> {
        Json(json!({"ok": false, "description": "Forbidden: bot was blocked by the user"}))
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_send_and_poll_against_mock_api() {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route("/bot123abc/sendMessage", post(send_message))
            .route("/bot123abc/getUpdates", post(get_updates))
            .with_state(seen.clone());
        let base = serve(router).await;
        let client = TelegramClient::new(base, "123abc".to_string(), Duration::from_secs(5)).unwrap();

        client.send_message("-100123", "<b>hi</b>").await.unwrap();
        client.send_message("@channel", "hi").await.unwrap();
        let bodies = seen.lock().clone();
        assert_eq!(bodies[0]["chat_id"], json!(-100123));
        assert_eq!(bodies[0]["parse_mode"], json!("HTML"));
        assert_eq!(bodies[1]["chat_id"], json!("@channel"));

        let updates = client.get_updates(None, 0).await.unwrap();
        assert_eq!(updates[0].update_id, 41);
    }

    #[tokio::test]
    async fn test_api_error_is_failed_dispatch() {
        let router = Router::new().route("/botT0K/sendMessage", post(forbidden));
        let base = serve(router).await;
        let client = Arc::new(TelegramClient::new(base, "T0K".to_string(), Duration::from_secs(5)).unwrap());
        let dispatcher = TelegramDispatcher::new(client);

        let metrics = TokenMetrics::new(cawatch_core::Chain::Solana, "addr", Utc::now());
        let result = dispatcher
            .send(&PushTarget::direct("42"), &metrics, None, &Task::new("t"))
            .await;
        match result {
            DispatchResult::Failed(reason) => {
                assert!(reason.contains("blocked"));
                assert!(!reason.contains("T0K"));
            }
            DispatchResult::Delivered => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_poller_forwards_messages() {
        let router = Router::new().route("/botabc/getUpdates", post(get_updates));
        let base = serve(router).await;
        let client = Arc::new(TelegramClient::new(base, "abc".to_string(), Duration::from_secs(5)).unwrap());
        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(TelegramPoller::new(client, 0).run(tx, shutdown.clone()));

        let first = rx.recv().await.unwrap();
        assert_eq!(first, InboundMessage::new(-100123, "ca here"));
        shutdown.cancel();
        drop(rx);
        handle.await.unwrap();
    }
}
