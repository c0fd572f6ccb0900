//! Mock Telegram Bot API for integration tests.
//!
//! Provides a local HTTP server that can:
//! - Serve queued `getUpdates` batches
//! - Record `sendMessage` calls
//! - Reject messages to chosen chats

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const TOKEN: &str = "123456:TEST";

#[derive(Default)]
struct BotState {
    updates: Mutex<VecDeque<Value>>,
    sent: Mutex<Vec<Value>>,
    rejected_chats: Mutex<HashSet<String>>,
}

/// A mock Bot API server.
pub struct MockTelegram {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    state: Arc<BotState>,
}

impl MockTelegram {
    /// Start on an available port.
    pub async fn start() -> Self {
        let state = Arc::new(BotState::default());
        let router = Router::new()
            .route("/{bot}/{method}", post(handle_method))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx,
            state,
        }
    }

    /// Base URL to hand to `TelegramClient`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a channel post visible to the next `getUpdates`.
    pub fn push_channel_post(&self, update_id: i64, chat_id: i64, text: &str) {
        self.state.updates.lock().push_back(json!({
            "update_id": update_id,
            "channel_post": {
                "message_id": update_id,
                "chat": {"id": chat_id, "type": "channel"},
                "date": 1_772_330_400,
                "text": text
            }
        }));
    }

    /// Answer `sendMessage` for `chat` with an API error.
    pub fn reject_chat(&self, chat: &str) {
        self.state.rejected_chats.lock().insert(chat.to_string());
    }

    /// Bodies of every `sendMessage` call.
    pub fn sent(&self) -> Vec<Value> {
        self.state.sent.lock().clone()
    }

    pub fn sent_to(&self, chat: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|body| chat_key(&body["chat_id"]) == chat)
            .collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

fn chat_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn handle_method(
    State(state): State<Arc<BotState>>,
    Path((bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if bot != format!("bot{TOKEN}") {
        return Json(json!({"ok": false, "error_code": 401, "description": "Unauthorized"}));
    }
    match method.as_str() {
        "getUpdates" => {
            let offset = body.get("offset").and_then(Value::as_i64).unwrap_or(0);
            let batch: Vec<Value> = {
                let mut updates = state.updates.lock();
                updates.retain(|u| u["update_id"].as_i64().unwrap_or(0) >= offset);
                updates.iter().cloned().collect()
            };
            if batch.is_empty() {
                // short stand-in for the server-side long-poll wait
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            Json(json!({"ok": true, "result": batch}))
        }
        "sendMessage" => {
            let chat = chat_key(&body["chat_id"]);
            state.sent.lock().push(body);
            if state.rejected_chats.lock().contains(&chat) {
                return Json(json!({"ok": false, "error_code": 403, "description": "Forbidden: bot was kicked"}));
            }
            Json(json!({"ok": true, "result": {"message_id": 1}}))
        }
        _ => Json(json!({"ok": false, "error_code": 404, "description": "Not Found"})),
    }
}
