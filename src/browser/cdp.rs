//! Multiplexed CDP connection over the browser WebSocket.
//!
//! One socket carries every command. Page-level commands are routed with a
//! flat `sessionId` obtained from `Target.attachToTarget`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{AxbridgeError, Result};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct CdpClient {
    ws_tx: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a browser WebSocket URL (`ws://.../devtools/browser/<id>`)
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (stream, _) = connect_async(ws_url).await.map_err(|e| {
            AxbridgeError::CdpConnectionFailed(format!("WebSocket connection to {} failed: {}", ws_url, e))
        })?;
        let (mut sink, mut source) = stream.split();

        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer_closed = closed.clone();
        let writer = tokio::spawn(async move {
            while let Some(text) = ws_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!("CDP WebSocket write error: {}", e);
                    break;
                }
            }
            writer_closed.store(true, Ordering::SeqCst);
            let _ = sink.close().await;
        });

        let reader_pending = pending.clone();
        let reader_closed = closed.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        // Events carry no id and are not consumed here
                        if let Some(id) = value.get("id").and_then(Value::as_u64) {
                            if let Some(tx) = reader_pending.lock().await.remove(&id) {
                                let _ = tx.send(value);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!("CDP WebSocket closed by browser");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("CDP WebSocket read error: {}", e);
                        break;
                    }
                }
            }
            reader_closed.store(true, Ordering::SeqCst);
            // Wake every waiter with a closed channel
            reader_pending.lock().await.clear();
        });

        Ok(Arc::new(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            reader,
            writer,
        }))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send one command and wait for its result
    pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
        if self.is_closed() {
            return Err(AxbridgeError::CdpConnectionFailed(
                "CDP connection is closed".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut command = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            command["sessionId"] = json!(session_id);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.ws_tx.send(command.to_string()).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AxbridgeError::CdpConnectionFailed(
                "CDP connection is closed".to_string(),
            ));
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(response)) => command_result(method, response),
            Ok(Err(_)) => Err(AxbridgeError::CdpConnectionFailed(format!(
                "Connection closed while waiting for {}",
                method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(AxbridgeError::Timeout(format!(
                    "CDP command '{}' timed out after {}s",
                    method,
                    COMMAND_TIMEOUT.as_secs()
                )))
            }
        }
    }

    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn command_result(method: &str, mut response: Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(AxbridgeError::CdpConnectionFailed(format!(
            "{} failed: {}",
            method, message
        )));
    }
    Ok(response
        .get_mut("result")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

/// A page target attached over a [`CdpClient`]
pub struct CdpPage {
    client: Arc<CdpClient>,
    target_id: String,
    session_id: String,
}

impl CdpPage {
    /// Attach to `target_id` with a flat session and enable the domains used here
    pub async fn attach(client: Arc<CdpClient>, target_id: &str) -> Result<Self> {
        let attached = client
            .send(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;

        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AxbridgeError::CdpConnectionFailed("attachToTarget returned no sessionId".to_string())
            })?
            .to_string();

        let page = Self {
            client,
            target_id: target_id.to_string(),
            session_id,
        };

        for domain in ["Page", "Runtime", "Accessibility"] {
            page.send(&format!("{}.enable", domain), json!({})).await?;
        }

        tracing::debug!("Attached to page target {}", page.target_id);
        Ok(page)
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.client.send(method, params, Some(&self.session_id)).await
    }

    /// `Runtime.evaluate` returning the value; page exceptions become
    /// [`AxbridgeError::JavaScriptError`].
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let mut result = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            return Err(AxbridgeError::JavaScriptError(exception_message(details)));
        }

        Ok(result
            .get_mut("result")
            .and_then(|r| r.get_mut("value"))
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Detach and drop the connection. Errors are ignored.
    pub async fn close(self) {
        let _ = self
            .client
            .send(
                "Target.detachFromTarget",
                json!({ "sessionId": self.session_id }),
                None,
            )
            .await;
        self.client.shutdown();
    }
}

fn exception_message(details: &Value) -> String {
    details
        .get("exception")
        .and_then(|e| e.get("description"))
        .and_then(Value::as_str)
        .or_else(|| details.get("text").and_then(Value::as_str))
        .unwrap_or("Uncaught exception")
        .to_string()
}
