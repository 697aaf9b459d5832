//! Remote debugging session: one WebSocket, multiplexed commands, events.
//!
//! Commands carry a session-assigned id; a background reader routes each
//! response to the exact waiting caller by that id, so out-of-order replies
//! and slow commands never block unrelated traffic. Unsolicited events fan
//! out to per-method subscribers in connection order.

use crate::error::{ProtocolError, Result};
use futures_util::stream::{SplitStream, StreamExt as _};
use futures_util::SinkExt as _;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Methods whose payloads are far too large to echo at trace level.
const ECHO_EXCLUDED_METHODS: &[&str] = &["IO.read", "Tracing.dataCollected"];

/// Column budget for echoed payloads.
const MAX_ECHO_BYTES: usize = 160;

/// An unsolicited notification from the peer.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolEvent {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    code: i64,
    message: String,
}

/// One inbound frame: a correlated response (`id` present) or an event.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RemoteErrorBody>,
    method: Option<String>,
    params: Option<Value>,
}

type CommandOutcome = std::result::Result<Value, ProtocolError>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<CommandOutcome>>>>;
type Subscribers = Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<ProtocolEvent>>>>>;

/// A connected debugging session.
pub struct Session {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Pending,
    subscribers: Subscribers,
    next_id: AtomicU64,
    default_timeout: Duration,
}

impl Session {
    /// Open the WebSocket and start the reader/writer tasks.
    pub async fn connect(ws_url: &str, default_timeout: Duration) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url).await.map_err(|e| {
            ProtocolError::Connect {
                endpoint: ws_url.to_string(),
                message: e.to_string(),
            }
        })?;
        tracing::info!(endpoint = %ws_url, "debugging session connected");

        let (mut sink, source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let pending: Pending = Arc::default();
        let subscribers: Subscribers = Arc::default();
        tokio::spawn(read_loop(source, Arc::clone(&pending), Arc::clone(&subscribers)));

        Ok(Self {
            outbound,
            pending,
            subscribers,
            next_id: AtomicU64::new(1),
            default_timeout,
        })
    }

    /// Issue a command with the session's default deadline.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, self.default_timeout).await
    }

    /// Issue a command and suspend until its response or the deadline.
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        echo_frame("=>", method, &params);
        let frame = serde_json::json!({ "id": id, "method": method, "params": params });
        let text = serde_json::to_string(&frame).map_err(ProtocolError::Serialization)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        if self.outbound.send(Message::Text(text)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ProtocolError::ConnectionClosed.into());
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome?),
            // Reader dropped the sender: connection went away.
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed.into()),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ProtocolError::CommandTimeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    /// Evaluate a script in the page and return its JSON-serialized value.
    ///
    /// The evaluation awaits promises and returns by value; a script that
    /// raises surfaces as `ProtocolError::ScriptException` with the remote
    /// error text.
    pub async fn evaluate_async(&self, expression: &str, timeout: Duration) -> Result<Value> {
        let params = serde_json::json!({
            "expression": expression,
            "awaitPromise": true,
            "returnByValue": true,
        });
        let result = self.send_with_timeout("Runtime.evaluate", params, timeout).await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("script evaluation failed");
            return Err(ProtocolError::ScriptException(message.to_string()).into());
        }

        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    /// Subscribe to unsolicited events for one method. The receiver only
    /// sees events that arrive after this call.
    pub async fn subscribe(&self, method: &str) -> mpsc::UnboundedReceiver<ProtocolEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .entry(method.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

async fn read_loop(
    mut source: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    pending: Pending,
    subscribers: Subscribers,
) {
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                tracing::warn!(%error, "websocket read failed");
                break;
            }
        };

        let inbound: InboundFrame = match serde_json::from_str(&text) {
            Ok(inbound) => inbound,
            Err(error) => {
                tracing::warn!(%error, "malformed protocol frame");
                continue;
            }
        };

        match inbound.id {
            Some(id) => {
                let Some(waiter) = pending.lock().await.remove(&id) else {
                    // Timed-out command whose response arrived late.
                    tracing::debug!(id, "response with no waiting caller");
                    continue;
                };
                let outcome = match inbound.error {
                    Some(body) => Err(ProtocolError::Remote {
                        code: body.code,
                        message: body.message,
                    }),
                    None => Ok(inbound.result.unwrap_or(Value::Null)),
                };
                let _ = waiter.send(outcome);
            }
            None => {
                let Some(method) = inbound.method else {
                    continue;
                };
                let event = ProtocolEvent {
                    method: method.clone(),
                    params: inbound.params.unwrap_or(Value::Null),
                };
                echo_frame("<=", &event.method, &event.params);
                let mut subs = subscribers.lock().await;
                if let Some(list) = subs.get_mut(&method) {
                    list.retain(|tx| tx.send(event.clone()).is_ok());
                }
            }
        }
    }

    // Connection gone: every in-flight command fails rather than hangs.
    for (_, waiter) in pending.lock().await.drain() {
        let _ = waiter.send(Err(ProtocolError::ConnectionClosed));
    }
}

/// Echo one frame at trace level with a bounded payload width. High-volume
/// methods log the method name only.
fn echo_frame(direction: &str, method: &str, params: &Value) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    if ECHO_EXCLUDED_METHODS.contains(&method) {
        tracing::trace!(direction, method, "protocol frame (payload elided)");
        return;
    }
    let payload = truncate_payload(&params.to_string(), MAX_ECHO_BYTES);
    tracing::trace!(direction, method, %payload, "protocol frame");
}

/// Truncate to at most `max` bytes on a char boundary, marking the cut.
fn truncate_payload(payload: &str, max: usize) -> String {
    if payload.len() <= max {
        return payload.to_string();
    }
    let mut cut = max;
    while !payload.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &payload[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt as _, StreamExt as _};
    use tokio::net::TcpListener;

    /// Minimal debugging peer: hands inbound command frames to `respond`,
    /// which returns any number of frames to write back.
    async fn spawn_stub_peer<F>(respond: F) -> String
    where
        F: FnMut(Value) -> Vec<Value> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut respond = respond;
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else { continue };
                let command: Value = serde_json::from_str(&text).unwrap();
                for reply in respond(command) {
                    ws.send(Message::Text(reply.to_string())).await.unwrap();
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn responses_route_to_their_callers_out_of_order() {
        // Hold the first command's response until the second arrives, then
        // answer in reverse order.
        let held = std::sync::Mutex::new(Vec::<Value>::new());
        let url = spawn_stub_peer(move |command| {
            let mut held = held.lock().unwrap();
            held.push(command);
            if held.len() < 2 {
                return Vec::new();
            }
            held.drain(..)
                .rev()
                .map(|c| {
                    serde_json::json!({
                        "id": c["id"],
                        "result": { "echo": c["method"] },
                    })
                })
                .collect()
        })
        .await;

        let session = Session::connect(&url, Duration::from_secs(5)).await.unwrap();
        let (first, second) = tokio::join!(
            session.send("First.method", serde_json::json!({})),
            session.send("Second.method", serde_json::json!({})),
        );
        assert_eq!(first.unwrap()["echo"], "First.method");
        assert_eq!(second.unwrap()["echo"], "Second.method");
    }

    #[tokio::test]
    async fn remote_error_surfaces_with_code_and_message() {
        let url = spawn_stub_peer(|command| {
            vec![serde_json::json!({
                "id": command["id"],
                "error": { "code": -32000, "message": "target crashed" },
            })]
        })
        .await;

        let session = Session::connect(&url, Duration::from_secs(5)).await.unwrap();
        let error = session.send("Page.navigate", serde_json::json!({})).await.unwrap_err();
        match error {
            crate::error::Error::Protocol(ProtocolError::Remote { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "target crashed");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unanswered_command_times_out() {
        let url = spawn_stub_peer(|_command| Vec::new()).await;
        let session = Session::connect(&url, Duration::from_secs(5)).await.unwrap();
        let error = session
            .send_with_timeout("Never.responds", serde_json::json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            crate::error::Error::Protocol(ProtocolError::CommandTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn events_reach_subscribers_commands_unaffected() {
        let url = spawn_stub_peer(|command| {
            vec![
                serde_json::json!({
                    "method": "Page.loadEventFired",
                    "params": { "timestamp": 12.5 },
                }),
                serde_json::json!({ "id": command["id"], "result": {} }),
            ]
        })
        .await;

        let session = Session::connect(&url, Duration::from_secs(5)).await.unwrap();
        let mut events = session.subscribe("Page.loadEventFired").await;
        session.send("Page.enable", serde_json::json!({})).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.method, "Page.loadEventFired");
        assert_eq!(event.params["timestamp"], 12.5);
    }

    #[tokio::test]
    async fn script_exception_rejects_with_remote_message() {
        let url = spawn_stub_peer(|command| {
            vec![serde_json::json!({
                "id": command["id"],
                "result": {
                    "result": { "type": "object" },
                    "exceptionDetails": {
                        "text": "Uncaught",
                        "exception": { "description": "Error: boom" },
                    },
                },
            })]
        })
        .await;

        let session = Session::connect(&url, Duration::from_secs(5)).await.unwrap();
        let error = session
            .evaluate_async("throw new Error('boom')", Duration::from_secs(5))
            .await
            .unwrap_err();
        match error {
            crate::error::Error::Protocol(ProtocolError::ScriptException(message)) => {
                assert_eq!(message, "Error: boom");
            }
            other => panic!("expected script exception, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn evaluate_async_returns_the_script_value() {
        let url = spawn_stub_peer(|command| {
            vec![serde_json::json!({
                "id": command["id"],
                "result": { "result": { "type": "number", "value": 42 } },
            })]
        })
        .await;

        let session = Session::connect(&url, Duration::from_secs(5)).await.unwrap();
        let value = session.evaluate_async("6 * 7", Duration::from_secs(5)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn payload_truncation_respects_budget_and_char_boundaries() {
        assert_eq!(truncate_payload("short", 10), "short");

        let long = "x".repeat(300);
        let truncated = truncate_payload(&long, MAX_ECHO_BYTES);
        assert_eq!(truncated.len(), MAX_ECHO_BYTES + 3);
        assert!(truncated.ends_with("..."));

        // A multi-byte char straddling the cut must not split.
        let accented = "é".repeat(100);
        let truncated = truncate_payload(&accented, 33);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 36);
    }

    #[test]
    fn excluded_methods_are_known_high_volume() {
        assert!(ECHO_EXCLUDED_METHODS.contains(&"IO.read"));
        assert!(ECHO_EXCLUDED_METHODS.contains(&"Tracing.dataCollected"));
    }
}
