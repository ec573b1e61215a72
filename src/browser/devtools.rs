//! # Devtools protocol connection.
//!
//! [`CdpConnection`] talks to one page target over WebSocket.
//!
//! ```text
//!  send(method, params) ──► pending[id] = oneshot ──► ws sink
//!                                                       │
//!  reader task ◄── ws stream ◄──────────────────────────┘
//!     ├─ {"id": n, ...}      → pending.remove(n).send(result | error)
//!     └─ {"method": m, ...}  → event handler (console / log errors)
//! ```
//!
//! ## Rules
//! - One writer: `send` takes `&mut self`, matching one render per slot.
//! - Every command is bounded by the caller's context (if any) and a per-command timeout.
//! - When the socket closes, pending commands fail with [`DevtoolsError::Closed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::{ErrorKind, RenderError};
use crate::pool::RenderContext;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, DevtoolsError>>>>>;

/// Callback for protocol events: `(method, params)`.
pub type EventHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Protocol-level failures.
#[derive(Error, Debug, Clone)]
pub enum DevtoolsError {
    #[error("devtools endpoint {url} not ready after {waited:?}")]
    EndpointNotReady { url: String, waited: Duration },

    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("{method} failed: {message} (code {code})")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    #[error("malformed response to {0}")]
    Malformed(String),

    #[error("{method} got no response within {timeout:?}")]
    CommandTimeout { method: String, timeout: Duration },

    #[error("devtools connection closed")]
    Closed,

    #[error("cancelled by caller")]
    Cancelled,

    #[error("render deadline exceeded")]
    DeadlineExceeded,
}

impl DevtoolsError {
    /// Classifies the failure of a render step.
    ///
    /// Cancellation and deadlines win over the step's own kind; a dead
    /// connection means the engine itself failed.
    pub fn classify(self, step: ErrorKind, detail: Option<String>) -> RenderError {
        let kind = match &self {
            DevtoolsError::Cancelled => ErrorKind::ClientDropped,
            DevtoolsError::DeadlineExceeded => ErrorKind::Timeout,
            DevtoolsError::Closed | DevtoolsError::WebSocket(_) => ErrorKind::UnhandledEngineFault,
            _ => step,
        };
        let err = RenderError::new(kind).with_source(self);
        match detail {
            Some(d) => err.with_detail(d),
            None => err,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    web_socket_debugger_url: Option<String>,
}

#[derive(Deserialize)]
struct Incoming {
    id: Option<u64>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    result: Option<Value>,
    error: Option<ProtocolError>,
}

#[derive(Deserialize)]
struct ProtocolError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Polls `{base}/json/list` until a page target with a debugger URL appears.
pub async fn discover_page_target(
    http: &reqwest::Client,
    base_url: &str,
    timeout: Duration,
) -> Result<String, DevtoolsError> {
    let url = format!("{base_url}/json/list");
    let started = tokio::time::Instant::now();
    loop {
        let attempt = async {
            let targets: Vec<TargetInfo> = http.get(&url).send().await?.json().await?;
            Ok::<_, reqwest::Error>(
                targets
                    .into_iter()
                    .find(|t| t.kind == "page")
                    .and_then(|t| t.web_socket_debugger_url),
            )
        };
        match attempt.await {
            Ok(Some(ws)) => return Ok(ws),
            Ok(None) => trace!(%url, "no page target yet"),
            Err(e) => trace!(%url, error = %e, "devtools endpoint not reachable yet"),
        }
        if started.elapsed() >= timeout {
            return Err(DevtoolsError::EndpointNotReady {
                url,
                waited: timeout,
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// An open devtools session on one page target.
pub struct CdpConnection {
    sink: SplitSink<WsStream, Message>,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    command_timeout: Duration,
}

impl CdpConnection {
    /// Discovers the page target behind `base_url` and opens its WebSocket.
    pub async fn connect(
        base_url: &str,
        startup_timeout: Duration,
        command_timeout: Duration,
        on_event: EventHandler,
    ) -> Result<Self, DevtoolsError> {
        let http = reqwest::Client::new();
        let ws_url = discover_page_target(&http, base_url, startup_timeout).await?;
        let (ws, _resp) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| DevtoolsError::WebSocket(e.to_string()))?;
        debug!(%ws_url, "devtools connected");

        let (sink, stream) = ws.split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&pending), on_event));

        Ok(Self {
            sink,
            pending,
            next_id: AtomicU64::new(1),
            reader,
            command_timeout,
        })
    }

    /// Sends one command and waits for its result.
    ///
    /// `ctx = None` means the command is not tied to a caller (cleanup, startup).
    pub async fn send(
        &mut self,
        method: &str,
        params: Value,
        ctx: Option<&RenderContext>,
    ) -> Result<Value, DevtoolsError> {
        let rx = self.dispatch(method, params).await?;
        self.await_response(method, rx, ctx).await
    }

    /// Writes all commands first, then collects every result in order.
    pub async fn send_batch(
        &mut self,
        commands: Vec<(&str, Value)>,
    ) -> Vec<Result<Value, DevtoolsError>> {
        let mut waiting = Vec::with_capacity(commands.len());
        for (method, params) in commands {
            waiting.push((method, self.dispatch(method, params).await));
        }

        let mut results = Vec::with_capacity(waiting.len());
        for (method, rx) in waiting {
            results.push(match rx {
                Ok(rx) => self.await_response(method, rx, None).await,
                Err(e) => Err(e),
            });
        }
        results
    }

    async fn dispatch(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<oneshot::Receiver<Result<Value, DevtoolsError>>, DevtoolsError> {
        if self.reader.is_finished() {
            return Err(DevtoolsError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut payload = json!({ "id": id, "method": method });
        if !params.is_null() {
            payload["params"] = params;
        }
        if let Err(e) = self.sink.send(Message::Text(payload.to_string())).await {
            self.pending.lock().remove(&id);
            return Err(DevtoolsError::WebSocket(e.to_string()));
        }
        Ok(rx)
    }

    async fn await_response(
        &self,
        method: &str,
        rx: oneshot::Receiver<Result<Value, DevtoolsError>>,
        ctx: Option<&RenderContext>,
    ) -> Result<Value, DevtoolsError> {
        let response = async {
            match tokio::time::timeout(self.command_timeout, rx).await {
                Ok(Ok(res)) => res,
                Ok(Err(_)) => Err(DevtoolsError::Closed),
                Err(_) => Err(DevtoolsError::CommandTimeout {
                    method: method.to_string(),
                    timeout: self.command_timeout,
                }),
            }
        };
        let res = match ctx {
            None => response.await,
            Some(ctx) => tokio::select! {
                res = response => res,
                err = ctx.done() => Err(if err.kind() == ErrorKind::Timeout {
                    DevtoolsError::DeadlineExceeded
                } else {
                    DevtoolsError::Cancelled
                }),
            },
        };
        res.map_err(|e| match e {
            DevtoolsError::Protocol { code, message, .. } => DevtoolsError::Protocol {
                method: method.to_string(),
                code,
                message,
            },
            other => other,
        })
    }

    /// Closes the socket and stops the reader.
    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
        self.reader.abort();
        self.pending.lock().clear();
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: futures::stream::SplitStream<WsStream>,
    pending: Pending,
    on_event: EventHandler,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "devtools read failed");
                break;
            }
        };
        let msg: Incoming = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "undecodable devtools message");
                continue;
            }
        };

        if let Some(id) = msg.id {
            let Some(tx) = pending.lock().remove(&id) else {
                continue;
            };
            let res = match msg.error {
                Some(err) => Err(DevtoolsError::Protocol {
                    method: String::new(),
                    code: err.code,
                    message: err.message,
                }),
                None => Ok(msg.result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(res);
        } else if let Some(method) = msg.method {
            on_event(&method, &msg.params);
        }
    }
    // Dropping the senders fails every waiting command with `Closed`.
    pending.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_and_deadline_override_step_kind() {
        let err = DevtoolsError::Cancelled.classify(ErrorKind::CookieInjectionFailure, None);
        assert_eq!(err.kind(), ErrorKind::ClientDropped);

        let err = DevtoolsError::DeadlineExceeded.classify(ErrorKind::ElementWaitFailure, None);
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err = DevtoolsError::Protocol {
            method: "Network.setCookies".into(),
            code: -32602,
            message: "Invalid cookie fields".into(),
        }
        .classify(ErrorKind::CookieInjectionFailure, None);
        assert_eq!(err.kind(), ErrorKind::CookieInjectionFailure);
    }

    #[test]
    fn dead_connection_is_an_engine_fault() {
        let err =
            DevtoolsError::Closed.classify(ErrorKind::GenerationFailure, Some("print".into()));
        assert_eq!(err.kind(), ErrorKind::UnhandledEngineFault);
        assert_eq!(err.detail(), Some("print"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_times_out() {
        let http = reqwest::Client::new();
        let err = discover_page_target(&http, "http://127.0.0.1:1", Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, DevtoolsError::EndpointNotReady { .. }));
    }
}
