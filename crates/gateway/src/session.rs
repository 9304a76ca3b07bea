// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single duplex WebSocket session to the game gateway.
//!
//! One [`GatewaySession`] multiplexes many concurrent [`GatewaySession::call`]
//! invocations (request/reply correlation keyed by `client_seq`) and fans out
//! server-push events to a [`NotifyBus`]. Exactly one send task owns the
//! socket's write half; exactly one receive task owns the read half.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use prost::Message as _;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::notify::{NotifyBus, NotifyHandler};
use crate::proto::{Envelope, EventMessage, Meta};

const MESSAGE_TYPE_REQUEST: i32 = 1;
const MESSAGE_TYPE_REPLY: i32 = 2;
const MESSAGE_TYPE_EVENT: i32 = 3;

/// Fixed connection parameters for one gateway session.
#[derive(Debug, Clone)]
pub struct GatewaySessionConfig {
    pub gateway_url: String,
    pub platform: String,
    pub os: String,
    pub client_version: String,
    pub origin: String,
    pub user_agent: String,
    pub rpc_timeout: Duration,
}

impl Default for GatewaySessionConfig {
    fn default() -> Self {
        Self {
            gateway_url: String::new(),
            platform: "qq".to_owned(),
            os: "iOS".to_owned(),
            client_version: "1.6.0.5_20251224".to_owned(),
            origin: "https://servicewechat.com".to_owned(),
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) MicroMessenger"
                .to_owned(),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

struct PendingCall {
    reply: oneshot::Sender<Result<Bytes, GatewayError>>,
}

struct Shared {
    config: GatewaySessionConfig,
    write: Mutex<Option<futures_util::stream::SplitSink<WsStream, WsMessage>>>,
    next_client_seq: AtomicU64,
    server_seq: AtomicU64,
    pending: Mutex<HashMap<u64, PendingCall>>,
    notify: NotifyBus,
    connected: AtomicBool,
    cancel: CancellationToken,
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// One duplex session to the game gateway.
pub struct GatewaySession {
    shared: Arc<Shared>,
}

impl GatewaySession {
    /// Build a session bound to `config`. Does not connect; call
    /// [`Self::start`] to open the socket.
    pub fn new(config: GatewaySessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                write: Mutex::new(None),
                next_client_seq: AtomicU64::new(0),
                server_seq: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                notify: NotifyBus::new(),
                connected: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Open the WebSocket to the configured gateway URL with the standard
    /// login-code query string, and spawn the receive loop. Idempotent is
    /// not guaranteed across reconnects — callers (the account runtime) own
    /// the reconnect cadence and must call [`Self::stop`] first.
    pub async fn start(&self, code: &str) -> Result<(), GatewayError> {
        if code.trim().is_empty() {
            return Err(GatewayError::ConnectFailed("missing login code".to_owned()));
        }

        let url = format!(
            "{}?platform={}&os={}&ver={}&code={}&openID=",
            self.shared.config.gateway_url,
            urlencode(&self.shared.config.platform),
            urlencode(&self.shared.config.os),
            urlencode(&self.shared.config.client_version),
            urlencode(code),
        );

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| GatewayError::ConnectFailed(e.to_string()))?;
        request.headers_mut().insert(
            "Origin",
            self.shared
                .config
                .origin
                .parse()
                .map_err(|_| GatewayError::ConnectFailed("invalid origin header".to_owned()))?,
        );
        request.headers_mut().insert(
            "User-Agent",
            self.shared
                .config
                .user_agent
                .parse()
                .map_err(|_| GatewayError::ConnectFailed("invalid user-agent header".to_owned()))?,
        );

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| GatewayError::ConnectFailed(e.to_string()))?;
        let (write, read) = stream.split();

        *self.shared.write.lock().await = Some(write);
        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.next_client_seq.store(0, Ordering::SeqCst);
        self.shared.server_seq.store(0, Ordering::SeqCst);

        tokio::spawn(receive_loop(Arc::clone(&self.shared), read));
        Ok(())
    }

    /// Issue a request and await the matching reply. Serializes
    /// `client_seq` allocation with the write under a single lock so two
    /// concurrent callers never race for the same sequence number.
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Bytes, GatewayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let client_seq = {
            let mut write_guard = self.shared.write.lock().await;
            let Some(sink) = write_guard.as_mut() else {
                return Err(GatewayError::Disconnected("websocket is not connected".to_owned()));
            };

            let client_seq = self.shared.next_client_seq.fetch_add(1, Ordering::SeqCst) + 1;
            let envelope = Envelope {
                meta: Some(Meta {
                    service_name: service.to_owned(),
                    method_name: method.to_owned(),
                    message_type: MESSAGE_TYPE_REQUEST,
                    client_seq,
                    server_seq: self.shared.server_seq.load(Ordering::SeqCst),
                    error_code: 0,
                    error_message: String::new(),
                }),
                body,
            };

            self.shared.pending.lock().await.insert(client_seq, PendingCall { reply: reply_tx });

            if let Err(e) = sink.send(WsMessage::Binary(envelope.encode_to_vec().into())).await {
                self.shared.pending.lock().await.remove(&client_seq);
                return Err(GatewayError::Disconnected(e.to_string()));
            }
            client_seq
        };

        let timeout = timeout.unwrap_or(self.shared.config.rpc_timeout);
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                Err(GatewayError::Disconnected("websocket is not connected".to_owned()))
            }
            Err(_) => {
                self.shared.pending.lock().await.remove(&client_seq);
                Err(GatewayError::Timeout {
                    service: service.to_owned(),
                    method: method.to_owned(),
                })
            }
        }
    }

    /// Register a server-push handler. `"*"` receives every event type.
    pub async fn on_notify(&self, event_type: &str, handler: NotifyHandler) {
        self.shared.notify.on(event_type, handler).await;
    }

    pub async fn off_notify(&self, event_type: &str, handler: &NotifyHandler) {
        self.shared.notify.off(event_type, handler).await;
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Idempotent shutdown: closes the socket and completes every pending
    /// call with [`GatewayError::Disconnected`].
    pub async fn stop(&self) {
        self.shared.cancel.cancel();
        if let Some(mut sink) = self.shared.write.lock().await.take() {
            let _ = sink.close().await;
        }
        drain_pending(&self.shared, "session stopped").await;
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}

async fn drain_pending(shared: &Arc<Shared>, reason: &str) {
    let mut pending = shared.pending.lock().await;
    for (_, call) in pending.drain() {
        let _ = call.reply.send(Err(GatewayError::Disconnected(reason.to_owned())));
    }
}

async fn receive_loop(shared: Arc<Shared>, mut read: futures_util::stream::SplitStream<WsStream>) {
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        if let Err(e) = handle_frame(&shared, &bytes).await {
                            tracing::warn!(error = %e, "failed to decode gateway frame");
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "gateway websocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    *shared.write.lock().await = None;
    drain_pending(&shared, "websocket is closed").await;
}

async fn handle_frame(shared: &Arc<Shared>, bytes: &[u8]) -> Result<(), prost::DecodeError> {
    let envelope = Envelope::decode(bytes)?;
    let Some(meta) = envelope.meta else {
        return Ok(());
    };
    shared.server_seq.store(meta.server_seq, Ordering::SeqCst);

    match meta.message_type {
        t if t == MESSAGE_TYPE_REPLY => {
            if let Some(call) = shared.pending.lock().await.remove(&meta.client_seq) {
                let result = if meta.error_code != 0 {
                    Err(GatewayError::RemoteError {
                        service: meta.service_name,
                        method: meta.method_name,
                        code: meta.error_code,
                        message: meta.error_message,
                    })
                } else {
                    Ok(Bytes::from(envelope.body))
                };
                let _ = call.reply.send(result);
            }
        }
        t if t == MESSAGE_TYPE_EVENT => {
            if let Ok(event) = EventMessage::decode(envelope.body.as_slice()) {
                shared.notify.dispatch(&event.message_type, &event.body).await;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
