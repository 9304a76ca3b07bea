// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors a [`crate::session::GatewaySession`] can raise.
///
/// The session never logs these in isolation — it raises them and lets the
/// caller decide whether and how to log.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// The WebSocket handshake or send failed outright.
    ConnectFailed(String),
    /// The socket was closed (or never opened) while a call was pending,
    /// or a send was attempted on a closed session.
    Disconnected(String),
    /// A call's deadline expired before a matching reply arrived.
    Timeout { service: String, method: String },
    /// The gateway replied with a non-zero error code.
    RemoteError { service: String, method: String, code: i32, message: String },
}

impl GatewayError {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::ConnectFailed(_) => "E_CONNECT",
            Self::Disconnected(_) => "E_DISCONNECTED",
            Self::Timeout { .. } => "E_TIMEOUT",
            Self::RemoteError { .. } => "E_REMOTE",
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(e) => write!(f, "websocket connect failed: {e}"),
            Self::Disconnected(reason) => write!(f, "websocket is not connected: {reason}"),
            Self::Timeout { service, method } => {
                write!(f, "request timeout: {service}.{method}")
            }
            Self::RemoteError { service, method, code, message } => {
                write!(f, "{service}.{method} error={code} {message}")
            }
        }
    }
}

impl std::error::Error for GatewayError {}
