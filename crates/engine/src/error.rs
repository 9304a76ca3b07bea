// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::time::Duration;

use farmgate::GatewayError;

use crate::rate_limiter::RateLimited;

/// Errors the engine raises across C2-C7. Each variant carries a stable
/// prefix token so the command façade can render `"... [E_FOO]"` style
/// messages without inspecting variant internals.
#[derive(Debug, Clone)]
pub enum EngineError {
    GatewayDisconnected(String),
    GatewayTimeout { service: String, method: String },
    GatewayRemoteError { code: i32, message: String },
    NotRunning { account_id: String, last_start_error: Option<String> },
    NotFound { account_id: String },
    InvalidArgument(String),
    AlreadyBound { account_id: String },
    RateLimited { wait: Duration },
    StartFailedRetryable(String),
    StartFailedPermanent(String),
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::GatewayDisconnected(_) => "E_DISCONNECTED",
            Self::GatewayTimeout { .. } => "E_TIMEOUT",
            Self::GatewayRemoteError { .. } => "E_REMOTE",
            Self::NotRunning { .. } => "E_NOT_RUNNING",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::InvalidArgument(_) => "E_INVALID_ARGUMENT",
            Self::AlreadyBound { .. } => "E_ALREADY_BOUND",
            Self::RateLimited { .. } => "E_RATE_LIMITED",
            Self::StartFailedRetryable(_) => "E_START_RETRYABLE",
            Self::StartFailedPermanent(_) => "E_START_PERMANENT",
            Self::Internal(_) => "E_INTERNAL",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GatewayDisconnected(reason) => write!(f, "{reason} [{}]", self.code()),
            Self::GatewayTimeout { service, method } => {
                write!(f, "request timeout: {service}.{method} [{}]", self.code())
            }
            Self::GatewayRemoteError { code, message } => {
                write!(f, "gateway error {code}: {message} [{}]", self.code())
            }
            Self::NotRunning { account_id, last_start_error } => match last_start_error {
                Some(reason) => {
                    write!(f, "account {account_id} not running: {reason} [{}]", self.code())
                }
                None => write!(f, "account not running [{}]", self.code()),
            },
            Self::NotFound { account_id } => {
                write!(f, "account not found: {account_id} [{}]", self.code())
            }
            Self::InvalidArgument(reason) => write!(f, "{reason} [{}]", self.code()),
            Self::AlreadyBound { account_id } => {
                write!(f, "account {account_id} already bound to another user [{}]", self.code())
            }
            Self::RateLimited { wait } => {
                write!(f, "rate limited, retry in {:.1}s [{}]", wait.as_secs_f64(), self.code())
            }
            Self::StartFailedRetryable(reason) => write!(f, "{reason} [{}]", self.code()),
            Self::StartFailedPermanent(reason) => write!(f, "{reason} [{}]", self.code()),
            Self::Internal(reason) => write!(f, "{reason} [{}]", self.code()),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RateLimited> for EngineError {
    fn from(e: RateLimited) -> Self {
        Self::RateLimited { wait: e.wait }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<GatewayError> for EngineError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Disconnected(reason) => Self::GatewayDisconnected(reason),
            GatewayError::ConnectFailed(reason) => Self::GatewayDisconnected(reason),
            GatewayError::Timeout { service, method } => Self::GatewayTimeout { service, method },
            GatewayError::RemoteError { code, message, .. } => {
                Self::GatewayRemoteError { code, message }
            }
        }
    }
}
