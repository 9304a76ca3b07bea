// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gateway session: a single framed-binary WebSocket connection to the
//! game backend, with request/reply correlation and server-push dispatch.

pub mod error;
pub mod notify;
pub mod session;

/// Generated protobuf types for the gateway wire envelope and domain
/// request/reply bodies.
pub mod proto {
    #![allow(clippy::all)]
    include!(concat!(env!("OUT_DIR"), "/farm.v1.rs"));
}

pub use error::GatewayError;
pub use notify::{NotifyBus, NotifyHandler};
pub use session::{GatewaySession, GatewaySessionConfig};
