// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn urlencode_leaves_unreserved_chars_alone() {
    assert_eq!(urlencode("abcXYZ019-_.~"), "abcXYZ019-_.~");
}

#[test]
fn urlencode_escapes_everything_else() {
    assert_eq!(urlencode("a b"), "a%20b");
    assert_eq!(urlencode("1.6.0.5_20251224"), "1.6.0.5_20251224");
}

#[tokio::test]
async fn start_rejects_empty_login_code() {
    let session = GatewaySession::new(GatewaySessionConfig {
        gateway_url: "wss://example.invalid/ws".to_owned(),
        ..Default::default()
    });
    let err = session.start("   ").await.unwrap_err();
    assert!(matches!(err, GatewayError::ConnectFailed(_)));
    assert_eq!(err.to_string(), "websocket connect failed: missing login code");
}

#[tokio::test]
async fn call_on_unconnected_session_fails_disconnected() {
    let session = GatewaySession::new(GatewaySessionConfig::default());
    let err = session.call("gamepb.userpb.UserService", "Heartbeat", vec![], None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Disconnected(_)));
}

#[tokio::test]
async fn stop_on_never_started_session_is_a_no_op() {
    let session = GatewaySession::new(GatewaySessionConfig::default());
    session.stop().await;
    session.stop().await;
    assert!(!session.is_connected());
}
