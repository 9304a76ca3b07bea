// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed server-push notification bus.
//!
//! Handlers are keyed by the event's string tag; `"*"` subscribers receive
//! every event regardless of tag. Dispatch snapshots the handler list under
//! the lock, then invokes handlers outside it so a slow or panicking handler
//! never blocks registration or the receive loop's lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

pub type NotifyHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

#[derive(Default)]
pub struct NotifyBus {
    handlers: Mutex<HashMap<String, Vec<NotifyHandler>>>,
}

impl NotifyBus {
    pub fn new() -> Self {
        Self { handlers: Mutex::new(HashMap::new()) }
    }

    /// Register a handler for `event_type` ("*" for wildcard). Returns a
    /// token that can be passed to [`Self::off`] to remove it.
    pub async fn on(&self, event_type: &str, handler: NotifyHandler) {
        self.handlers.lock().await.entry(event_type.to_owned()).or_default().push(handler);
    }

    /// Remove a previously registered handler by pointer identity.
    pub async fn off(&self, event_type: &str, handler: &NotifyHandler) {
        let mut guard = self.handlers.lock().await;
        if let Some(list) = guard.get_mut(event_type) {
            list.retain(|h| !Arc::ptr_eq(h, handler));
        }
    }

    /// Dispatch one event to the `event_type` subscribers and the `"*"`
    /// subscribers. A handler that panics is caught and logged; it does not
    /// interrupt the remaining handlers.
    pub async fn dispatch(&self, event_type: &str, body: &[u8]) {
        let targets: Vec<NotifyHandler> = {
            let guard = self.handlers.lock().await;
            let mut targets = Vec::new();
            if let Some(list) = guard.get(event_type) {
                targets.extend(list.iter().cloned());
            }
            if let Some(list) = guard.get("*") {
                targets.extend(list.iter().cloned());
            }
            targets
        };

        for handler in targets {
            let event_type = event_type.to_owned();
            let body = body.to_vec();
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event_type, &body)))
                .is_err()
            {
                tracing::warn!(event_type = %event_type, "notify handler panicked");
            }
        }
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
