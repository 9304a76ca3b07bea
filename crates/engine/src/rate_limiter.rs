// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three-tier throttling: per-user cooldown, global in-flight cap, and
//! optional per-account write serialization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy)]
pub struct RateLimited {
    pub wait: Duration,
}

impl std::fmt::Display for RateLimited {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate limited, retry in {:.1}s", self.wait.as_secs_f64())
    }
}

impl std::error::Error for RateLimited {}

/// A lease held while a caller is doing rate-limited work. Dropping it (or
/// calling [`Lease::release`]) frees every resource it acquired, in reverse
/// acquisition order. Both paths are idempotent.
#[derive(Debug)]
pub struct Lease {
    account: Option<OwnedSemaphorePermit>,
    global: Option<OwnedSemaphorePermit>,
}

impl Lease {
    pub fn release(&mut self) {
        self.account.take();
        self.global.take();
    }
}

pub struct RateLimiterConfig {
    pub read_cooldown: Duration,
    pub write_cooldown: Duration,
    pub global_concurrency: usize,
    pub account_write_serialized: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            read_cooldown: Duration::from_secs(1),
            write_cooldown: Duration::from_secs(2),
            global_concurrency: 20,
            account_write_serialized: true,
        }
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    global: Arc<Semaphore>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_read: HashMap<String, Instant>,
    next_write: HashMap<String, Instant>,
    account_locks: HashMap<String, Arc<Semaphore>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let global = Arc::new(Semaphore::new(config.global_concurrency.max(1)));
        Self { config, global, state: Mutex::new(State::default()) }
    }

    /// Acquire a lease for one user's read or write request, optionally
    /// serialized against other writes on the same account.
    ///
    /// Cancellation safety: if the awaiting future is dropped before this
    /// returns, no semaphore permit was ever taken (acquisition is atomic
    /// per step), so there is nothing to release. The user's cooldown
    /// timestamp is committed before the blocking steps and is never rolled
    /// back on cancellation — a cancelled caller still "used" their slot.
    pub async fn acquire(
        &self,
        user_id: &str,
        is_write: bool,
        account_id: Option<&str>,
    ) -> Result<Lease, EngineError> {
        let uid = user_id.trim();
        let now = Instant::now();
        let cooldown = if is_write { self.config.write_cooldown } else { self.config.read_cooldown };

        {
            let mut state = self.state.lock().await;
            let tracking = if is_write { &mut state.next_write } else { &mut state.next_read };
            if let Some(&next_at) = tracking.get(uid) {
                if next_at > now {
                    let wait = (next_at - now).max(Duration::from_millis(100));
                    return Err(RateLimited { wait }.into());
                }
            }
            tracking.insert(uid.to_owned(), now + cooldown);
        }

        let global = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Internal("global semaphore closed unexpectedly".to_owned()))?;

        let account = if is_write && self.config.account_write_serialized {
            match account_id.map(str::trim).filter(|a| !a.is_empty()) {
                Some(aid) => {
                    let lock = {
                        let mut state = self.state.lock().await;
                        Arc::clone(state.account_locks.entry(aid.to_owned()).or_insert_with(|| {
                            Arc::new(Semaphore::new(1))
                        }))
                    };
                    let permit = lock
                        .acquire_owned()
                        .await
                        .map_err(|_| EngineError::Internal("account lock closed unexpectedly".to_owned()))?;
                    Some(permit)
                }
                None => None,
            }
        } else {
            None
        };

        Ok(Lease { account, global: Some(global) })
    }

    /// Number of global permits currently in use (for property tests).
    pub fn global_in_use(&self) -> usize {
        self.config.global_concurrency.saturating_sub(self.global.available_permits())
    }
}

#[cfg(test)]
#[path = "rate_limiter_tests.rs"]
mod tests;
