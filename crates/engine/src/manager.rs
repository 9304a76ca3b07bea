// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C5: the multi-account registry. Owns every [`AccountRuntime`], the five
//! persisted JSON documents (accounts, settings, runtime status, bindings
//! are C7's, logs), and the start-with-retry classification policy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config_store::ConfigStore;
use crate::error::EngineError;
use crate::model::{Account, AccountSettings, LogEntry, OperationCounters, RuntimeState, RuntimeStatusRow};
use crate::persist;
use crate::rate_limiter::RateLimiter;
#[cfg(test)]
use crate::rate_limiter::RateLimiterConfig;
use crate::runtime::{AccountRuntime, LogSink};

const MAX_RETRY_COUNT: u32 = 5;
const BASE_BACKOFF_SECS: u64 = 2;
const MAX_LOG_ROWS: usize = 2000;

/// Substrings of a connect/login failure that indicate a permanent
/// condition (bad credentials, banned account) as opposed to a transient
/// one (network hiccup, server-side throttling). Checked before the
/// retryable list since a message can contain both ("connection reset"
/// while also naming a banned account) and permanence should win.
const PERMANENT_SUBSTRINGS: [&str; 8] = [
    "missing login code",
    "code 不能为空",
    ".login error=",
    "userservice.login error=",
    "账号不存在",
    "account_id",
    "invalid response status",
    " 400",
];
const RETRYABLE_SUBSTRINGS: [&str; 8] = [
    "websocket disconnected",
    "connect failed",
    "timeout",
    "connection reset",
    "broken pipe",
    "network",
    "temporarily unavailable",
    "ws",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Permanent,
}

/// Rewrites recognized gateway failure messages into user-actionable
/// prose. Applied before [`classify_failure`] so classification always
/// sees the normalized text.
pub fn normalize_error(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("invalid response status") || lower.contains(" 400") {
        return "gateway auth failed, re-bind code or re-scan".to_owned();
    }
    message.to_owned()
}

/// Classifies a start failure by substring match against known phrases;
/// anything unrecognized defaults to permanent, so an unfamiliar error
/// surfaces immediately as `failed` instead of silently retrying forever.
pub fn classify_failure(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    if PERMANENT_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return FailureClass::Permanent;
    }
    if RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return FailureClass::Retryable;
    }
    FailureClass::Permanent
}

/// Exponential backoff with a cap, `base * 2^attempt` seconds, attempt
/// starting at 0 for the first retry.
pub fn backoff_seconds(attempt: u32) -> u64 {
    BASE_BACKOFF_SECS.saturating_mul(1u64 << attempt.min(10)).min(300)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    default: AccountSettings,
    #[serde(default)]
    per_account: HashMap<String, AccountSettings>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RuntimeFile {
    #[serde(default)]
    status: HashMap<String, RuntimeStatusRow>,
    #[serde(default)]
    counters: HashMap<String, OperationCounters>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LogsFile {
    #[serde(default)]
    entries: Vec<LogEntry>,
}

struct Registry {
    accounts: HashMap<String, Account>,
    default_settings: AccountSettings,
    per_account_settings: HashMap<String, AccountSettings>,
    status: HashMap<String, RuntimeStatusRow>,
    runtimes: HashMap<String, Arc<AccountRuntime>>,
    logs: Vec<LogEntry>,
}

pub struct AccountManager {
    accounts_path: PathBuf,
    settings_path: PathBuf,
    runtime_path: PathBuf,
    logs_path: PathBuf,
    gateway_url: String,
    config: Arc<ConfigStore>,
    rate_limiter: Arc<RateLimiter>,
    registry: Mutex<Registry>,
    /// Serializes start attempts per account so retries never overlap.
    start_locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AccountManager {
    pub fn open(
        data_dir: &Path,
        gateway_url: String,
        config: Arc<ConfigStore>,
        rate_limiter: Arc<RateLimiter>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let accounts_path = data_dir.join("accounts_v2.json");
        let settings_path = data_dir.join("settings_v2.json");
        let runtime_path = data_dir.join("runtime_v2.json");
        let logs_path = data_dir.join("runtime_logs_v2.json");

        let accounts_file: AccountsFile = persist::load_or_default(&accounts_path);
        let settings_file: SettingsFile = persist::load_or_default(&settings_path);
        let runtime_file: RuntimeFile = persist::load_or_default(&runtime_path);
        let logs_file: LogsFile = persist::load_or_default(&logs_path);

        let accounts = accounts_file.accounts.into_iter().map(|a| (a.id.clone(), a)).collect();

        Ok(Self {
            accounts_path,
            settings_path,
            runtime_path,
            logs_path,
            gateway_url,
            config,
            rate_limiter,
            registry: Mutex::new(Registry {
                accounts,
                default_settings: settings_file.default,
                per_account_settings: settings_file.per_account,
                status: runtime_file.status,
                runtimes: HashMap::new(),
                logs: logs_file.entries,
            }),
            start_locks: StdMutex::new(HashMap::new()),
        })
    }

    /// Creates the account if absent, or replaces its login code (a full
    /// upsert) if present, preserving `created_at`.
    pub async fn upsert_account(&self, mut account: Account) -> anyhow::Result<()> {
        let mut registry = self.registry.lock().await;
        if let Some(existing) = registry.accounts.get(&account.id) {
            account.created_at = existing.created_at;
        }
        registry.accounts.insert(account.id.clone(), account);
        self.save_accounts(&registry)?;
        Ok(())
    }

    /// Removes an account and its runtime. A running account is stopped
    /// first; this is the "kickout" path and is intentionally destructive
    /// since a deleted login code cannot be resumed.
    pub async fn delete_account(&self, account_id: &str) -> anyhow::Result<bool> {
        let runtime = {
            let mut registry = self.registry.lock().await;
            let removed = registry.accounts.remove(account_id).is_some();
            registry.status.remove(account_id);
            registry.per_account_settings.remove(account_id);
            let runtime = registry.runtimes.remove(account_id);
            if removed {
                self.save_accounts(&registry)?;
                self.save_runtime(&registry)?;
            }
            if !removed {
                return Ok(false);
            }
            runtime
        };
        if let Some(runtime) = runtime {
            runtime.stop().await;
        }
        self.append_log(LogEntry::new(now(), "manager", format!("account {account_id} deleted"), true, Some(account_id.to_owned()), Default::default())).await?;
        Ok(true)
    }

    pub async fn get_account(&self, account_id: &str) -> Option<Account> {
        self.registry.lock().await.accounts.get(account_id).cloned()
    }

    pub async fn list_accounts(&self) -> Vec<Account> {
        self.registry.lock().await.accounts.values().cloned().collect()
    }

    pub async fn effective_settings(&self, account_id: &str) -> AccountSettings {
        let registry = self.registry.lock().await;
        registry.per_account_settings.get(account_id).cloned().unwrap_or_else(|| registry.default_settings.clone())
    }

    pub async fn save_account_settings(&self, account_id: &str, mut settings: AccountSettings) -> anyhow::Result<()> {
        let mut registry = self.registry.lock().await;
        settings.revision += 1;
        registry.per_account_settings.insert(account_id.to_owned(), settings.clone());
        self.save_settings(&registry)?;
        if let Some(runtime) = registry.runtimes.get(account_id) {
            runtime.update_settings(settings);
        }
        Ok(())
    }

    pub async fn save_default_settings(&self, mut settings: AccountSettings) -> anyhow::Result<()> {
        let mut registry = self.registry.lock().await;
        settings.revision += 1;
        registry.default_settings = settings;
        self.save_settings(&registry)
    }

    pub async fn status_of(&self, account_id: &str) -> RuntimeStatusRow {
        self.registry.lock().await.status.get(account_id).cloned().unwrap_or_default()
    }

    /// Starts an account's runtime with retry: each failure is classified
    /// as retryable or permanent; retryable failures back off
    /// exponentially up to [`MAX_RETRY_COUNT`] attempts before giving up.
    pub async fn start_account(&self, account_id: &str) -> Result<(), EngineError> {
        let lock = {
            let mut locks = self.start_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(account_id.to_owned()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))))
        };
        let _guard = lock.lock().await;

        let account = self
            .get_account(account_id)
            .await
            .ok_or_else(|| EngineError::NotFound { account_id: account_id.to_owned() })?;

        {
            let already_running = self.registry.lock().await.runtimes.get(account_id).map(|r| r.is_running()).unwrap_or(false);
            if already_running {
                return Ok(());
            }
        }

        self.set_status(account_id, |s| {
            s.state = RuntimeState::Starting;
            s.last_start_at = now();
        }).await?;

        let mut attempt = 0u32;
        loop {
            let settings = self.effective_settings(account_id).await;
            let log_sink = self.log_sink(account_id);
            let runtime = Arc::new(AccountRuntime::new(
                account.clone(),
                settings,
                Arc::clone(&self.config),
                Arc::clone(&self.rate_limiter),
                self.gateway_url.clone(),
                log_sink,
            ));

            match runtime.start().await {
                Ok(()) => {
                    self.registry.lock().await.runtimes.insert(account_id.to_owned(), runtime);
                    self.set_status(account_id, |s| {
                        s.state = RuntimeState::Running;
                        s.last_start_success_at = now();
                        s.start_retry_count = attempt;
                        s.last_start_error.clear();
                    }).await?;
                    info!(account_id, attempt, "account runtime started");
                    return Ok(());
                }
                Err(e) => {
                    let message = normalize_error(&e.to_string());
                    let class = classify_failure(&message);
                    warn!(account_id, attempt, error = %message, classification = ?class, "account start failed");

                    if class == FailureClass::Permanent || attempt >= MAX_RETRY_COUNT {
                        let reported = format!("{message} (重试{}/{MAX_RETRY_COUNT})", attempt + 1);
                        self.set_status(account_id, |s| {
                            s.state = RuntimeState::Failed;
                            s.last_start_error = reported.clone();
                            s.start_retry_count = attempt;
                        }).await?;
                        self.append_log(LogEntry::new(now(), "manager", format!("account {account_id} start failed: {reported}"), true, Some(account_id.to_owned()), Default::default())).await?;
                        return Err(if class == FailureClass::Permanent {
                            EngineError::StartFailedPermanent(reported)
                        } else {
                            EngineError::StartFailedRetryable(reported)
                        });
                    }

                    self.set_status(account_id, |s| {
                        s.state = RuntimeState::Retrying;
                        s.last_start_error = message.clone();
                        s.start_retry_count = attempt + 1;
                    }).await?;
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_seconds(attempt))).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn stop_account(&self, account_id: &str) -> Result<(), EngineError> {
        let runtime = self.registry.lock().await.runtimes.remove(account_id);
        if let Some(runtime) = runtime {
            runtime.stop().await;
        }
        self.set_status(account_id, |s| s.state = RuntimeState::Stopped).await?;
        Ok(())
    }

    pub async fn counters_of(&self, account_id: &str) -> OperationCounters {
        let runtime = self.registry.lock().await.runtimes.get(account_id).cloned();
        runtime.map(|r| r.counters()).unwrap_or_default()
    }

    pub async fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        let registry = self.registry.lock().await;
        registry.logs.iter().rev().take(limit).cloned().collect()
    }

    async fn set_status(&self, account_id: &str, f: impl FnOnce(&mut RuntimeStatusRow)) -> anyhow::Result<()> {
        let mut registry = self.registry.lock().await;
        let row = registry.status.entry(account_id.to_owned()).or_default();
        f(row);
        self.save_runtime(&registry)
    }

    async fn append_log(&self, entry: LogEntry) -> anyhow::Result<()> {
        let mut registry = self.registry.lock().await;
        registry.logs.push(entry);
        if registry.logs.len() > MAX_LOG_ROWS {
            let overflow = registry.logs.len() - MAX_LOG_ROWS;
            registry.logs.drain(0..overflow);
        }
        persist::save_atomic(&self.logs_path, &LogsFile { entries: registry.logs.clone() })
    }

    fn log_sink(&self, account_id: &str) -> LogSink {
        let logs_path = self.logs_path.clone();
        let account_id = account_id.to_owned();
        Arc::new(move |is_warn: bool, tag: &str, msg: &str| {
            let mut file: LogsFile = persist::load_or_default(&logs_path);
            file.entries.push(LogEntry::new(now(), tag, msg, is_warn, Some(account_id.clone()), Default::default()));
            if file.entries.len() > MAX_LOG_ROWS {
                let overflow = file.entries.len() - MAX_LOG_ROWS;
                file.entries.drain(0..overflow);
            }
            let _ = persist::save_atomic(&logs_path, &file);
        })
    }

    fn save_accounts(&self, registry: &Registry) -> anyhow::Result<()> {
        persist::save_atomic(&self.accounts_path, &AccountsFile { accounts: registry.accounts.values().cloned().collect() })
    }

    fn save_settings(&self, registry: &Registry) -> anyhow::Result<()> {
        persist::save_atomic(
            &self.settings_path,
            &SettingsFile { default: registry.default_settings.clone(), per_account: registry.per_account_settings.clone() },
        )
    }

    fn save_runtime(&self, registry: &Registry) -> anyhow::Result<()> {
        persist::save_atomic(&self.runtime_path, &RuntimeFile { status: registry.status.clone(), counters: HashMap::new() })
    }
}

fn now() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
