// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data model shared across C3-C7: accounts, layered settings, runtime
//! status rows, and bindings.

use serde::{Deserialize, Serialize};

/// Identity of one game login. Created by upsert, mutated by upsert (full
/// replace of the login code on re-bind), destroyed by delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Opaque login code. Treated as a secret: never logged.
    pub code: String,
    #[serde(default)]
    pub uin: Option<String>,
    #[serde(default)]
    pub qq: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Path to the locally-written invite share file. Only consulted on
    /// the `wx` platform; absent on every other platform.
    #[serde(default)]
    pub share_file_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_platform() -> String {
    "qq".to_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FertilizerMode {
    Both,
    Normal,
    Organic,
    None,
}

impl Default for FertilizerMode {
    fn default() -> Self {
        Self::None
    }
}

impl FertilizerMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "both" => Some(Self::Both),
            "normal" => Some(Self::Normal),
            "organic" => Some(Self::Organic),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Preferred,
    Level,
    MaxExp,
    MaxFertExp,
    MaxProfit,
    MaxFertProfit,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Preferred
    }
}

impl Strategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preferred" => Some(Self::Preferred),
            "level" => Some(Self::Level),
            "max_exp" => Some(Self::MaxExp),
            "max_fert_exp" => Some(Self::MaxFertExp),
            "max_profit" => Some(Self::MaxProfit),
            "max_fert_profit" => Some(Self::MaxFertProfit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automation {
    #[serde(default)]
    pub farm: bool,
    #[serde(default)]
    pub farm_push: bool,
    #[serde(default)]
    pub land_upgrade: bool,
    #[serde(default)]
    pub friend: bool,
    #[serde(default)]
    pub friend_steal: bool,
    #[serde(default)]
    pub friend_help: bool,
    #[serde(default)]
    pub friend_bad: bool,
    #[serde(default)]
    pub task: bool,
    #[serde(default)]
    pub sell: bool,
    #[serde(default)]
    pub fertilizer: FertilizerMode,
}

impl Default for Automation {
    fn default() -> Self {
        Self {
            farm: true,
            farm_push: true,
            land_upgrade: true,
            friend: true,
            friend_steal: true,
            friend_help: true,
            friend_bad: false,
            task: true,
            sell: true,
            fertilizer: FertilizerMode::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intervals {
    pub farm_min: u32,
    pub farm_max: u32,
    pub friend_min: u32,
    pub friend_max: u32,
}

impl Default for Intervals {
    fn default() -> Self {
        Self { farm_min: 2, farm_max: 2, friend_min: 10, friend_max: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendQuietHours {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_quiet_start")]
    pub start: String,
    #[serde(default = "default_quiet_end")]
    pub end: String,
}

fn default_quiet_start() -> String {
    "23:00".to_owned()
}

fn default_quiet_end() -> String {
    "07:00".to_owned()
}

impl Default for FriendQuietHours {
    fn default() -> Self {
        Self { enabled: false, start: default_quiet_start(), end: default_quiet_end() }
    }
}

/// Per-account settings after layering (global defaults <- process-wide
/// default config <- per-account overrides). `revision` is bumped by every
/// mutating save and never otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSettings {
    #[serde(default)]
    pub automation: Automation,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default, rename = "preferredSeedId")]
    pub preferred_seed_id: u64,
    #[serde(default)]
    pub intervals: Intervals,
    #[serde(default, rename = "friendQuietHours")]
    pub friend_quiet_hours: FriendQuietHours,
    #[serde(default, rename = "__revision")]
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    Stopped,
    Starting,
    Retrying,
    Running,
    Failed,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::Stopped
    }
}

/// One persisted row per account describing its lifecycle state.
///
/// Invariant: a runtime present in the manager's registry implies
/// `state == Running`, except mid-transition under the per-account start
/// lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeStatusRow {
    #[serde(default)]
    pub state: RuntimeState,
    #[serde(default)]
    pub last_start_at: i64,
    #[serde(default)]
    pub last_start_success_at: i64,
    #[serde(default)]
    pub start_retry_count: u32,
    #[serde(default)]
    pub last_start_error: String,
}

/// Monotonically increasing counters exposed in runtime status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationCounters {
    #[serde(default)]
    pub harvest: u64,
    #[serde(default)]
    pub water: u64,
    #[serde(default)]
    pub weed: u64,
    #[serde(default)]
    pub bug: u64,
    #[serde(default)]
    pub fertilize: u64,
    #[serde(default)]
    pub plant: u64,
    #[serde(default)]
    pub steal: u64,
    #[serde(default, rename = "helpWater")]
    pub help_water: u64,
    #[serde(default, rename = "helpWeed")]
    pub help_weed: u64,
    #[serde(default, rename = "helpBug")]
    pub help_bug: u64,
    #[serde(default, rename = "taskClaim")]
    pub task_claim: u64,
    #[serde(default)]
    pub sell: u64,
    #[serde(default)]
    pub upgrade: u64,
}

/// A point-in-time snapshot of the account's own profile, as reported by
/// login or overlaid by a `BasicNotify`/`ItemNotify` push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub gid: i64,
    pub display_name: String,
    pub level: u32,
    pub gold: i64,
    pub exp: i64,
    pub coupon: i64,
}

/// Ephemeral per-account state populated once at login and kept live by
/// notification pushes for the life of the session. Never persisted:
/// rebuilt from scratch on every `start()`.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub current: SessionSnapshot,
    pub initial_state: SessionSnapshot,
    pub next_farm_at: i64,
    pub next_friend_at: i64,
}

/// One log entry as persisted to `runtime_logs_v2.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: i64,
    pub tag: String,
    pub msg: String,
    #[serde(default)]
    pub is_warn: bool,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// Precomputed lowercase text used by keyword filters.
    #[serde(rename = "_searchText")]
    pub search_text: String,
}

impl LogEntry {
    pub fn new(
        time: i64,
        tag: impl Into<String>,
        msg: impl Into<String>,
        is_warn: bool,
        account_id: Option<String>,
        meta: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let tag = tag.into();
        let msg = msg.into();
        let search_text = format!("{tag} {msg}").to_lowercase();
        Self { time, tag, msg, is_warn, account_id, meta, search_text }
    }
}
