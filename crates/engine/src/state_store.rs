// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C7: user<->account bindings (bijective), user/group allow-lists, and the
//! render-theme preference. Three JSON files, each mutation validated,
//! normalized, and persisted atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::persist;

const ALLOWED_THEMES: [&str; 2] = ["dark", "light"];

fn normalize_id(value: &str) -> String {
    value.trim().to_owned()
}

fn normalize_id_list(values: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for value in values {
        let v = normalize_id(value);
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OwnerEntry {
    account_id: String,
    #[serde(default)]
    account_name: String,
    #[serde(default)]
    updated_at: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OwnersFile {
    #[serde(default)]
    owners: HashMap<String, OwnerEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WhitelistFile {
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    groups: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ThemeFile {
    #[serde(default = "default_theme")]
    render_theme: String,
}

fn default_theme() -> String {
    "light".to_owned()
}

impl Default for ThemeFile {
    fn default() -> Self {
        Self { render_theme: default_theme() }
    }
}

#[derive(Debug, Clone)]
pub struct BoundAccountInfo {
    pub user_id: String,
    pub account_id: String,
    pub account_name: String,
    pub updated_at: i64,
}

struct Inner {
    owners: HashMap<String, OwnerEntry>,
    account_owners: HashMap<String, String>,
    whitelist: WhitelistFile,
    theme: ThemeFile,
}

pub struct StateStore {
    owners_path: PathBuf,
    whitelist_path: PathBuf,
    theme_path: PathBuf,
    static_allowed_users: Vec<String>,
    static_allowed_groups: Vec<String>,
    inner: RwLock<Inner>,
}

impl StateStore {
    pub fn open(
        data_dir: &Path,
        static_allowed_users: Vec<String>,
        static_allowed_groups: Vec<String>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let owners_path = data_dir.join("bindings_v2.json");
        let whitelist_path = data_dir.join("whitelist.json");
        let theme_path = data_dir.join("state_v2.json");

        let owners_file: OwnersFile = persist::load_or_default(&owners_path);
        let (owners, account_owners) = normalize_bindings(owners_file.owners);

        let mut whitelist: WhitelistFile = persist::load_or_default(&whitelist_path);
        whitelist.users = normalize_id_list(&whitelist.users);
        whitelist.groups = normalize_id_list(&whitelist.groups);

        let theme: ThemeFile = persist::load_or_default(&theme_path);

        let store = Self {
            owners_path,
            whitelist_path,
            theme_path,
            static_allowed_users: normalize_id_list(&static_allowed_users),
            static_allowed_groups: normalize_id_list(&static_allowed_groups),
            inner: RwLock::new(Inner { owners, account_owners, whitelist, theme }),
        };
        store.save_owners()?;
        store.save_whitelist()?;
        Ok(store)
    }

    pub fn refresh_static_whitelist(&mut self, users: Vec<String>, groups: Vec<String>) {
        self.static_allowed_users = normalize_id_list(&users);
        self.static_allowed_groups = normalize_id_list(&groups);
    }

    pub fn get_render_theme(&self, default: &str) -> String {
        let fallback = if ALLOWED_THEMES.contains(&default) { default } else { "light" };
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if ALLOWED_THEMES.contains(&inner.theme.render_theme.as_str()) {
            inner.theme.render_theme.clone()
        } else {
            fallback.to_owned()
        }
    }

    pub fn set_render_theme(&self, theme: &str) -> Result<String, EngineError> {
        if !ALLOWED_THEMES.contains(&theme) {
            return Err(EngineError::InvalidArgument("theme must be dark or light".to_owned()));
        }
        {
            let mut inner = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            inner.theme.render_theme = theme.to_owned();
        }
        self.save_theme().map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(theme.to_owned())
    }

    pub fn get_bound_account(&self, user_id: &str) -> Option<String> {
        let uid = normalize_id(user_id);
        if uid.is_empty() {
            return None;
        }
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.owners.get(&uid).map(|e| e.account_id.clone())
    }

    pub fn get_bound_account_info(&self, user_id: &str) -> Option<BoundAccountInfo> {
        let uid = normalize_id(user_id);
        if uid.is_empty() {
            return None;
        }
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = inner.owners.get(&uid)?;
        Some(BoundAccountInfo {
            user_id: uid,
            account_id: entry.account_id.clone(),
            account_name: entry.account_name.clone(),
            updated_at: entry.updated_at,
        })
    }

    /// Enforces bijectivity: fails with [`EngineError::AlreadyBound`] if the
    /// account is already owned by a different user. If the user had a
    /// prior binding, the old `account_owners` entry is removed atomically
    /// with the new insertion.
    pub fn bind_account(
        &self,
        user_id: &str,
        account_id: &str,
        account_name: &str,
        now: i64,
    ) -> Result<(), EngineError> {
        let uid = normalize_id(user_id);
        let aid = normalize_id(account_id);
        if uid.is_empty() || aid.is_empty() {
            return Err(EngineError::InvalidArgument(
                "user_id and account_id must not be empty".to_owned(),
            ));
        }

        {
            let mut inner = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(existing_owner) = inner.account_owners.get(&aid) {
                if existing_owner != &uid {
                    return Err(EngineError::AlreadyBound { account_id: aid });
                }
            }
            if let Some(prior) = inner.owners.get(&uid).map(|e| e.account_id.clone()) {
                inner.account_owners.remove(&prior);
            }
            inner.owners.insert(
                uid.clone(),
                OwnerEntry { account_id: aid.clone(), account_name: account_name.to_owned(), updated_at: now },
            );
            inner.account_owners.insert(aid, uid);
        }
        self.save_owners().map_err(|e| EngineError::Internal(e.to_string()))
    }

    pub fn unbind_account(&self, user_id: &str) -> Result<Option<String>, EngineError> {
        let uid = normalize_id(user_id);
        if uid.is_empty() {
            return Ok(None);
        }
        let removed = {
            let mut inner = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            let entry = inner.owners.remove(&uid);
            if let Some(ref e) = entry {
                inner.account_owners.remove(&e.account_id);
            }
            entry.map(|e| e.account_id)
        };
        self.save_owners().map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(removed)
    }

    pub fn list_whitelist_users(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        merge_dedup(&self.static_allowed_users, &inner.whitelist.users)
    }

    pub fn list_whitelist_groups(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        merge_dedup(&self.static_allowed_groups, &inner.whitelist.groups)
    }

    pub fn is_user_allowed(&self, user_id: &str) -> bool {
        let uid = normalize_id(user_id);
        !uid.is_empty() && self.list_whitelist_users().contains(&uid)
    }

    pub fn is_group_allowed(&self, group_id: &str) -> bool {
        let gid = normalize_id(group_id);
        !gid.is_empty() && self.list_whitelist_groups().contains(&gid)
    }

    pub fn add_whitelist_user(&self, user_id: &str) -> Result<bool, EngineError> {
        self.mutate_whitelist_list(user_id, true, true)
    }

    pub fn remove_whitelist_user(&self, user_id: &str) -> Result<bool, EngineError> {
        self.mutate_whitelist_list(user_id, true, false)
    }

    pub fn add_whitelist_group(&self, group_id: &str) -> Result<bool, EngineError> {
        self.mutate_whitelist_list(group_id, false, true)
    }

    pub fn remove_whitelist_group(&self, group_id: &str) -> Result<bool, EngineError> {
        self.mutate_whitelist_list(group_id, false, false)
    }

    fn mutate_whitelist_list(
        &self,
        id: &str,
        is_user: bool,
        add: bool,
    ) -> Result<bool, EngineError> {
        let normalized = normalize_id(id);
        if normalized.is_empty() {
            return Ok(false);
        }
        let changed = {
            let mut inner = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            let list = if is_user { &mut inner.whitelist.users } else { &mut inner.whitelist.groups };
            let present = list.contains(&normalized);
            if add == present {
                false
            } else if add {
                list.push(normalized);
                true
            } else {
                list.retain(|v| v != &normalized);
                true
            }
        };
        if changed {
            self.save_whitelist().map_err(|e| EngineError::Internal(e.to_string()))?;
        }
        Ok(changed)
    }

    fn save_owners(&self) -> anyhow::Result<()> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        persist::save_atomic(&self.owners_path, &OwnersFile { owners: inner.owners.clone() })
    }

    fn save_whitelist(&self) -> anyhow::Result<()> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        persist::save_atomic(&self.whitelist_path, &inner.whitelist)
    }

    fn save_theme(&self) -> anyhow::Result<()> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        persist::save_atomic(&self.theme_path, &inner.theme)
    }
}

fn merge_dedup(first: &[String], second: &[String]) -> Vec<String> {
    let mut merged = Vec::new();
    for value in first.iter().chain(second.iter()) {
        if !value.is_empty() && !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    merged
}

/// Derive the bijective `account_owners` index from a possibly-conflicting
/// `owners` map, resolving duplicate claims on the same account by keeping
/// the entry with the highest `updated_at`.
fn normalize_bindings(
    owners: HashMap<String, OwnerEntry>,
) -> (HashMap<String, OwnerEntry>, HashMap<String, String>) {
    let mut account_owners: HashMap<String, String> = HashMap::new();
    let mut winners: HashMap<String, (String, i64)> = HashMap::new();

    for (uid, entry) in &owners {
        match winners.get(&entry.account_id) {
            Some((_, best_ts)) if *best_ts >= entry.updated_at => {}
            _ => {
                winners.insert(entry.account_id.clone(), (uid.clone(), entry.updated_at));
            }
        }
    }
    for (account_id, (uid, _)) in &winners {
        account_owners.insert(account_id.clone(), uid.clone());
    }

    let kept_owners: HashMap<String, OwnerEntry> = owners
        .into_iter()
        .filter(|(uid, entry)| winners.get(&entry.account_id).map(|(w, _)| w == uid).unwrap_or(false))
        .collect();

    (kept_owners, account_owners)
}

#[cfg(test)]
#[path = "state_store_tests.rs"]
mod tests;
