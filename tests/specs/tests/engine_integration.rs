// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-crate integration tests wiring `farmctl`'s config/bootstrap layer
//! to `farmengine`'s manager and state store the way `main.rs` actually
//! does, as opposed to the per-module unit tests living alongside each
//! source file.

use std::sync::Arc;

use farm_specs::write_minimal_game_config;
use farmengine::config_store::ConfigStore;
use farmengine::manager::AccountManager;
use farmengine::model::{Account, AccountSettings, Strategy};
use farmengine::rate_limiter::{RateLimiter, RateLimiterConfig};
use farmengine::state_store::StateStore;

#[tokio::test]
async fn bootstrap_then_settings_layering_and_persistence_round_trip() {
    let docs_root = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    write_minimal_game_config(docs_root.path());

    let config = Arc::new(ConfigStore::load(docs_root.path()).unwrap());
    assert_eq!(config.land_count_for_level(1), 4);
    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));

    let manager = AccountManager::open(data_dir.path(), "ws://unreachable".to_owned(), Arc::clone(&config), rate_limiter)
        .unwrap();

    let account = Account {
        id: "acc-1".into(),
        name: "Alice".into(),
        platform: "qq".into(),
        code: "secret-code".into(),
        uin: None,
        qq: None,
        avatar: None,
        share_file_path: None,
        created_at: 1,
        updated_at: 1,
    };
    manager.upsert_account(account).await.unwrap();

    let mut settings = AccountSettings::default();
    settings.strategy = Strategy::MaxProfit;
    settings.preferred_seed_id = 20001;
    manager.save_account_settings("acc-1", settings).await.unwrap();

    // A fresh manager opened against the same data dir sees both the
    // account and the layered settings, proving the JSON documents round
    // trip through reopen rather than only surviving in memory.
    let rate_limiter2 = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
    let reopened = AccountManager::open(data_dir.path(), "ws://unreachable".to_owned(), config, rate_limiter2).unwrap();

    let account = reopened.get_account("acc-1").await.expect("account survives reopen");
    assert_eq!(account.name, "Alice");

    let effective = reopened.effective_settings("acc-1").await;
    assert_eq!(effective.strategy, Strategy::MaxProfit);
    assert_eq!(effective.preferred_seed_id, 20001);
    assert_eq!(effective.revision, 1);
}

#[tokio::test]
async fn deleting_an_account_clears_its_settings_and_status_but_not_siblings() {
    let docs_root = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    write_minimal_game_config(docs_root.path());

    let config = Arc::new(ConfigStore::load(docs_root.path()).unwrap());
    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
    let manager = AccountManager::open(data_dir.path(), "ws://unreachable".to_owned(), config, rate_limiter).unwrap();

    for (id, name) in [("acc-1", "Alice"), ("acc-2", "Bob")] {
        manager
            .upsert_account(Account {
                id: id.into(),
                name: name.into(),
                platform: "qq".into(),
                code: "code".into(),
                uin: None,
                qq: None,
                avatar: None,
                share_file_path: None,
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();
    }

    assert!(manager.delete_account("acc-1").await.unwrap());
    assert!(manager.get_account("acc-1").await.is_none());
    assert!(manager.get_account("acc-2").await.is_some());
}

#[test]
fn state_store_binding_and_whitelist_survive_reopen_alongside_manager_data() {
    let data_dir = tempfile::tempdir().unwrap();

    {
        let store = StateStore::open(data_dir.path(), vec!["static-user".into()], vec![]).unwrap();
        store.bind_account("user-1", "acc-1", "Alice", 100).unwrap();
        store.add_whitelist_user("user-1").unwrap();
        assert_eq!(store.get_bound_account("user-1"), Some("acc-1".to_owned()));
    }

    let reopened = StateStore::open(data_dir.path(), vec!["static-user".into()], vec![]).unwrap();
    assert_eq!(reopened.get_bound_account("user-1"), Some("acc-1".to_owned()));
    assert!(reopened.is_user_allowed("user-1"));
    assert!(reopened.is_user_allowed("static-user"));
    assert!(!reopened.is_user_allowed("nobody"));

    // Rebinding the same account to a different user is rejected, proving
    // the bijective invariant holds across the manager/state-store seam.
    let err = reopened.bind_account("user-2", "acc-1", "Mallory", 200).unwrap_err();
    assert_eq!(err.code(), "E_ALREADY_BOUND");
}
