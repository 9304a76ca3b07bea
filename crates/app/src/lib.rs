// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process wiring for the automation runtime: config, tracing, and
//! assembling the engine's stores behind the manager. The command façade
//! that turns chat messages into calls on [`farmengine::manager::AccountManager`]
//! is a separate, external concern and is not part of this crate.

pub mod config;

use std::sync::Arc;

use farmengine::config_store::ConfigStore;
use farmengine::manager::AccountManager;
use farmengine::rate_limiter::{RateLimiter, RateLimiterConfig};

pub struct App {
    pub manager: AccountManager,
}

impl App {
    pub fn bootstrap(config: &config::Config) -> anyhow::Result<Self> {
        let game_config = Arc::new(ConfigStore::load(&config.docs_root)?);
        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            global_concurrency: config.global_concurrency,
            ..RateLimiterConfig::default()
        }));
        let manager = AccountManager::open(&config.data_dir, config.gateway_url.clone(), game_config, rate_limiter)?;
        Ok(Self { manager })
    }
}
