// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Multi-account automation runtime for the farm game backend.
#[derive(Debug, Parser)]
#[command(name = "farmctl", version, about)]
pub struct Config {
    /// WebSocket URL of the game gateway.
    #[arg(long, env = "FARM_GATEWAY_URL")]
    pub gateway_url: String,

    /// Directory holding the bundled `gameConfig/` reference data.
    #[arg(long, env = "FARM_DOCS_ROOT")]
    pub docs_root: PathBuf,

    /// Directory for persisted JSON state (accounts, settings, runtime,
    /// bindings, logs).
    #[arg(long, env = "FARM_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Maximum concurrent in-flight gateway requests across all accounts.
    #[arg(long, env = "FARM_GLOBAL_CONCURRENCY", default_value = "20")]
    pub global_concurrency: usize,

    /// Log format (json or text).
    #[arg(long, env = "FARM_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FARM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gateway_url.trim().is_empty() {
            anyhow::bail!("--gateway-url must not be empty");
        }
        Ok(())
    }
}

/// Initialize tracing from config. Uses `try_init` so it is safe to call
/// multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if std::env::var("FARM_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}
