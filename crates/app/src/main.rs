// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use farmctl::config::{init_tracing, Config};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    let app = match farmctl::App::bootstrap(&config) {
        Ok(app) => app,
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    info!(accounts = app.manager.list_accounts().await.len(), "farmctl started");

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
}
