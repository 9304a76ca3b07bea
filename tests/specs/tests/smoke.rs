// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke test that spawns the real `farmctl` binary.
//!
//! The runtime exposes no HTTP, gRPC, or socket surface of its own (the
//! command façade that would sit in front of it is a separate, external
//! concern), so the only externally observable behavior is process
//! lifecycle: it starts cleanly against a fixture `gameConfig/` tree with
//! zero accounts configured, stays up, and shuts down on signal.

use std::thread::sleep;
use std::time::Duration;

use farm_specs::{write_minimal_game_config, FarmctlProcess};

#[test]
fn binary_starts_and_stays_alive_with_no_accounts_configured() -> anyhow::Result<()> {
    let docs_root = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;
    write_minimal_game_config(docs_root.path());

    let mut proc = FarmctlProcess::start(docs_root.path(), data_dir.path())?;

    // Give it a moment to parse args, load config, and reach the signal wait.
    sleep(Duration::from_millis(500));
    assert!(proc.is_alive()?, "farmctl exited early instead of waiting on shutdown signal");

    proc.terminate()?;
    Ok(())
}

#[test]
fn binary_rejects_empty_gateway_url_before_doing_any_work() -> anyhow::Result<()> {
    let docs_root = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;
    write_minimal_game_config(docs_root.path());

    let output = std::process::Command::new(farm_specs::farmctl_binary())
        .arg("--gateway-url")
        .arg("")
        .arg("--docs-root")
        .arg(docs_root.path())
        .arg("--data-dir")
        .arg(data_dir.path())
        .output()?;

    assert!(!output.status.success());
    Ok(())
}

#[test]
fn binary_creates_data_dir_on_startup() -> anyhow::Result<()> {
    let docs_root = tempfile::tempdir()?;
    let data_root = tempfile::tempdir()?;
    let data_dir = data_root.path().join("nested").join("state");
    write_minimal_game_config(docs_root.path());

    let mut proc = FarmctlProcess::start(docs_root.path(), &data_dir)?;
    sleep(Duration::from_millis(500));
    assert!(proc.is_alive()?);
    proc.terminate()?;

    assert!(data_dir.is_dir(), "farmctl never created its data directory");
    Ok(())
}
