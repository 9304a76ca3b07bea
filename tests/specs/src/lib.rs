// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness shared by the end-to-end specs: a minimal `gameConfig/`
//! fixture tree and a handle to the compiled `farmctl` binary.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Resolve the path to the compiled `farmctl` binary.
pub fn farmctl_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("farmctl")
}

/// Write a minimal but well-formed `gameConfig/` tree under `root`, enough
/// for [`farmengine::config_store::ConfigStore::load`] to produce one
/// plantable seed and one role level.
pub fn write_minimal_game_config(root: &Path) {
    let config_dir = root.join("gameConfig");
    std::fs::create_dir_all(&config_dir).expect("create gameConfig dir");

    std::fs::write(
        config_dir.join("RoleLevel.json"),
        r#"[{"level": 1, "exp": 0, "landCount": 4}, {"level": 2, "exp": 100, "landCount": 6}]"#,
    )
    .expect("write RoleLevel.json");

    std::fs::write(
        config_dir.join("Plant.json"),
        r#"[{
            "id": 1021001,
            "name": "Wheat",
            "seedId": 20001,
            "fruitId": 30001,
            "growTime": "1:3600",
            "harvestExp": 10,
            "income": 50,
            "requiredLevel": 1,
            "normalFertilizerReduceSec": "1:600"
        }]"#,
    )
    .expect("write Plant.json");

    std::fs::write(
        config_dir.join("ItemInfo.json"),
        r#"[
            {"id": 20001, "name": "Wheat Seed", "type": 5, "interactionType": "seed"},
            {"id": 60001, "name": "Normal Fertilizer", "type": 3, "interactionType": "fertilizer"},
            {"id": 60002, "name": "Organic Fertilizer", "type": 3, "interactionType": "fertilizer"}
        ]"#,
    )
    .expect("write ItemInfo.json");
}

/// A spawned, not-yet-reaped `farmctl` subprocess. Killed on drop so a
/// panicking assertion never leaks a background process.
pub struct FarmctlProcess {
    child: Child,
}

impl FarmctlProcess {
    /// Starts `farmctl` against a fixture `docs_root`/`data_dir`. The
    /// gateway URL is unreachable by design: these specs only exercise
    /// process startup, config loading, and shutdown, since the real
    /// gateway endpoint is an external service outside this workspace.
    pub fn start(docs_root: &Path, data_dir: &Path) -> anyhow::Result<Self> {
        let child = Command::new(farmctl_binary())
            .arg("--gateway-url")
            .arg("ws://127.0.0.1:1/unreachable")
            .arg("--docs-root")
            .arg(docs_root)
            .arg("--data-dir")
            .arg(data_dir)
            .arg("--log-format")
            .arg("text")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(Self { child })
    }

    /// True while the process is still alive.
    pub fn is_alive(&mut self) -> anyhow::Result<bool> {
        Ok(self.child.try_wait()?.is_none())
    }

    pub fn terminate(&mut self) -> anyhow::Result<()> {
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for FarmctlProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
