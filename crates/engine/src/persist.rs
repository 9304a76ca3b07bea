// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared JSON persistence: atomic write (tmp + rename), forgiving read
//! (missing or corrupt files fall back to a default rather than erroring).

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load `path` as JSON, falling back to `T::default()` if the file is
/// missing, empty, or fails to parse. Unknown keys are ignored and missing
/// keys take serde's `#[serde(default)]`, so legacy shapes degrade rather
/// than fail to load.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => T::default(),
    }
}

/// Write `value` to `path` as pretty JSON, atomically (write `.tmp`, then
/// rename over the destination).
pub fn save_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Doc {
        #[serde(default)]
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn missing_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let doc: Doc = load_or_default(&path);
        assert_eq!(doc, Doc::default());
    }

    #[test]
    fn corrupt_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let doc: Doc = load_or_default(&path);
        assert_eq!(doc, Doc::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let original = Doc { name: "seed".to_owned(), count: 3 };
        save_atomic(&path, &original).unwrap();
        let loaded: Doc = load_or_default(&path);
        assert_eq!(loaded, original);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn unknown_keys_and_legacy_missing_keys_are_forgiving() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, r#"{"name":"x","extra_future_field":42}"#).unwrap();
        let doc: Doc = load_or_default(&path);
        assert_eq!(doc, Doc { name: "x".to_owned(), count: 0 });
    }
}
