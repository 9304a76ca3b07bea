// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C3: static game-config data. Loads the bundled reference JSON documents
//! once at startup and serves lookups by id from in-memory indices. All
//! getters are side-effect free and return a synthesized default on miss
//! rather than erroring, since a missing config row is a data gap, not a
//! caller mistake.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

const SEED_ITEM_TYPE: u32 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct RoleLevelRow {
    pub level: u32,
    #[serde(default)]
    pub exp: u64,
    #[serde(default, rename = "landCount")]
    pub land_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlantRow {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "seedId")]
    pub seed_id: u64,
    #[serde(default, rename = "fruitId")]
    pub fruit_id: u64,
    #[serde(default, rename = "growTime")]
    pub grow_time: String,
    #[serde(default, rename = "harvestExp")]
    pub harvest_exp: u64,
    #[serde(default)]
    pub income: u64,
    #[serde(default, rename = "requiredLevel")]
    pub required_level: u32,
    #[serde(default, rename = "normalFertilizerReduceSec")]
    pub normal_fertilizer_reduce_sec: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemRow {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub item_type: u32,
    #[serde(default, rename = "interactionType")]
    pub interaction_type: String,
}

pub struct ConfigStore {
    role_levels: Vec<RoleLevelRow>,
    plant_by_id: HashMap<u64, PlantRow>,
    plant_by_seed: HashMap<u64, PlantRow>,
    plant_by_fruit: HashMap<u64, PlantRow>,
    item_by_id: HashMap<u64, ItemRow>,
    seed_item_by_id: HashMap<u64, ItemRow>,
    seed_images: HashMap<u64, String>,
}

impl ConfigStore {
    /// Resolves `docs_root` the way the original tooling does: the exact
    /// folder name if present, else the first sibling directory whose name
    /// is prefixed by it and which itself contains a `gameConfig/` folder.
    pub fn resolve_docs_root(base_dir: &Path, canonical_name: &str) -> Option<PathBuf> {
        let exact = base_dir.join(canonical_name);
        if exact.join("gameConfig").is_dir() {
            return Some(exact);
        }
        let entries = std::fs::read_dir(base_dir).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(canonical_name) && entry.path().join("gameConfig").is_dir() {
                return Some(entry.path());
            }
        }
        None
    }

    pub fn load(docs_root: &Path) -> anyhow::Result<Self> {
        let config_dir = docs_root.join("gameConfig");
        let role_levels: Vec<RoleLevelRow> = load_json_array(&config_dir.join("RoleLevel.json"))?;
        let plants: Vec<PlantRow> = load_json_array(&config_dir.join("Plant.json"))?;
        let items: Vec<ItemRow> = load_json_array(&config_dir.join("ItemInfo.json"))?;

        let mut plant_by_id = HashMap::new();
        let mut plant_by_seed = HashMap::new();
        let mut plant_by_fruit = HashMap::new();
        for plant in plants {
            plant_by_id.insert(plant.id, plant.clone());
            if plant.seed_id != 0 {
                plant_by_seed.insert(plant.seed_id, plant.clone());
            }
            if plant.fruit_id != 0 {
                plant_by_fruit.insert(plant.fruit_id, plant.clone());
            }
        }

        let mut item_by_id = HashMap::new();
        let mut seed_item_by_id = HashMap::new();
        for item in items {
            if item.item_type == SEED_ITEM_TYPE {
                seed_item_by_id.insert(item.id, item.clone());
            }
            item_by_id.insert(item.id, item);
        }

        let seed_images = load_seed_images(&config_dir);

        Ok(Self { role_levels, plant_by_id, plant_by_seed, plant_by_fruit, item_by_id, seed_item_by_id, seed_images })
    }

    pub fn land_count_for_level(&self, level: u32) -> u32 {
        self.role_levels
            .iter()
            .filter(|row| row.level <= level)
            .max_by_key(|row| row.level)
            .map(|row| row.land_count)
            .unwrap_or(0)
    }

    pub fn plant_by_id(&self, plant_id: u64) -> Option<&PlantRow> {
        self.plant_by_id.get(&plant_id)
    }

    pub fn plant_by_seed(&self, seed_id: u64) -> Option<&PlantRow> {
        self.plant_by_seed.get(&seed_id)
    }

    pub fn plant_by_fruit(&self, fruit_id: u64) -> Option<&PlantRow> {
        self.plant_by_fruit.get(&fruit_id)
    }

    pub fn item_by_id(&self, item_id: u64) -> Option<&ItemRow> {
        self.item_by_id.get(&item_id)
    }

    pub fn item_name(&self, item_id: u64) -> String {
        self.item_by_id(item_id).map(|i| i.name.clone()).unwrap_or_else(|| format!("item#{item_id}"))
    }

    pub fn seed_image(&self, seed_id: u64) -> Option<&str> {
        self.seed_images.get(&seed_id).map(|s| s.as_str())
    }

    /// All known seeds, sorted by `(required_level, seed_id)` ascending to
    /// match the order a player would naturally unlock them in.
    pub fn all_seeds(&self) -> Vec<&PlantRow> {
        let mut seeds: Vec<&PlantRow> = self.plant_by_seed.values().collect();
        seeds.sort_by_key(|p| (p.required_level, p.seed_id));
        seeds
    }
}

fn load_json_array<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<Vec<T>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "config file missing, treating as empty");
            Ok(Vec::new())
        }
    }
}

/// Seed thumbnails are keyed by filename convention rather than an explicit
/// manifest: either `<seedId>_*.png` or `Crop_<name>_Seed*.png` alongside a
/// parallel id table. We only need the numeric-prefixed form here since that
/// is what every current asset pack ships.
fn load_seed_images(config_dir: &Path) -> HashMap<u64, String> {
    let images_dir = config_dir.join("seedImages");
    let mut out = HashMap::new();
    let Ok(entries) = std::fs::read_dir(&images_dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some((prefix, _rest)) = file_name.split_once('_') {
            if let Ok(seed_id) = prefix.parse::<u64>() {
                out.entry(seed_id).or_insert_with(|| file_name.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn resolve_docs_root_prefers_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("gameDocs/gameConfig/RoleLevel.json"), "[]");
        let resolved = ConfigStore::resolve_docs_root(dir.path(), "gameDocs").unwrap();
        assert_eq!(resolved, dir.path().join("gameDocs"));
    }

    #[test]
    fn resolve_docs_root_falls_back_to_prefixed_sibling() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("gameDocs-v3/gameConfig/RoleLevel.json"), "[]");
        let resolved = ConfigStore::resolve_docs_root(dir.path(), "gameDocs").unwrap();
        assert_eq!(resolved, dir.path().join("gameDocs-v3"));
    }

    #[test]
    fn load_builds_cross_reference_indices() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("gameConfig/Plant.json"),
            r#"[{"id": 1021001, "name": "Wheat", "seedId": 20001, "fruitId": 30001, "growTime": "1:3600", "harvestExp": 10, "income": 50, "requiredLevel": 1, "normalFertilizerReduceSec": "1:600"}]"#,
        );
        write(&dir.path().join("gameConfig/ItemInfo.json"), r#"[{"id": 20001, "name": "Wheat Seed", "type": 5, "interactionType": "seed"}]"#);
        write(&dir.path().join("gameConfig/RoleLevel.json"), r#"[{"level": 1, "exp": 0, "landCount": 4}, {"level": 2, "exp": 100, "landCount": 6}]"#);

        let store = ConfigStore::load(dir.path()).unwrap();
        assert_eq!(store.plant_by_id(1021001).unwrap().name, "Wheat");
        assert_eq!(store.plant_by_seed(20001).unwrap().id, 1021001);
        assert_eq!(store.plant_by_fruit(30001).unwrap().id, 1021001);
        assert_eq!(store.item_name(20001), "Wheat Seed");
        assert_eq!(store.land_count_for_level(1), 4);
        assert_eq!(store.land_count_for_level(2), 6);
        assert_eq!(store.land_count_for_level(5), 6);
    }

    #[test]
    fn unknown_item_id_gets_a_synthesized_name_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("gameConfig/Plant.json"), "[]");
        write(&dir.path().join("gameConfig/ItemInfo.json"), "[]");
        write(&dir.path().join("gameConfig/RoleLevel.json"), "[]");
        let store = ConfigStore::load(dir.path()).unwrap();
        assert_eq!(store.item_name(999), "item#999");
        assert_eq!(store.land_count_for_level(1), 0);
    }

    #[test]
    fn all_seeds_sorted_by_required_level_then_id() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("gameConfig/Plant.json"),
            r#"[
                {"id": 2, "seedId": 20002, "requiredLevel": 3},
                {"id": 1, "seedId": 20001, "requiredLevel": 1},
                {"id": 3, "seedId": 20003, "requiredLevel": 1}
            ]"#,
        );
        write(&dir.path().join("gameConfig/ItemInfo.json"), "[]");
        write(&dir.path().join("gameConfig/RoleLevel.json"), "[]");
        let store = ConfigStore::load(dir.path()).unwrap();
        let ids: Vec<u64> = store.all_seeds().iter().map(|p| p.seed_id).collect();
        assert_eq!(ids, vec![20001, 20003, 20002]);
    }
}
