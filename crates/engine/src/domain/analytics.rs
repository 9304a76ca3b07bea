// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure crop-ranking math used by farm automation to choose what to plant.
//! No RPC calls: everything here is derived from [`ConfigStore`] rows.

use crate::config_store::{ConfigStore, PlantRow};
use crate::model::Strategy;

/// A `grow_time`/`normalFertilizerReduceSec` string is a run of
/// `phase:seconds` pairs separated by `;`, e.g. `"1:3600;2:1800;3:900"`.
fn parse_phase_seconds(raw: &str) -> Vec<(u32, u64)> {
    raw.split(';')
        .filter_map(|segment| {
            let (phase, secs) = segment.split_once(':')?;
            Some((phase.trim().parse().ok()?, secs.trim().parse().ok()?))
        })
        .collect()
}

fn total_seconds(raw: &str) -> u64 {
    parse_phase_seconds(raw).iter().map(|(_, secs)| secs).sum()
}

/// Subtract the first growth phase's duration, used when a normal
/// fertilizer is applied: it skips straight past the seed phase.
fn total_seconds_with_normal_fertilizer(grow_time: &str, reduce_table: &str) -> u64 {
    let phases = parse_phase_seconds(grow_time);
    let total: u64 = phases.iter().map(|(_, secs)| secs).sum();
    let first_phase_seconds = phases.first().map(|(_, secs)| *secs).unwrap_or(0);
    let reduce = total_seconds(reduce_table).min(first_phase_seconds);
    total.saturating_sub(reduce)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropStats {
    pub plant_id: u64,
    pub seed_id: u64,
    pub grow_seconds: u64,
    pub fert_grow_seconds: u64,
    pub harvest_exp: u64,
    pub income: u64,
}

impl CropStats {
    pub fn exp_per_hour(&self) -> f64 {
        rate_per_hour(self.harvest_exp, self.grow_seconds)
    }

    pub fn fert_exp_per_hour(&self) -> f64 {
        rate_per_hour(self.harvest_exp, self.fert_grow_seconds)
    }

    pub fn profit_per_hour(&self) -> f64 {
        rate_per_hour(self.income, self.grow_seconds)
    }

    pub fn fert_profit_per_hour(&self) -> f64 {
        rate_per_hour(self.income, self.fert_grow_seconds)
    }
}

fn rate_per_hour(amount: u64, seconds: u64) -> f64 {
    if seconds == 0 {
        0.0
    } else {
        amount as f64 / seconds as f64 * 3600.0
    }
}

/// Analytics only ever ranks the seasonal event roster: id prefix `"102"`,
/// seed ids in `[20000, 30000)`. Everything else is out of scope for this
/// ranking, not merely ineligible for the bonus.
fn is_seasonal_event_plant(plant: &PlantRow) -> bool {
    plant.id.to_string().starts_with("102") && (20000..30000).contains(&plant.seed_id)
}

/// Computes hourly stats for a plant already known to be in the seasonal
/// event roster (see [`is_seasonal_event_plant`]). `seasons == 2` scales
/// grow-time by 1.5x and exp/income by 2x; other seasons values are
/// unscaled.
pub fn crop_stats(plant: &PlantRow, seasons: i32) -> CropStats {
    let mut grow_seconds = total_seconds(&plant.grow_time);
    let mut fert_grow_seconds =
        total_seconds_with_normal_fertilizer(&plant.grow_time, &plant.normal_fertilizer_reduce_sec);
    let mut harvest_exp = plant.harvest_exp;
    let mut income = plant.income;

    if seasons == 2 {
        grow_seconds = (grow_seconds as f64 * 1.5).round() as u64;
        fert_grow_seconds = (fert_grow_seconds as f64 * 1.5).round() as u64;
        harvest_exp *= 2;
        income *= 2;
    }

    CropStats { plant_id: plant.id, seed_id: plant.seed_id, grow_seconds, fert_grow_seconds, harvest_exp, income }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCrop {
    pub stats: CropStats,
    pub score: f64,
}

/// Ranks the seasonal event roster by the requested strategy, descending.
/// Plants outside the roster (see [`is_seasonal_event_plant`]) never appear
/// in the result, regardless of `seasons`. Ties are broken by insertion
/// order from [`ConfigStore::all_seeds`] (ascending required level, then
/// seed id), so lower-level seeds sort first among equals.
pub fn rank_crops(config: &ConfigStore, strategy: Strategy, seasons: i32) -> Vec<RankedCrop> {
    let mut ranked: Vec<RankedCrop> = config
        .all_seeds()
        .into_iter()
        .filter(|plant| is_seasonal_event_plant(plant))
        .map(|plant| {
            let stats = crop_stats(plant, seasons);
            let score = match strategy {
                Strategy::Preferred | Strategy::Level => 0.0,
                Strategy::MaxExp => stats.exp_per_hour(),
                Strategy::MaxFertExp => stats.fert_exp_per_hour(),
                Strategy::MaxProfit => stats.profit_per_hour(),
                Strategy::MaxFertProfit => stats.fert_profit_per_hour(),
            };
            RankedCrop { stats, score }
        })
        .collect();

    if !matches!(strategy, Strategy::Preferred | Strategy::Level) {
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_phase_seconds_reads_colon_semicolon_table() {
        assert_eq!(parse_phase_seconds("1:3600;2:1800"), vec![(1, 3600), (2, 1800)]);
    }

    #[test]
    fn total_seconds_with_normal_fertilizer_subtracts_first_phase_only() {
        let total = total_seconds_with_normal_fertilizer("1:3600;2:1800;3:900", "1:1000");
        // first phase (3600) minus min(1000, 3600) = 2600, plus remaining 1800+900.
        assert_eq!(total, 2600 + 1800 + 900);
    }

    #[test]
    fn total_seconds_with_normal_fertilizer_clamps_to_first_phase_length() {
        let total = total_seconds_with_normal_fertilizer("1:500;2:1800", "1:999999");
        assert_eq!(total, 0 + 1800);
    }

    #[test]
    fn seasonal_event_plant_gets_bonus_multipliers() {
        let plant = PlantRow {
            id: 1021001,
            name: "Event Wheat".into(),
            seed_id: 20001,
            fruit_id: 30001,
            grow_time: "1:3600".into(),
            harvest_exp: 10,
            income: 100,
            required_level: 1,
            normal_fertilizer_reduce_sec: "1:0".into(),
        };
        let normal = crop_stats(&plant, 1);
        let seasonal = crop_stats(&plant, 2);
        assert_eq!(normal.harvest_exp, 10);
        assert_eq!(seasonal.harvest_exp, 20);
        assert_eq!(seasonal.income, 200);
        assert_eq!(seasonal.grow_seconds, 5400);
    }

    #[test]
    fn rank_crops_excludes_plants_outside_the_seasonal_roster() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gameConfig")).unwrap();
        std::fs::write(
            dir.path().join("gameConfig/Plant.json"),
            r#"[
                {"id": 1021001, "seedId": 20001, "fruitId": 30001, "growTime": "1:3600", "harvestExp": 10, "income": 60, "requiredLevel": 1, "normalFertilizerReduceSec": "1:0"},
                {"id": 2001, "seedId": 40002, "fruitId": 30002, "growTime": "1:3600", "harvestExp": 10, "income": 9999, "requiredLevel": 1, "normalFertilizerReduceSec": "1:0"}
            ]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("gameConfig/ItemInfo.json"), "[]").unwrap();
        std::fs::write(dir.path().join("gameConfig/RoleLevel.json"), "[]").unwrap();
        let config = ConfigStore::load(dir.path()).unwrap();

        let ranked = rank_crops(&config, Strategy::MaxProfit, 1);
        // the 9999-income plant (id 2001, seed 40002) is outside the roster
        // and must not appear even though it would dominate the ranking.
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].stats.seed_id, 20001);
    }

    #[test]
    fn rank_crops_by_max_profit_sorts_descending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gameConfig")).unwrap();
        std::fs::write(
            dir.path().join("gameConfig/Plant.json"),
            r#"[
                {"id": 1021001, "seedId": 20001, "fruitId": 30001, "growTime": "1:3600", "harvestExp": 10, "income": 60, "requiredLevel": 1, "normalFertilizerReduceSec": "1:0"},
                {"id": 1021002, "seedId": 20002, "fruitId": 30002, "growTime": "1:3600", "harvestExp": 10, "income": 360, "requiredLevel": 1, "normalFertilizerReduceSec": "1:0"}
            ]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("gameConfig/ItemInfo.json"), "[]").unwrap();
        std::fs::write(dir.path().join("gameConfig/RoleLevel.json"), "[]").unwrap();
        let config = ConfigStore::load(dir.path()).unwrap();

        let ranked = rank_crops(&config, Strategy::MaxProfit, 1);
        assert_eq!(ranked[0].stats.seed_id, 20002);
        assert_eq!(ranked[0].score, 360.0);
    }
}
