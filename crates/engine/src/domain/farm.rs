// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C2: own-farm operations (inspect, harvest, water/weed/de-bug, plant,
//! fertilize, land upgrade/unlock) and the seed-choice heuristics that
//! feed them.

use farmgate::proto::{
    self, AllLandsReply, AllLandsRequest, BuyGoodsReply, BuyGoodsRequest, FertilizeReply,
    FertilizeRequest, HarvestReply, HarvestRequest, InsecticideReply, InsecticideRequest,
    LandInfo, PlantInfo, PlantPhaseInfo, PlantReply, PlantRequest, RemovePlantReply,
    RemovePlantRequest, ShopInfoReply, ShopInfoRequest, UnlockLandReply, UnlockLandRequest,
    UpgradeLandReply, UpgradeLandRequest, WaterLandReply, WaterLandRequest, WeedOutReply,
    WeedOutRequest,
};
use farmgate::GatewaySession;

use crate::config_store::ConfigStore;
use crate::domain::analytics::rank_crops;
use crate::domain::rpc::call;
use crate::error::EngineError;
use crate::model::Strategy;

const SERVICE: &str = "gamepb.plantpb.PlantService";
const SHOP_SERVICE: &str = "gamepb.shoppb.ShopService";

/// A timestamp field on the wire is in seconds if small, milliseconds if
/// not: anything above 10^12 cannot be a plausible Unix-seconds value for
/// decades, so treat it as milliseconds.
pub fn to_time_sec(raw: i64) -> i64 {
    if raw > 1_000_000_000_000 {
        raw / 1000
    } else {
        raw
    }
}

/// The plant's current growth phase is the one with the greatest
/// `begin_time` that has already started, i.e. `begin_time <= now`.
pub fn current_phase(plant: &PlantInfo, now_secs: i64) -> Option<&PlantPhaseInfo> {
    plant
        .phases
        .iter()
        .filter(|p| to_time_sec(p.begin_time) <= now_secs)
        .max_by_key(|p| to_time_sec(p.begin_time))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandStatus {
    Empty,
    Growing,
    NeedsWater,
    NeedsWeed,
    NeedsBug,
    ReadyToHarvest,
    Dead,
}

/// Classifies one land the way the game client would render its icon:
/// dead/ready/weeds/bugs/drought take priority over plain growing.
pub fn classify_land(land: &LandInfo, now_secs: i64) -> LandStatus {
    let Some(plant) = &land.plant else {
        return LandStatus::Empty;
    };
    let phase = current_phase(plant, now_secs).map(|p| p.phase);
    if phase == Some(proto::Phase::Dead as i32) {
        return LandStatus::Dead;
    }
    if phase == Some(proto::Phase::Mature as i32) {
        return LandStatus::ReadyToHarvest;
    }
    if plant.dry_num > 0 {
        return LandStatus::NeedsWater;
    }
    if plant.weed_num > 0 {
        return LandStatus::NeedsWeed;
    }
    if plant.insect_num > 0 {
        return LandStatus::NeedsBug;
    }
    LandStatus::Growing
}

pub struct LandSurvey {
    pub unlocked: Vec<LandInfo>,
    pub empty: Vec<i64>,
    pub dead: Vec<i64>,
    pub ready_to_harvest: Vec<i64>,
    pub needs_water: Vec<i64>,
    pub needs_weed: Vec<i64>,
    pub needs_bug: Vec<i64>,
    pub upgradeable: Vec<i64>,
    pub unlockable: Vec<i64>,
}

pub fn analyze_lands(lands: &[LandInfo], now_secs: i64) -> LandSurvey {
    let mut survey = LandSurvey {
        unlocked: Vec::new(),
        empty: Vec::new(),
        dead: Vec::new(),
        ready_to_harvest: Vec::new(),
        needs_water: Vec::new(),
        needs_weed: Vec::new(),
        needs_bug: Vec::new(),
        upgradeable: Vec::new(),
        unlockable: Vec::new(),
    };

    for land in lands {
        if land.could_unlock {
            survey.unlockable.push(land.id);
            continue;
        }
        if !land.unlocked {
            continue;
        }
        if land.could_upgrade {
            survey.upgradeable.push(land.id);
        }
        match classify_land(land, now_secs) {
            LandStatus::Empty => survey.empty.push(land.id),
            LandStatus::Dead => survey.dead.push(land.id),
            LandStatus::ReadyToHarvest => survey.ready_to_harvest.push(land.id),
            LandStatus::NeedsWater => survey.needs_water.push(land.id),
            LandStatus::NeedsWeed => survey.needs_weed.push(land.id),
            LandStatus::NeedsBug => survey.needs_bug.push(land.id),
            LandStatus::Growing => {}
        }
        survey.unlocked.push(land.clone());
    }
    survey
}

/// Picks a seed id for an empty land. `Preferred` uses the account's fixed
/// `preferred_seed_id` when it is still available at the account's level;
/// `Level` picks the highest-required-level seed the account can afford;
/// the `Max*` strategies delegate to [`rank_crops`].
pub fn choose_seed(config: &ConfigStore, strategy: Strategy, preferred_seed_id: u64, level: u32, seasons: i32) -> Option<u64> {
    let affordable: Vec<_> = config.all_seeds().into_iter().filter(|p| p.required_level <= level).collect();
    if affordable.is_empty() {
        return None;
    }

    match strategy {
        Strategy::Preferred => {
            if preferred_seed_id != 0 && affordable.iter().any(|p| p.seed_id == preferred_seed_id) {
                Some(preferred_seed_id)
            } else {
                affordable.last().map(|p| p.seed_id)
            }
        }
        Strategy::Level => affordable.last().map(|p| p.seed_id),
        Strategy::MaxExp | Strategy::MaxFertExp | Strategy::MaxProfit | Strategy::MaxFertProfit => {
            rank_crops(config, strategy, seasons)
                .into_iter()
                .find(|ranked| affordable.iter().any(|p| p.seed_id == ranked.stats.seed_id))
                .map(|ranked| ranked.stats.seed_id)
        }
    }
}

/// How many more units of `seed_id` to buy before planting, and at what
/// price, given current `stock`, `gold`, and how many units the plant
/// targets need in total. Returns `0` if stock already covers the need or
/// the shop has no matching, unlocked, in-stock listing.
///
/// Caps the buy to what's affordable (`gold / price`), never goes into
/// debt, and never buys more than the shortfall.
pub fn plan_purchase(goods: &[proto::GoodsInfo], seed_id: u64, stock: i64, needed: i64, gold: i64) -> (i64, i64) {
    let shortfall = needed - stock;
    if shortfall <= 0 {
        return (0, 0);
    }
    let Some(listing) = goods.iter().find(|g| g.seed_id as u64 == seed_id && !g.locked && !g.sold_out) else {
        return (0, 0);
    };
    if listing.price <= 0 {
        return (0, 0);
    }
    let affordable = gold / listing.price;
    (shortfall.min(affordable).max(0), listing.price)
}

pub async fn shop_info(session: &GatewaySession) -> Result<ShopInfoReply, EngineError> {
    call(session, SHOP_SERVICE, "ShopInfo", ShopInfoRequest {}).await
}

pub async fn buy_goods(session: &GatewaySession, goods_id: i64, count: i64) -> Result<BuyGoodsReply, EngineError> {
    call(session, SHOP_SERVICE, "BuyGoods", BuyGoodsRequest { goods_id, count }).await
}

pub async fn all_lands(session: &GatewaySession) -> Result<AllLandsReply, EngineError> {
    call(session, SERVICE, "AllLands", AllLandsRequest {}).await
}

pub async fn harvest(session: &GatewaySession, land_ids: Vec<i64>, host_gid: i64, is_all: bool) -> Result<HarvestReply, EngineError> {
    call(session, SERVICE, "Harvest", HarvestRequest { land_ids, host_gid, is_all }).await
}

pub async fn water_land(session: &GatewaySession, land_ids: Vec<i64>, host_gid: i64) -> Result<WaterLandReply, EngineError> {
    call(session, SERVICE, "WaterLand", WaterLandRequest { land_ids, host_gid }).await
}

pub async fn weed_out(session: &GatewaySession, land_ids: Vec<i64>, host_gid: i64) -> Result<WeedOutReply, EngineError> {
    call(session, SERVICE, "WeedOut", WeedOutRequest { land_ids, host_gid }).await
}

pub async fn insecticide(session: &GatewaySession, land_ids: Vec<i64>, host_gid: i64) -> Result<InsecticideReply, EngineError> {
    call(session, SERVICE, "Insecticide", InsecticideRequest { land_ids, host_gid }).await
}

pub async fn plant(session: &GatewaySession, land_id: i64, seed_id: i64) -> Result<PlantReply, EngineError> {
    call(session, SERVICE, "Plant", PlantRequest { land_id, seed_id }).await
}

/// Clears a dead or just-harvested land so it can be re-planted. Whether
/// the server actually requires this before `plant` is uncertain; callers
/// are expected to ignore the error and attempt to plant regardless.
pub async fn remove_plant(session: &GatewaySession, land_id: i64) -> Result<RemovePlantReply, EngineError> {
    call(session, SERVICE, "RemovePlant", RemovePlantRequest { land_id }).await
}

/// Tries the fertilizer item id list in order and returns on the first
/// success, mirroring the original's dual-write-path fallback: some
/// fertilizer kinds reject certain plant phases, so a caller offering both
/// a normal and an organic fertilizer id expects the second to be tried if
/// the first is rejected.
pub async fn fertilize(session: &GatewaySession, land_id: i64, fertilizer_item_ids: &[i64]) -> Result<FertilizeReply, EngineError> {
    let mut last_err = EngineError::InvalidArgument("no fertilizer item ids supplied".to_owned());
    for &fertilizer_item_id in fertilizer_item_ids {
        match call(session, SERVICE, "Fertilize", FertilizeRequest { land_id, fertilizer_item_id }).await {
            Ok(reply) => return Ok(reply),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

pub async fn upgrade_land(session: &GatewaySession, land_id: i64) -> Result<UpgradeLandReply, EngineError> {
    call(session, SERVICE, "UpgradeLand", UpgradeLandRequest { land_id }).await
}

pub async fn unlock_land(session: &GatewaySession, land_id: i64) -> Result<UnlockLandReply, EngineError> {
    call(session, SERVICE, "UnlockLand", UnlockLandRequest { land_id }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmgate::proto::Phase;

    fn phase(phase: Phase, begin_time: i64) -> PlantPhaseInfo {
        PlantPhaseInfo { phase: phase as i32, begin_time }
    }

    fn plant_with_phases(phases: Vec<PlantPhaseInfo>) -> PlantInfo {
        PlantInfo { id: 1, stealable: false, dry_num: 0, weed_owners: vec![], insect_owners: vec![], phases, steal_plant_num: 0, weed_num: 0, insect_num: 0 }
    }

    #[test]
    fn to_time_sec_normalizes_millisecond_timestamps() {
        assert_eq!(to_time_sec(1_700_000_000), 1_700_000_000);
        assert_eq!(to_time_sec(1_700_000_000_000), 1_700_000_000);
    }

    #[test]
    fn current_phase_picks_latest_begun_phase() {
        let p = plant_with_phases(vec![phase(Phase::Seed, 0), phase(Phase::Sprout, 100), phase(Phase::Flower, 500)]);
        let current = current_phase(&p, 300).unwrap();
        assert_eq!(current.phase, Phase::Sprout as i32);
    }

    #[test]
    fn current_phase_none_when_nothing_has_begun_yet() {
        let p = plant_with_phases(vec![phase(Phase::Seed, 1000)]);
        assert!(current_phase(&p, 500).is_none());
    }

    #[test]
    fn classify_land_prioritizes_mature_over_drought() {
        let mut p = plant_with_phases(vec![phase(Phase::Mature, 0)]);
        p.dry_num = 3;
        let land = LandInfo { id: 1, unlocked: true, level: 1, could_unlock: false, could_upgrade: false, plant: Some(p) };
        assert_eq!(classify_land(&land, 10), LandStatus::ReadyToHarvest);
    }

    #[test]
    fn classify_land_with_no_plant_is_empty() {
        let land = LandInfo { id: 1, unlocked: true, level: 1, could_unlock: false, could_upgrade: false, plant: None };
        assert_eq!(classify_land(&land, 10), LandStatus::Empty);
    }

    #[test]
    fn analyze_lands_skips_locked_non_unlockable_lands() {
        let land = LandInfo { id: 1, unlocked: false, level: 0, could_unlock: false, could_upgrade: false, plant: None };
        let survey = analyze_lands(&[land], 0);
        assert!(survey.unlocked.is_empty());
        assert!(survey.unlockable.is_empty());
    }

    #[test]
    fn analyze_lands_routes_unlockable_lands_separately_from_unlocked_lands() {
        let land = LandInfo { id: 2, unlocked: false, level: 0, could_unlock: true, could_upgrade: false, plant: None };
        let survey = analyze_lands(&[land], 0);
        assert_eq!(survey.unlockable, vec![2]);
        assert!(survey.unlocked.is_empty());
    }

    fn goods(seed_id: i64, price: i64, locked: bool, sold_out: bool) -> proto::GoodsInfo {
        proto::GoodsInfo { seed_id, price, locked, sold_out, required_level: 0 }
    }

    #[test]
    fn plan_purchase_caps_buy_to_what_gold_affords() {
        let listing = vec![goods(30001, 100, false, false)];
        // bag has 1 seed, gold=199, price=100, 4 targets need 4 seeds total.
        let (count, price) = plan_purchase(&listing, 30001, 1, 4, 199);
        assert_eq!(count, 1);
        assert_eq!(price, 100);
    }

    #[test]
    fn plan_purchase_buys_nothing_when_stock_already_covers_the_need() {
        let listing = vec![goods(30001, 100, false, false)];
        assert_eq!(plan_purchase(&listing, 30001, 4, 4, 1000), (0, 0));
    }

    #[test]
    fn plan_purchase_skips_locked_or_sold_out_listings() {
        let locked = vec![goods(30001, 100, true, false)];
        assert_eq!(plan_purchase(&locked, 30001, 0, 1, 1000), (0, 0));
        let sold_out = vec![goods(30001, 100, false, true)];
        assert_eq!(plan_purchase(&sold_out, 30001, 0, 1, 1000), (0, 0));
    }

    #[test]
    fn analyze_lands_routes_dead_lands_for_replanting() {
        let p = plant_with_phases(vec![phase(Phase::Dead, 0)]);
        let land = LandInfo { id: 3, unlocked: true, level: 1, could_unlock: false, could_upgrade: false, plant: Some(p) };
        let survey = analyze_lands(&[land], 10);
        assert_eq!(survey.dead, vec![3]);
        assert!(survey.ready_to_harvest.is_empty());
        assert!(survey.empty.is_empty());
    }
}
