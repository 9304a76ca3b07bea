// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C2: friend-farm interactions (steal, water, weed, de-bug, sabotage) plus
//! the friend roster and applications.

use std::collections::HashMap;
use std::time::Duration;

use farmgate::proto::{
    self, AcceptFriendsReply, AcceptFriendsRequest, CheckCanOperateReply, CheckCanOperateRequest,
    EnterReason, EnterReply, EnterRequest, GameFriend, GetAllReply, GetAllRequest,
    GetApplicationsReply, GetApplicationsRequest, HarvestReply, HarvestRequest, InsecticideReply,
    InsecticideRequest, LandInfo, LeaveReply, LeaveRequest, OperationLimit, PutInsectsReply,
    PutInsectsRequest, PutWeedsReply, PutWeedsRequest, WaterLandReply, WaterLandRequest,
    WeedOutReply, WeedOutRequest,
};
use farmgate::GatewaySession;
use tracing::debug;

use crate::domain::rpc::call;
use crate::error::EngineError;

const VISIT_SERVICE: &str = "gamepb.visitpb.VisitService";
const PLANT_SERVICE: &str = "gamepb.plantpb.PlantService";
const FRIEND_SERVICE: &str = "gamepb.friendpb.FriendService";

/// Hard-excluded pseudo-friend the game always includes in the roster.
const EXCLUDED_FRIEND_NAME: &str = "Little Farmer";

/// Remote operation ids accepted by `CheckCanOperate`, in the order the
/// client tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendOp {
    Steal = 10001,
    Water = 10002,
    Weed = 10003,
    Bug = 10004,
    PutWeed = 10005,
    PutBug = 10006,
    HelpHarvest = 10007,
    Bad = 10008,
}

impl FriendOp {
    pub fn id(self) -> i64 {
        self as i64
    }

    /// Lowercase name used in quota-exhausted messages and daily-limit
    /// bucketing; mirrors the variant name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Steal => "steal",
            Self::Water => "water",
            Self::Weed => "weed",
            Self::Bug => "bug",
            Self::PutWeed => "put_weed",
            Self::PutBug => "put_bug",
            Self::HelpHarvest => "help_harvest",
            Self::Bad => "bad",
        }
    }
}

pub async fn get_all(session: &GatewaySession) -> Result<GetAllReply, EngineError> {
    call(session, FRIEND_SERVICE, "GetAll", GetAllRequest {}).await
}

pub async fn get_applications(session: &GatewaySession) -> Result<GetApplicationsReply, EngineError> {
    call(session, FRIEND_SERVICE, "GetApplications", GetApplicationsRequest {}).await
}

pub async fn accept_friends(session: &GatewaySession, friend_gids: Vec<i64>) -> Result<AcceptFriendsReply, EngineError> {
    call(session, FRIEND_SERVICE, "AcceptFriends", AcceptFriendsRequest { friend_gids }).await
}

/// The friend roster sorted by name then gid, with the game's built-in
/// placeholder friend excluded so it never gets treated as a real target.
pub fn get_friends_list(reply: &GetAllReply) -> Vec<&GameFriend> {
    let mut friends: Vec<&GameFriend> =
        reply.game_friends.iter().filter(|f| f.name != EXCLUDED_FRIEND_NAME).collect();
    friends.sort_by(|a, b| a.name.cmp(&b.name).then(a.gid.cmp(&b.gid)));
    friends
}

pub async fn enter(session: &GatewaySession, host_gid: i64) -> Result<EnterReply, EngineError> {
    call(session, VISIT_SERVICE, "Enter", EnterRequest { host_gid, reason: EnterReason::Friend as i32 }).await
}

pub async fn leave(session: &GatewaySession, host_gid: i64) -> Result<LeaveReply, EngineError> {
    call(session, VISIT_SERVICE, "Leave", LeaveRequest { host_gid }).await
}

pub async fn check_can_operate_remote(
    session: &GatewaySession,
    host_gid: i64,
    op: FriendOp,
) -> Result<CheckCanOperateReply, EngineError> {
    call(session, PLANT_SERVICE, "CheckCanOperate", CheckCanOperateRequest { host_gid, operation_id: op.id() }).await
}

#[derive(Debug, Default)]
pub struct FriendLandSurvey {
    pub stealable: Vec<i64>,
    pub stealable_info: Vec<(i64, i64)>,
    pub need_water: Vec<i64>,
    pub need_weed: Vec<i64>,
    pub need_bug: Vec<i64>,
    pub can_put_weed: Vec<i64>,
    pub can_put_bug: Vec<i64>,
}

/// Classifies a friend's lands for the interactions we can offer. Sabotage
/// (`canPutWeed`/`canPutBug`) is only offered on lands with fewer than two
/// existing weed/insect owners and where we are not already an owner
/// ourselves, matching the plant-service cap on simultaneous sabotage.
pub fn analyze_friend_lands(self_gid: i64, lands: &[LandInfo]) -> FriendLandSurvey {
    let mut survey = FriendLandSurvey::default();
    for land in lands {
        let Some(plant) = &land.plant else { continue };
        if plant.stealable && plant.steal_plant_num > 0 {
            survey.stealable.push(land.id);
            survey.stealable_info.push((land.id, plant.steal_plant_num));
        }
        if plant.dry_num > 0 {
            survey.need_water.push(land.id);
        }
        if plant.weed_num > 0 {
            survey.need_weed.push(land.id);
        }
        if plant.insect_num > 0 {
            survey.need_bug.push(land.id);
        }
        if plant.weed_owners.len() < 2 && !plant.weed_owners.contains(&self_gid) {
            survey.can_put_weed.push(land.id);
        }
        if plant.insect_owners.len() < 2 && !plant.insect_owners.contains(&self_gid) {
            survey.can_put_bug.push(land.id);
        }
    }
    survey
}

pub enum FriendOperationOutcome {
    Steal(HarvestReply),
    Water(WaterLandReply),
    Weed(WeedOutReply),
    Bug(InsecticideReply),
    PutWeed(PutWeedsReply),
    PutBug(PutInsectsReply),
    Bad(PutWeedsReply, PutInsectsReply),
    /// The day's quota for this op is already spent; no RPC was issued.
    QuotaExhausted { message: String },
}

/// The `operation_limits` rows carried back by a successful reply, used to
/// keep [`DailyOperationLimits`] in sync with the server's own count.
pub fn operation_limits_of(outcome: &FriendOperationOutcome) -> Vec<OperationLimit> {
    match outcome {
        FriendOperationOutcome::Steal(r) => r.operation_limits.clone(),
        FriendOperationOutcome::Water(r) => r.operation_limits.clone(),
        FriendOperationOutcome::Weed(r) => r.operation_limits.clone(),
        FriendOperationOutcome::Bug(r) => r.operation_limits.clone(),
        FriendOperationOutcome::PutWeed(r) => r.operation_limits.clone(),
        FriendOperationOutcome::PutBug(r) => r.operation_limits.clone(),
        FriendOperationOutcome::Bad(weed, bug) => {
            weed.operation_limits.iter().chain(bug.operation_limits.iter()).cloned().collect()
        }
        FriendOperationOutcome::QuotaExhausted { .. } => Vec::new(),
    }
}

/// Performs one friend interaction after confirming the server still
/// allows it. Steal targets beyond `can_steal_num` are silently dropped
/// rather than attempted, since the server rejects over-quota requests
/// wholesale instead of partially applying them.
pub async fn do_friend_operation(
    session: &GatewaySession,
    host_gid: i64,
    op: FriendOp,
    land_ids: Vec<i64>,
    limits: &DailyOperationLimits,
) -> Result<FriendOperationOutcome, EngineError> {
    if limits.is_exhausted(op) {
        return Ok(FriendOperationOutcome::QuotaExhausted {
            message: format!("today's {} quota exhausted", op.name()),
        });
    }

    let check = check_can_operate_remote(session, host_gid, op).await?;
    if !check.can_operate {
        return Err(EngineError::InvalidArgument(format!("operation not permitted by host: {op:?}")));
    }

    match op {
        FriendOp::Steal => {
            let limited: Vec<i64> = land_ids.into_iter().take(check.can_steal_num.max(0) as usize).collect();
            if limited.is_empty() {
                return Err(EngineError::InvalidArgument("no steal quota remaining".to_owned()));
            }
            let reply = call(session, PLANT_SERVICE, "Harvest", HarvestRequest { land_ids: limited, host_gid, is_all: false }).await?;
            Ok(FriendOperationOutcome::Steal(reply))
        }
        FriendOp::Water => {
            let reply = call(session, PLANT_SERVICE, "WaterLand", WaterLandRequest { land_ids, host_gid }).await?;
            Ok(FriendOperationOutcome::Water(reply))
        }
        FriendOp::Weed => {
            let reply = call(session, PLANT_SERVICE, "WeedOut", WeedOutRequest { land_ids, host_gid }).await?;
            Ok(FriendOperationOutcome::Weed(reply))
        }
        FriendOp::Bug => {
            let reply = call(session, PLANT_SERVICE, "Insecticide", InsecticideRequest { land_ids, host_gid }).await?;
            Ok(FriendOperationOutcome::Bug(reply))
        }
        FriendOp::PutWeed => {
            let reply = call(session, PLANT_SERVICE, "PutWeeds", PutWeedsRequest { host_gid, land_ids }).await?;
            Ok(FriendOperationOutcome::PutWeed(reply))
        }
        FriendOp::PutBug => {
            let reply = call(session, PLANT_SERVICE, "PutInsects", PutInsectsRequest { host_gid, land_ids }).await?;
            Ok(FriendOperationOutcome::PutBug(reply))
        }
        FriendOp::Bad => {
            let weed_reply = call(session, PLANT_SERVICE, "PutWeeds", PutWeedsRequest { host_gid, land_ids: land_ids.clone() }).await?;
            let bug_reply = call(session, PLANT_SERVICE, "PutInsects", PutInsectsRequest { host_gid, land_ids }).await?;
            Ok(FriendOperationOutcome::Bad(weed_reply, bug_reply))
        }
        FriendOp::HelpHarvest => {
            let reply = call(session, PLANT_SERVICE, "Harvest", HarvestRequest { land_ids, host_gid, is_all: false }).await?;
            Ok(FriendOperationOutcome::Steal(reply))
        }
    }
}

/// Runs `batch` once; on failure falls back to one RPC per item spaced by
/// `spacing`, matching the original's degrade-gracefully behavior when a
/// batch endpoint intermittently rejects large requests.
pub async fn run_batch_with_fallback<T, F, Fut, G, FutG>(
    items: Vec<T>,
    batch: F,
    per_item: G,
    spacing: Duration,
) -> Result<(), EngineError>
where
    T: Clone,
    F: FnOnce(Vec<T>) -> Fut,
    Fut: std::future::Future<Output = Result<(), EngineError>>,
    G: Fn(T) -> FutG,
    FutG: std::future::Future<Output = Result<(), EngineError>>,
{
    if items.is_empty() {
        return Ok(());
    }
    match batch(items.clone()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(error = %e, "batch call failed, falling back to per-item");
            for (i, item) in items.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(spacing).await;
                }
                per_item(item).await?;
            }
            Ok(())
        }
    }
}

/// Per-account daily operation-limit table, merged from the
/// `operation_limits` rows every plant-service reply carries, and emptied
/// on the first access past local-date rollover.
#[derive(Debug, Clone, Default)]
pub struct DailyOperationLimits {
    pub last_reset_date: String,
    table: HashMap<i64, OperationLimit>,
}

impl DailyOperationLimits {
    pub fn check_and_reset(&mut self, today: &str) {
        if self.last_reset_date != today {
            self.last_reset_date = today.to_owned();
            self.table.clear();
        }
    }

    /// Merges freshly-reported limit rows into the table, overwriting any
    /// prior entry for the same operation id.
    pub fn merge(&mut self, rows: &[OperationLimit]) {
        for row in rows {
            self.table.insert(row.id, row.clone());
        }
    }

    /// True once the server has reported the day's usage at or past its
    /// cap for `op`. An op the table has never seen is never exhausted.
    pub fn is_exhausted(&self, op: FriendOp) -> bool {
        self.table.get(&op.id()).is_some_and(|row| row.day_times_lt > 0 && row.day_times >= row.day_times_lt)
    }
}

#[allow(dead_code)]
fn phase_enum_roundtrip_marker() -> i32 {
    proto::Phase::Mature as i32
}
