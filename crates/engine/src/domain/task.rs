// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C2: daily/growth/main task tracking and reward claims.

use std::time::Duration;

use farmgate::proto::{
    Active, ActiveReward, ClaimDailyRewardReply, ClaimDailyRewardRequest, ClaimTaskRewardReply,
    ClaimTaskRewardRequest, RewardStatus, Task, TaskInfo, TaskInfoReply, TaskInfoRequest,
};
use farmgate::GatewaySession;

use crate::domain::rpc::call;
use crate::error::EngineError;

const SERVICE: &str = "gamepb.taskpb.TaskService";
const CLAIM_SPACING: Duration = Duration::from_millis(200);

pub async fn get_task_info(session: &GatewaySession) -> Result<TaskInfoReply, EngineError> {
    call(session, SERVICE, "TaskInfo", TaskInfoRequest {}).await
}

pub async fn claim_task_reward(session: &GatewaySession, id: i64, do_shared: bool) -> Result<ClaimTaskRewardReply, EngineError> {
    call(session, SERVICE, "ClaimTaskReward", ClaimTaskRewardRequest { id, do_shared }).await
}

pub async fn claim_daily_reward(session: &GatewaySession, active_type: i32, point_ids: Vec<i64>) -> Result<ClaimDailyRewardReply, EngineError> {
    call(session, SERVICE, "ClaimDailyReward", ClaimDailyRewardRequest { r#type: active_type, point_ids }).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedTask {
    pub id: i64,
    pub desc: String,
    pub progress: i64,
    pub total: i64,
    pub can_claim: bool,
}

/// A task is claimable once it is unlocked, not already claimed, has a
/// nonzero total (i.e. is a real, progressable task, not a placeholder),
/// and progress has reached that total.
pub fn format_task(task: &Task) -> FormattedTask {
    let can_claim =
        task.is_unlocked && !task.is_claimed && task.total_progress > 0 && task.progress >= task.total_progress;
    FormattedTask {
        id: task.id,
        desc: task.desc.clone(),
        progress: task.progress,
        total: task.total_progress,
        can_claim,
    }
}

/// Gathers every claimable task id across growth, daily, and main task
/// lists into one merged list.
pub fn collect_claimable_tasks(info: &TaskInfo) -> Vec<i64> {
    info.growth_tasks
        .iter()
        .chain(info.daily_tasks.iter())
        .chain(info.tasks.iter())
        .filter(|t| format_task(t).can_claim)
        .map(|t| t.id)
        .collect()
}

/// Point ids from every active whose per-point status is `DONE`, grouped
/// by active type, ready to be claimed with `ClaimDailyReward`.
pub fn collect_claimable_actives(actives: &[Active]) -> Vec<(i32, Vec<i64>)> {
    actives
        .iter()
        .filter_map(|active| {
            let point_ids: Vec<i64> = active
                .rewards
                .iter()
                .filter(|r: &&ActiveReward| r.status == RewardStatus::Done as i32)
                .map(|r| r.point_id)
                .collect();
            if point_ids.is_empty() {
                None
            } else {
                Some((active.r#type, point_ids))
            }
        })
        .collect()
}

/// Claims every claimable task and active reward found in `info`, spacing
/// successive claim calls to avoid hammering the gateway.
pub async fn check_and_claim_tasks(session: &GatewaySession, info: &TaskInfo) -> Result<u32, EngineError> {
    let mut claimed = 0u32;

    let task_ids = collect_claimable_tasks(info);
    for (i, id) in task_ids.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(CLAIM_SPACING).await;
        }
        claim_task_reward(session, *id, false).await?;
        claimed += 1;
    }

    let actives = collect_claimable_actives(&info.actives);
    for (i, (active_type, point_ids)) in actives.iter().enumerate() {
        if i > 0 || !task_ids.is_empty() {
            tokio::time::sleep(CLAIM_SPACING).await;
        }
        claim_daily_reward(session, *active_type, point_ids.clone()).await?;
        claimed += 1;
    }

    Ok(claimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(unlocked: bool, claimed: bool, progress: i64, total: i64) -> Task {
        Task { id: 1, desc: "test".into(), progress, total_progress: total, is_claimed: claimed, is_unlocked: unlocked, share_multiple: 1, rewards: vec![] }
    }

    #[test]
    fn format_task_requires_unlocked_unclaimed_and_complete() {
        assert!(!format_task(&task(false, false, 5, 5)).can_claim);
        assert!(!format_task(&task(true, true, 5, 5)).can_claim);
        assert!(!format_task(&task(true, false, 4, 5)).can_claim);
        assert!(!format_task(&task(true, false, 0, 0)).can_claim);
        assert!(format_task(&task(true, false, 5, 5)).can_claim);
    }

    #[test]
    fn collect_claimable_tasks_merges_all_three_lists() {
        let info = TaskInfo {
            growth_tasks: vec![task(true, false, 1, 1)],
            daily_tasks: vec![task(true, false, 2, 2)],
            tasks: vec![task(true, false, 3, 3)],
            actives: vec![],
        };
        assert_eq!(collect_claimable_tasks(&info).len(), 3);
    }

    #[test]
    fn collect_claimable_actives_only_includes_done_points() {
        let actives = vec![Active {
            r#type: 1,
            rewards: vec![
                ActiveReward { point_id: 1, status: RewardStatus::Done as i32 },
                ActiveReward { point_id: 2, status: RewardStatus::Pending as i32 },
            ],
        }];
        let claimable = collect_claimable_actives(&actives);
        assert_eq!(claimable, vec![(1, vec![1])]);
    }

    #[test]
    fn collect_claimable_actives_skips_actives_with_nothing_done() {
        let actives = vec![Active { r#type: 1, rewards: vec![ActiveReward { point_id: 1, status: RewardStatus::Pending as i32 }] }];
        assert!(collect_claimable_actives(&actives).is_empty());
    }
}
