// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C4: one account's lifecycle — connect, heartbeat, and the phased
//! automation loop (inspect -> harvest/clear/plant/fertilize -> friend
//! interactions -> tasks -> sell).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use farmgate::{GatewaySession, GatewaySessionConfig};
use prost::Message;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config_store::ConfigStore;
use crate::domain::friend::DailyOperationLimits;
use crate::domain::{farm, friend, invite, task, user, warehouse};
use crate::error::EngineError;
use crate::model::{Account, AccountSettings, FertilizerMode, OperationCounters, SessionSnapshot, SessionState};
use crate::rate_limiter::RateLimiter;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// How often a `wx`-platform account with a configured share file checks
/// for new invites. Invite reporting is best-effort background work, not
/// latency sensitive, so this runs far less often than the farm/friend
/// cycles.
const INVITE_CYCLE_INTERVAL: Duration = Duration::from_secs(600);

/// Item ids the account's own session state tracks out of `ItemNotify`/
/// `BasicNotify` pushes.
const EXP_ITEM_ID: i64 = 1101;
const GOLD_ITEM_IDS: [i64; 2] = [1, 1001];
const COUPON_ITEM_ID: i64 = 1002;

/// Minimum gap between two push-triggered farm cycles, so a burst of
/// `LandsNotify` events doesn't hammer the farm phase.
const FARM_PUSH_DEBOUNCE: Duration = Duration::from_millis(500);

pub type LogSink = Arc<dyn Fn(bool, &str, &str) + Send + Sync>;

/// Parses an `"HH:MM"` clock string into minutes since midnight. Invalid
/// input is treated as midnight rather than rejected, since quiet-hours
/// configuration is user-editable free text.
fn minutes_of_day(clock: &str) -> u32 {
    let mut parts = clock.splitn(2, ':');
    let hours: u32 = parts.next().and_then(|h| h.parse().ok()).unwrap_or(0);
    let minutes: u32 = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    hours.clamp(0, 23) * 60 + minutes.clamp(0, 59)
}

/// True if `now` falls within a `[start, end)` clock window that may wrap
/// past midnight (e.g. `23:00` -> `07:00`). A window whose start and end
/// coincide covers the full day.
pub fn is_within_quiet_hours(start: &str, end: &str, now_minutes_of_day: u32) -> bool {
    let start = minutes_of_day(start);
    let end = minutes_of_day(end);
    if start == end {
        return true;
    }
    if start < end {
        now_minutes_of_day >= start && now_minutes_of_day < end
    } else {
        now_minutes_of_day >= start || now_minutes_of_day < end
    }
}

/// A uniform random delay in `[min, max]` seconds, used to jitter the farm
/// and friend cycle cadence so many accounts don't tick in lockstep.
pub fn jittered_interval(min_secs: u32, max_secs: u32) -> Duration {
    if max_secs <= min_secs {
        return Duration::from_secs(min_secs as u64);
    }
    let secs = rand::thread_rng().gen_range(min_secs..=max_secs);
    Duration::from_secs(secs as u64)
}

/// Formats the current UTC date as `"YYYY-MM-DD"` for the daily-limit
/// table's rollover check. No timezone crate in the dependency tree, so
/// this treats UTC as local, matching how the rest of the crate derives
/// wall-clock values straight off `UNIX_EPOCH`.
fn today_date_string() -> String {
    let secs = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    let days = (secs / 86400) as i64;
    let (y, m, d) = civil_from_days(days);
    format!("{y:04}-{m:02}-{d:02}")
}

/// Howard Hinnant's days-from-civil algorithm, run in reverse: converts a
/// day count since the Unix epoch into a proleptic-Gregorian `(year,
/// month, day)` triple.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

struct Shared {
    account: Account,
    settings: RwLock<AccountSettings>,
    config: Arc<ConfigStore>,
    rate_limiter: Arc<RateLimiter>,
    counters: Mutex<OperationCounters>,
    log_sink: LogSink,
    cancel: CancellationToken,
    running: AtomicBool,
    session_state: RwLock<SessionState>,
    friend_limits: Mutex<DailyOperationLimits>,
    farm_running: AtomicBool,
    last_push_farm: Mutex<Instant>,
}

/// Owns one account's [`GatewaySession`] and drives its automation loop.
/// `start`/`stop` are idempotent: calling `start` on an already-running
/// runtime or `stop` on a stopped one is a no-op.
pub struct AccountRuntime {
    shared: Arc<Shared>,
    session: Arc<GatewaySession>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AccountRuntime {
    pub fn new(
        account: Account,
        settings: AccountSettings,
        config: Arc<ConfigStore>,
        rate_limiter: Arc<RateLimiter>,
        gateway_url: String,
        log_sink: LogSink,
    ) -> Self {
        let session_config = GatewaySessionConfig { gateway_url, ..GatewaySessionConfig::default() };
        Self {
            shared: Arc::new(Shared {
                account,
                settings: RwLock::new(settings),
                config,
                rate_limiter,
                counters: Mutex::new(OperationCounters::default()),
                log_sink,
                cancel: CancellationToken::new(),
                running: AtomicBool::new(false),
                session_state: RwLock::new(SessionState::default()),
                friend_limits: Mutex::new(DailyOperationLimits::default()),
                farm_running: AtomicBool::new(false),
                last_push_farm: Mutex::new(Instant::now() - FARM_PUSH_DEBOUNCE),
            }),
            session: Arc::new(GatewaySession::new(session_config)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn counters(&self) -> OperationCounters {
        self.shared.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn update_settings(&self, settings: AccountSettings) {
        *self.shared.settings.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
    }

    fn log(&self, is_warn: bool, tag: &str, msg: &str) {
        (self.shared.log_sink)(is_warn, tag, msg);
    }

    /// Brings the session up: opens the gateway connection, registers the
    /// notification handler, logs in, seeds the ephemeral session state
    /// (profile fields from the login reply, coupon count from one bag
    /// read), then spawns the background loops. Any failure before the
    /// loops are spawned tears the connection back down and leaves the
    /// runtime stopped.
    pub async fn start(&self) -> Result<(), EngineError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.session.start(&self.shared.account.code).await {
            self.shared.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let notify_shared = Arc::clone(&self.shared);
        let notify_session = Arc::clone(&self.session);
        self.session
            .on_notify(
                "*",
                Arc::new(move |event_type, body| {
                    handle_notify(&notify_shared, &notify_session, event_type, body);
                }),
            )
            .await;

        if let Err(e) = self.login_and_seed_session_state().await {
            self.session.stop().await;
            self.shared.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.log(false, "runtime", "session started");

        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.push(tokio::spawn(heartbeat_loop(Arc::clone(&self.shared), Arc::clone(&self.session))));
        tasks.push(tokio::spawn(farm_cycle_loop(Arc::clone(&self.shared), Arc::clone(&self.session))));
        tasks.push(tokio::spawn(friend_cycle_loop(Arc::clone(&self.shared), Arc::clone(&self.session))));
        if self.shared.account.platform == "wx" && self.shared.account.share_file_path.is_some() {
            tasks.push(tokio::spawn(invite_cycle_loop(Arc::clone(&self.shared), Arc::clone(&self.session))));
        }
        Ok(())
    }

    async fn login_and_seed_session_state(&self) -> Result<(), EngineError> {
        let version = GatewaySessionConfig::default().client_version;
        let login = user::login(&self.session, &version).await?;

        let snapshot = SessionSnapshot {
            gid: login.gid,
            display_name: login.name,
            level: login.level.max(0) as u32,
            gold: login.gold,
            exp: login.exp,
            coupon: login.coupon,
        };
        {
            let mut state = self.shared.session_state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.current = snapshot.clone();
            state.initial_state = snapshot;
        }

        match warehouse::get_bag(&self.session).await {
            Ok(bag) => {
                let coupon = warehouse::seed_stock(&bag, COUPON_ITEM_ID);
                self.shared.session_state.write().unwrap_or_else(|poisoned| poisoned.into_inner()).current.coupon = coupon;
            }
            Err(e) => {
                warn!(account_id = %self.shared.account.id, error = %e, "initial bag read failed, keeping login-reported coupon count");
            }
        }

        Ok(())
    }

    /// Idempotent: stopping an already-stopped runtime is a no-op.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.cancel.cancel();
        self.session.stop().await;
        let handles: Vec<_> = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.log(false, "runtime", "session stopped");
    }
}

/// Reacts to every server push the gateway forwards. Registered once as the
/// wildcard (`"*"`) handler; [`farmgate::gateway::NotifyHandler`] is
/// synchronous, so any reaction that itself needs to call back into the
/// gateway is spawned rather than awaited inline.
fn handle_notify(shared: &Arc<Shared>, session: &Arc<GatewaySession>, event_type: &str, body: &[u8]) {
    match event_type {
        "Kickout" => {
            if let Ok(notify) = farmgate::proto::KickoutNotify::decode(body) {
                warn!(account_id = %shared.account.id, reason = %notify.reason_message, "kicked out by gateway");
            } else {
                warn!(account_id = %shared.account.id, "kicked out by gateway");
            }
            shared.cancel.cancel();
            shared.running.store(false, Ordering::SeqCst);
        }
        "LandsNotify" => {
            let (farm_push_enabled, farm_busy) = {
                let s = shared.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner());
                (s.automation.farm_push, shared.farm_running.load(Ordering::SeqCst))
            };
            if !farm_push_enabled || farm_busy {
                return;
            }
            let due = {
                let mut last = shared.last_push_farm.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if last.elapsed() < FARM_PUSH_DEBOUNCE {
                    false
                } else {
                    *last = Instant::now();
                    true
                }
            };
            if !due {
                return;
            }
            let shared = Arc::clone(shared);
            let session = Arc::clone(session);
            tokio::spawn(async move { run_farm_cycle(&shared, &session).await });
        }
        "ItemNotify" => {
            let Ok(notify) = farmgate::proto::ItemNotify::decode(body) else { return };
            let mut state = shared.session_state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            for row in &notify.items {
                let Some(item) = &row.item else { continue };
                let field = if item.id == EXP_ITEM_ID {
                    &mut state.current.exp
                } else if GOLD_ITEM_IDS.contains(&item.id) {
                    &mut state.current.gold
                } else if item.id == COUPON_ITEM_ID {
                    &mut state.current.coupon
                } else {
                    continue;
                };
                *field = if item.count > 0 { item.count } else { (*field + row.delta).max(0) };
            }
        }
        "BasicNotify" => {
            let Ok(notify) = farmgate::proto::BasicNotify::decode(body) else { return };
            let Some(basic) = notify.basic else { return };
            let mut state = shared.session_state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            if basic.level >= 0 {
                state.current.level = basic.level as u32;
            }
            if basic.gold >= 0 {
                state.current.gold = basic.gold;
            }
            if basic.exp >= 0 {
                state.current.exp = basic.exp;
            }
        }
        "TaskInfoNotify" => {
            let task_enabled = shared.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner()).automation.task;
            if !task_enabled {
                return;
            }
            let Ok(notify) = farmgate::proto::TaskInfoNotify::decode(body) else { return };
            let Some(info) = notify.task_info else { return };
            let shared = Arc::clone(shared);
            let session = Arc::clone(session);
            tokio::spawn(async move {
                match task::check_and_claim_tasks(&session, &info).await {
                    Ok(claimed) if claimed > 0 => bump(&shared, |c| c.task_claim += claimed as u64),
                    Ok(_) => {}
                    Err(e) => warn!(account_id = %shared.account.id, error = %e, "push-triggered task-claim sweep failed"),
                }
            });
        }
        "FriendApplicationReceivedNotify" => {
            let Ok(notify) = farmgate::proto::FriendApplicationReceivedNotify::decode(body) else { return };
            if notify.applications.is_empty() {
                return;
            }
            let gids: Vec<i64> = notify.applications.iter().map(|a| a.gid).collect();
            let shared = Arc::clone(shared);
            let session = Arc::clone(session);
            tokio::spawn(async move {
                if let Err(e) = friend::accept_friends(&session, gids).await {
                    warn!(account_id = %shared.account.id, error = %e, "auto-accept friend application failed");
                }
            });
        }
        _ => {}
    }
}

/// Runs the own-farm phase with a busy-guard so a `LandsNotify` push can
/// never overlap a timer-driven cycle (or another push) already in
/// flight.
async fn run_farm_cycle(shared: &Arc<Shared>, session: &GatewaySession) {
    if shared.farm_running.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Err(e) = do_farm_operation(shared, session).await {
        warn!(account_id = %shared.account.id, error = %e, "farm cycle failed");
    }
    shared.farm_running.store(false, Ordering::SeqCst);
}

async fn heartbeat_loop(shared: Arc<Shared>, session: Arc<GatewaySession>) {
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                let version = GatewaySessionConfig::default().client_version;
                let gid = shared.session_state.read().unwrap_or_else(|poisoned| poisoned.into_inner()).current.gid;
                if let Err(e) = user::heartbeat(&session, gid, &version).await {
                    warn!(account_id = %shared.account.id, error = %e, "heartbeat failed");
                }
            }
        }
    }
}

async fn farm_cycle_loop(shared: Arc<Shared>, session: Arc<GatewaySession>) {
    loop {
        let (enabled, min, max) = {
            let s = shared.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            (s.automation.farm, s.intervals.farm_min, s.intervals.farm_max)
        };
        if enabled {
            run_farm_cycle(&shared, &session).await;
        }
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(jittered_interval(min, max)) => {}
        }
    }
}

async fn friend_cycle_loop(shared: Arc<Shared>, session: Arc<GatewaySession>) {
    loop {
        let (enabled, min, max, quiet) = {
            let s = shared.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            (s.automation.friend, s.intervals.friend_min, s.intervals.friend_max, s.friend_quiet_hours.clone())
        };
        let now_minutes = current_minute_of_day();
        let quiet_now = quiet.enabled && is_within_quiet_hours(&quiet.start, &quiet.end, now_minutes);
        if enabled && !quiet_now {
            if let Err(e) = auto_friend_cycle(&shared, &session).await {
                warn!(account_id = %shared.account.id, error = %e, "friend cycle failed");
            }
        }
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(jittered_interval(min, max)) => {}
        }
    }
}

async fn invite_cycle_loop(shared: Arc<Shared>, session: Arc<GatewaySession>) {
    let Some(path) = shared.account.share_file_path.clone() else { return };
    let path = std::path::PathBuf::from(path);
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(INVITE_CYCLE_INTERVAL) => {
                let shared_for_log = Arc::clone(&shared);
                let outcome = invite::process_invites(&session, &shared.account.platform, &path, |is_warn, msg| {
                    (shared_for_log.log_sink)(is_warn, "invite", msg);
                })
                .await;
                if !outcome.skipped {
                    info!(account_id = %shared.account.id, success = outcome.success, failed = outcome.failed, "invite cycle complete");
                }
            }
        }
    }
}

fn current_minute_of_day() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    ((secs % 86400) / 60) as u32
}

/// The own-farm phase: inspect every land, then harvest/clear/plant/
/// fertilize/upgrade whatever the survey found, gated by the account's
/// automation flags and the cross-account rate limiter.
async fn do_farm_operation(shared: &Arc<Shared>, session: &GatewaySession) -> Result<(), EngineError> {
    let lease = shared.rate_limiter.acquire(&shared.account.id, false, Some(shared.account.id.as_str())).await?;
    let reply = farm::all_lands(session).await?;
    drop(lease);

    let now_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let survey = farm::analyze_lands(&reply.lands, now_secs);

    let (automation, strategy, preferred_seed_id) = {
        let s = shared.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        (s.automation, s.strategy, s.preferred_seed_id)
    };

    let mut harvested_any = false;
    if !survey.ready_to_harvest.is_empty() {
        let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
        farm::harvest(session, survey.ready_to_harvest.clone(), 0, false).await?;
        drop(lease);
        bump(shared, |c| c.harvest += survey.ready_to_harvest.len() as u64);
        harvested_any = true;
    }

    if !survey.needs_water.is_empty() {
        let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
        farm::water_land(session, survey.needs_water.clone(), 0).await?;
        drop(lease);
        bump(shared, |c| c.water += survey.needs_water.len() as u64);
    }

    if !survey.needs_weed.is_empty() {
        let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
        farm::weed_out(session, survey.needs_weed.clone(), 0).await?;
        drop(lease);
        bump(shared, |c| c.weed += survey.needs_weed.len() as u64);
    }

    if !survey.needs_bug.is_empty() {
        let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
        farm::insecticide(session, survey.needs_bug.clone(), 0).await?;
        drop(lease);
        bump(shared, |c| c.bug += survey.needs_bug.len() as u64);
    }

    if automation.land_upgrade {
        for land_id in &survey.upgradeable {
            let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
            farm::upgrade_land(session, *land_id).await?;
            drop(lease);
            bump(shared, |c| c.upgrade += 1);
        }
        for land_id in &survey.unlockable {
            let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
            farm::unlock_land(session, *land_id).await?;
            drop(lease);
        }
    }

    if automation.farm {
        // Dead and just-harvested lands are unconditionally re-queued for
        // planting regardless of whether the server actually needed the
        // remove-plant call; its errors are ignored.
        let mut to_clear: Vec<i64> = survey.dead.clone();
        if harvested_any {
            to_clear.extend(survey.ready_to_harvest.iter().copied());
        }
        for &land_id in &to_clear {
            let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
            let _ = farm::remove_plant(session, land_id).await;
            drop(lease);
        }

        let mut plant_targets = to_clear;
        for &land_id in &survey.empty {
            if !plant_targets.contains(&land_id) {
                plant_targets.push(land_id);
            }
        }

        if !plant_targets.is_empty() {
            let level = shared.session_state.read().unwrap_or_else(|poisoned| poisoned.into_inner()).current.level;
            if let Some(seed_id) = farm::choose_seed(&shared.config, strategy, preferred_seed_id, level, 1) {
                let lease = shared.rate_limiter.acquire(&shared.account.id, false, None).await?;
                let bag = warehouse::get_bag(session).await;
                drop(lease);
                let stock = bag.as_ref().map(|b| warehouse::seed_stock(b, seed_id as i64)).unwrap_or(0);
                let needed = plant_targets.len() as i64;

                if stock < needed {
                    let mut buy_count = 0i64;
                    let lease = shared.rate_limiter.acquire(&shared.account.id, false, None).await?;
                    let shop = farm::shop_info(session).await;
                    drop(lease);
                    if let Ok(shop) = shop {
                        let gold = shared.session_state.read().unwrap_or_else(|poisoned| poisoned.into_inner()).current.gold;
                        let (count, _price) = farm::plan_purchase(&shop.goods, seed_id, stock, needed, gold);
                        buy_count = count;
                        if buy_count > 0 {
                            let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
                            let bought = farm::buy_goods(session, seed_id as i64, buy_count).await;
                            drop(lease);
                            if bought.is_err() {
                                buy_count = 0;
                            }
                        }
                    }
                    plant_targets.truncate((stock + buy_count).max(0) as usize);
                }

                for land_id in plant_targets {
                    let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
                    farm::plant(session, land_id, seed_id as i64).await?;
                    drop(lease);
                    bump(shared, |c| c.plant += 1);
                }
            }
        }
    }

    if automation.fertilizer != FertilizerMode::None {
        let item_ids = fertilizer_item_ids(automation.fertilizer);
        for &land_id in &survey.unlocked.iter().map(|l| l.id).collect::<Vec<_>>() {
            let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
            let result = farm::fertilize(session, land_id, &item_ids).await;
            drop(lease);
            if result.is_ok() {
                bump(shared, |c| c.fertilize += 1);
            }
        }
    }

    if automation.task {
        let lease = shared.rate_limiter.acquire(&shared.account.id, false, None).await?;
        let task_info = task::get_task_info(session).await?;
        drop(lease);
        if let Some(info) = task_info.task_info {
            let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
            let claimed = task::check_and_claim_tasks(session, &info).await?;
            drop(lease);
            bump(shared, |c| c.task_claim += claimed as u64);
        }
    }

    if harvested_any && automation.sell {
        let lease = shared.rate_limiter.acquire(&shared.account.id, false, None).await?;
        let bag = warehouse::get_bag(session).await?;
        drop(lease);
        let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
        warehouse::sell_all_fruits(session, &shared.config, &bag).await?;
        drop(lease);
        bump(shared, |c| c.sell += 1);
    }

    Ok(())
}

/// Both a normal and an organic fertilizer item are tried in order when
/// the mode is `Both`, matching the dual-write-path fallback the original
/// relies on when one kind is rejected for the plant's current phase.
fn fertilizer_item_ids(mode: FertilizerMode) -> Vec<i64> {
    const NORMAL_FERTILIZER_ITEM_ID: i64 = 60001;
    const ORGANIC_FERTILIZER_ITEM_ID: i64 = 60002;
    match mode {
        FertilizerMode::Both => vec![NORMAL_FERTILIZER_ITEM_ID, ORGANIC_FERTILIZER_ITEM_ID],
        FertilizerMode::Normal => vec![NORMAL_FERTILIZER_ITEM_ID],
        FertilizerMode::Organic => vec![ORGANIC_FERTILIZER_ITEM_ID],
        FertilizerMode::None => vec![],
    }
}

/// The friend phase: enumerate friends, visit each, and apply whichever
/// interactions the account's automation flags allow before leaving.
async fn auto_friend_cycle(shared: &Arc<Shared>, session: &GatewaySession) -> Result<(), EngineError> {
    {
        let mut limits = shared.friend_limits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        limits.check_and_reset(&today_date_string());
    }

    let lease = shared.rate_limiter.acquire(&shared.account.id, false, None).await?;
    let roster = friend::get_all(session).await?;
    drop(lease);

    let (steal, help, bad) = {
        let s = shared.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        (s.automation.friend_steal, s.automation.friend_help, s.automation.friend_bad)
    };
    let self_gid = shared.session_state.read().unwrap_or_else(|poisoned| poisoned.into_inner()).current.gid;

    for friend_entry in friend::get_friends_list(&roster) {
        let lease = shared.rate_limiter.acquire(&shared.account.id, true, None).await?;
        let entered = friend::enter(session, friend_entry.gid).await;
        drop(lease);
        let Ok(entered) = entered else { continue };

        let survey = friend::analyze_friend_lands(self_gid, &entered.lands);

        if steal && !survey.stealable.is_empty() {
            let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
            let outcome = run_friend_operation(shared, session, friend_entry.gid, friend::FriendOp::Steal, survey.stealable.clone()).await;
            drop(lease);
            if outcome.is_ok() {
                bump(shared, |c| c.steal += survey.stealable.len() as u64);
            }
        }
        if help {
            if !survey.need_water.is_empty() {
                let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
                let _ = run_friend_operation(shared, session, friend_entry.gid, friend::FriendOp::Water, survey.need_water.clone()).await;
                drop(lease);
                bump(shared, |c| c.help_water += survey.need_water.len() as u64);
            }
            if !survey.need_weed.is_empty() {
                let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
                let _ = run_friend_operation(shared, session, friend_entry.gid, friend::FriendOp::Weed, survey.need_weed.clone()).await;
                drop(lease);
                bump(shared, |c| c.help_weed += survey.need_weed.len() as u64);
            }
            if !survey.need_bug.is_empty() {
                let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
                let _ = run_friend_operation(shared, session, friend_entry.gid, friend::FriendOp::Bug, survey.need_bug.clone()).await;
                drop(lease);
                bump(shared, |c| c.help_bug += survey.need_bug.len() as u64);
            }
        }
        if bad {
            let mut targets = survey.can_put_weed.clone();
            for land_id in &survey.can_put_bug {
                if !targets.contains(land_id) {
                    targets.push(*land_id);
                }
            }
            if !targets.is_empty() {
                let lease = shared.rate_limiter.acquire(&shared.account.id, true, Some(shared.account.id.as_str())).await?;
                let _ = run_friend_operation(shared, session, friend_entry.gid, friend::FriendOp::Bad, targets).await;
                drop(lease);
            }
        }

        let lease = shared.rate_limiter.acquire(&shared.account.id, true, None).await?;
        let _ = friend::leave(session, friend_entry.gid).await;
        drop(lease);
    }

    info!(account_id = %shared.account.id, "friend cycle complete");
    Ok(())
}

/// Thin wrapper around [`friend::do_friend_operation`] that feeds it the
/// account's quota table and merges the reply's limit rows straight back
/// in, so the table stays current whether or not the cycle reads it
/// again this pass.
async fn run_friend_operation(
    shared: &Arc<Shared>,
    session: &GatewaySession,
    host_gid: i64,
    op: friend::FriendOp,
    land_ids: Vec<i64>,
) -> Result<friend::FriendOperationOutcome, EngineError> {
    let limits_snapshot = shared.friend_limits.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();
    let outcome = friend::do_friend_operation(session, host_gid, op, land_ids, &limits_snapshot).await?;
    let rows = friend::operation_limits_of(&outcome);
    if !rows.is_empty() {
        shared.friend_limits.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).merge(&rows);
    }
    Ok(outcome)
}

fn bump(shared: &Arc<Shared>, f: impl FnOnce(&mut OperationCounters)) {
    let mut counters = shared.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut counters);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_of_day_parses_hh_mm() {
        assert_eq!(minutes_of_day("23:30"), 23 * 60 + 30);
        assert_eq!(minutes_of_day("00:00"), 0);
    }

    #[test]
    fn quiet_hours_window_wraps_past_midnight() {
        assert!(is_within_quiet_hours("23:00", "07:00", 23 * 60 + 30));
        assert!(is_within_quiet_hours("23:00", "07:00", 3 * 60));
        assert!(!is_within_quiet_hours("23:00", "07:00", 12 * 60));
    }

    #[test]
    fn quiet_hours_window_within_a_single_day() {
        assert!(is_within_quiet_hours("12:00", "14:00", 13 * 60));
        assert!(!is_within_quiet_hours("12:00", "14:00", 15 * 60));
    }

    #[test]
    fn identical_start_and_end_means_always_quiet() {
        assert!(is_within_quiet_hours("09:00", "09:00", 9 * 60));
        assert!(is_within_quiet_hours("09:00", "09:00", 0));
        assert!(is_within_quiet_hours("09:00", "09:00", 23 * 60 + 59));
    }

    #[test]
    fn jittered_interval_stays_within_bounds() {
        for _ in 0..50 {
            let d = jittered_interval(60, 180);
            assert!(d.as_secs() >= 60 && d.as_secs() <= 180);
        }
    }

    #[test]
    fn jittered_interval_handles_degenerate_range() {
        assert_eq!(jittered_interval(100, 100), Duration::from_secs(100));
        assert_eq!(jittered_interval(200, 50), Duration::from_secs(200));
    }

    #[test]
    fn fertilizer_item_ids_both_tries_normal_then_organic() {
        assert_eq!(fertilizer_item_ids(FertilizerMode::Both), vec![60001, 60002]);
        assert_eq!(fertilizer_item_ids(FertilizerMode::None), Vec::<i64>::new());
    }

    #[test]
    fn today_date_string_is_well_formed() {
        let s = today_date_string();
        assert_eq!(s.len(), 10);
        assert_eq!(s.as_bytes()[4], b'-');
        assert_eq!(s.as_bytes()[7], b'-');
    }

    #[test]
    fn civil_from_days_matches_known_epoch_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19723), (2023, 12, 25));
    }
}
