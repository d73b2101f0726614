//! Trigger engine: loads configured triggers, runs the evaluators at the
//! right moments and turns their targets into queued outreach or scenario
//! enrollments, subject to cooldown, daily-limit and segment checks.

pub mod cooldown;
pub mod evaluators;
pub mod template;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use livespot_common::models::{
    ActionTaken, ActionType, NewOutreachRecord, NormalizedViewer, Trigger, TriggerContext,
    TriggerLogEntry, TriggerType,
};
use livespot_common::traits::{CastRepository, OutreachRepository, ProfileRepository, TriggerRepository};
use crate::config::EvaluatorCaps;
use crate::store::KeyedStore;
use crate::Error;
use self::evaluators::{
    churn_risk, competitor_outflow, cross_promotion, post_session, vip_no_tip, EvaluationResult,
    FirstVisitEvaluator, SegmentUpgradeEvaluator,
};
use self::template::{render_template, DEFAULT_TEMPLATE};

pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const WARMUP_CYCLES: u32 = 2;

/// Storage the engine reads from and writes to.
#[derive(Clone)]
pub struct TriggerRepos {
    pub triggers: Arc<dyn TriggerRepository>,
    pub outreach: Arc<dyn OutreachRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub casts: Arc<dyn CastRepository>,
}

/// In-memory state the engine keeps between calls.
pub struct TriggerState {
    pub known_viewers: Arc<dyn KeyedStore<String, HashSet<String>>>,
    pub segment_snapshots: Arc<dyn KeyedStore<String, HashMap<String, String>>>,
}

#[derive(Default)]
struct TriggerCache {
    triggers: Vec<Trigger>,
    loaded_at: Option<Instant>,
}

#[derive(Debug, Clone)]
struct PendingPostSession {
    trigger: Trigger,
    targets: Vec<TriggerContext>,
    fire_at: DateTime<Utc>,
}

pub struct TriggerEngine {
    repos: TriggerRepos,
    caps: EvaluatorCaps,
    first_visit: FirstVisitEvaluator,
    segment_upgrade: SegmentUpgradeEvaluator,
    cache: RwLock<TriggerCache>,
    warmup: AtomicU32,
    post_session_queue: Mutex<Vec<PendingPostSession>>,
}

impl TriggerEngine {
    pub fn new(repos: TriggerRepos, state: TriggerState, caps: EvaluatorCaps) -> Self {
        Self {
            repos,
            caps,
            first_visit: FirstVisitEvaluator::new(state.known_viewers),
            segment_upgrade: SegmentUpgradeEvaluator::new(state.segment_snapshots),
            cache: RwLock::new(TriggerCache::default()),
            warmup: AtomicU32::new(0),
            post_session_queue: Mutex::new(Vec::new()),
        }
    }

    /// Reloads enabled triggers when the cache is stale or empty.
    pub async fn refresh_triggers(&self, force: bool) -> Result<usize, Error> {
        {
            let cache = self.cache.read().await;
            let fresh = cache.loaded_at.map(|at| at.elapsed() < CACHE_TTL).unwrap_or(false);
            if fresh && !cache.triggers.is_empty() && !force {
                return Ok(cache.triggers.len());
            }
        }
        let mut loaded: Vec<Trigger> = self
            .repos
            .triggers
            .list_enabled_triggers()
            .await?
            .into_iter()
            .filter(|t| t.enabled)
            .collect();
        loaded.sort_by_key(|t| t.priority);

        let mut cache = self.cache.write().await;
        cache.triggers = loaded;
        cache.loaded_at = Some(Instant::now());
        info!("[Trigger] loaded {} active triggers", cache.triggers.len());
        Ok(cache.triggers.len())
    }

    async fn ensure_loaded(&self) {
        if let Err(e) = self.refresh_triggers(false).await {
            error!("[Trigger] failed to load triggers: {}", e);
        }
    }

    /// Enabled triggers of one type, optionally scoped to an account and cast.
    /// A trigger without a cast scope matches every cast.
    pub async fn triggers_for(
        &self,
        trigger_type: TriggerType,
        account_id: Option<&str>,
        cast_name: Option<&str>,
    ) -> Vec<Trigger> {
        let cache = self.cache.read().await;
        cache
            .triggers
            .iter()
            .filter(|t| t.trigger_type == trigger_type)
            .filter(|t| account_id.map_or(true, |a| t.account_id == a))
            .filter(|t| match (cast_name, t.cast_name.as_deref()) {
                (Some(c), Some(scope)) => c == scope,
                _ => true,
            })
            .cloned()
            .collect()
    }

    pub fn increment_warmup(&self) {
        let before = self
            .warmup
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < WARMUP_CYCLES).then_some(n + 1));
        if before == Ok(WARMUP_CYCLES - 1) {
            info!("[Trigger] warmup complete, event triggers active");
        }
    }

    pub fn is_warm(&self) -> bool {
        self.warmup.load(Ordering::SeqCst) >= WARMUP_CYCLES
    }

    /// Viewer-list poll hook. During warmup the list only seeds the known set.
    pub async fn on_viewer_list_update(&self, account_id: &str, cast_name: &str, viewers: &[NormalizedViewer]) {
        let names: Vec<String> = viewers.iter().map(|v| v.user_name.clone()).collect();
        let fresh = self
            .first_visit
            .detect_new(account_id, cast_name, &names, self.repos.profiles.as_ref())
            .await;
        if !self.is_warm() {
            debug!("[Trigger] warmup: seeded {} viewers at {}", fresh.len(), cast_name);
            return;
        }
        if fresh.is_empty() {
            return;
        }

        self.ensure_loaded().await;
        for trigger in self.triggers_for(TriggerType::FirstVisit, Some(account_id), Some(cast_name)).await {
            let result = FirstVisitEvaluator::targets(account_id, cast_name, &fresh, self.caps.first_visit);
            self.fire_all(&trigger, result).await;
        }
    }

    /// A cast went live: reload its known viewers and end the warmup.
    pub async fn on_session_start(&self, account_id: &str, cast_name: &str) {
        self.first_visit
            .initialize(account_id, cast_name, self.repos.profiles.as_ref())
            .await;
        self.warmup.store(WARMUP_CYCLES, Ordering::SeqCst);
    }

    /// A cast went offline: vip_no_tip fires now, post_session is scheduled.
    pub async fn on_session_end(&self, account_id: &str, cast_name: &str, session_id: Option<Uuid>) {
        self.ensure_loaded().await;
        let profiles = self.repos.profiles.as_ref();

        for trigger in self.triggers_for(TriggerType::VipNoTip, Some(account_id), Some(cast_name)).await {
            match vip_no_tip::evaluate(&trigger, account_id, cast_name, session_id, profiles, self.caps.vip_no_tip).await {
                Ok(result) => {
                    self.fire_all(&trigger, result).await;
                }
                Err(e) => error!("[Trigger] vip_no_tip evaluation failed: {}", e),
            }
        }

        for trigger in self.triggers_for(TriggerType::PostSession, Some(account_id), Some(cast_name)).await {
            match post_session::evaluate(&trigger, account_id, cast_name, session_id, profiles, self.caps.post_session).await {
                Ok(result) if result.should_fire => {
                    let delay = post_session::delay_minutes(&trigger);
                    info!(
                        "[Trigger] post_session: {} DMs for {} scheduled in {}min",
                        result.targets.len(),
                        cast_name,
                        delay
                    );
                    self.post_session_queue.lock().push(PendingPostSession {
                        trigger,
                        targets: result.targets,
                        fire_at: Utc::now() + chrono::Duration::minutes(delay),
                    });
                }
                Ok(_) => {}
                Err(e) => error!("[Trigger] post_session evaluation failed: {}", e),
            }
        }
    }

    pub fn pending_post_session(&self) -> usize {
        self.post_session_queue.lock().len()
    }

    /// Fires every delayed post-session batch that is due. Returns targets processed.
    pub async fn process_post_session_queue(&self) -> usize {
        self.process_post_session_queue_at(Utc::now()).await
    }

    pub async fn process_post_session_queue_at(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<PendingPostSession> = {
            let mut queue = self.post_session_queue.lock();
            let (due, later): (Vec<_>, Vec<_>) = queue.drain(..).partition(|p| p.fire_at <= now);
            *queue = later;
            due
        };

        let mut total = 0;
        for item in due {
            total += item.targets.len();
            let result = EvaluationResult {
                should_fire: true,
                targets: item.targets,
                reason: None,
            };
            self.fire_all(&item.trigger, result).await;
        }
        if total > 0 {
            info!("[Trigger] post-session queue: processed {} delayed DMs", total);
        }
        total
    }

    /// Hourly pass over the history-based trigger kinds for every account with triggers.
    pub async fn evaluate_scheduled(&self) {
        self.ensure_loaded().await;
        let accounts: Vec<String> = {
            let cache = self.cache.read().await;
            let mut ids: Vec<String> = cache.triggers.iter().map(|t| t.account_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };

        info!("[Trigger] scheduled evaluation for {} accounts", accounts.len());
        for account_id in &accounts {
            self.evaluate_scheduled_for(account_id).await;
        }
    }

    async fn evaluate_scheduled_for(&self, account_id: &str) {
        let profiles = self.repos.profiles.as_ref();
        let casts = self.repos.casts.as_ref();

        for trigger in self.triggers_for(TriggerType::ChurnRisk, Some(account_id), None).await {
            match churn_risk::evaluate(&trigger, account_id, profiles, self.caps.churn_risk).await {
                Ok(result) => {
                    self.fire_all(&trigger, result).await;
                }
                Err(e) => error!("[Trigger] churn_risk evaluation failed: {}", e),
            }
        }

        let upgrade_triggers = self.triggers_for(TriggerType::SegmentUpgrade, Some(account_id), None).await;
        if !upgrade_triggers.is_empty() {
            match self.segment_upgrade.scan(account_id, casts, profiles).await {
                Ok(Some(transitions)) => {
                    for trigger in &upgrade_triggers {
                        let result = SegmentUpgradeEvaluator::targets_for(
                            trigger,
                            account_id,
                            &transitions,
                            self.caps.segment_upgrade,
                        );
                        self.fire_all(trigger, result).await;
                    }
                }
                Ok(None) => {}
                Err(e) => error!("[Trigger] segment_upgrade scan failed: {}", e),
            }
        }

        for trigger in self.triggers_for(TriggerType::CompetitorOutflow, Some(account_id), None).await {
            match competitor_outflow::evaluate(&trigger, account_id, profiles, self.caps.competitor_outflow).await {
                Ok(result) => {
                    self.fire_all(&trigger, result).await;
                }
                Err(e) => error!("[Trigger] competitor_outflow evaluation failed: {}", e),
            }
        }

        for trigger in self.triggers_for(TriggerType::CrossPromotion, Some(account_id), None).await {
            match cross_promotion::evaluate(&trigger, account_id, casts, profiles, self.caps.cross_promotion).await {
                Ok(result) => {
                    self.fire_all(&trigger, result).await;
                }
                Err(e) => error!("[Trigger] cross_promotion evaluation failed: {}", e),
            }
        }
    }

    /// Runs the firing pipeline over every target. Once the daily limit is hit
    /// the remaining targets are logged as `skipped_daily_limit` without further checks.
    pub async fn fire_all(&self, trigger: &Trigger, result: EvaluationResult) -> Vec<ActionTaken> {
        if !result.should_fire {
            if let Some(reason) = &result.reason {
                debug!("[Trigger] {} did not fire: {}", trigger.name, reason);
            }
            return Vec::new();
        }
        let mut outcomes = Vec::with_capacity(result.targets.len());
        let mut limit_hit = false;
        for ctx in &result.targets {
            let action = if limit_hit {
                self.log_action(trigger, ctx, ActionTaken::SkippedDailyLimit, None, None, None).await;
                ActionTaken::SkippedDailyLimit
            } else {
                self.fire_trigger(trigger, ctx).await
            };
            limit_hit |= action == ActionTaken::SkippedDailyLimit;
            outcomes.push(action);
        }
        outcomes
    }

    /// Cooldown, then daily limit, then segment, then the action itself.
    pub async fn fire_trigger(&self, trigger: &Trigger, ctx: &TriggerContext) -> ActionTaken {
        let repo = self.repos.triggers.as_ref();

        if cooldown::is_in_cooldown(repo, trigger.id, &ctx.user_name, trigger.cooldown_hours).await {
            self.log_action(trigger, ctx, ActionTaken::SkippedCooldown, None, None, None).await;
            return ActionTaken::SkippedCooldown;
        }
        if cooldown::is_daily_limit_reached(repo, trigger.id, trigger.daily_limit).await {
            self.log_action(trigger, ctx, ActionTaken::SkippedDailyLimit, None, None, None).await;
            return ActionTaken::SkippedDailyLimit;
        }
        if !cooldown::is_segment_allowed(&trigger.target_segments, ctx.segment.as_deref()) {
            self.log_action(trigger, ctx, ActionTaken::SkippedSegment, None, None, None).await;
            return ActionTaken::SkippedSegment;
        }

        match trigger.action_type {
            ActionType::DirectDm => self.queue_dm(trigger, ctx).await,
            ActionType::EnrollScenario => self.enroll(trigger, ctx).await,
        }
    }

    async fn queue_dm(&self, trigger: &Trigger, ctx: &TriggerContext) -> ActionTaken {
        let template = trigger
            .message_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TEMPLATE);
        let record = NewOutreachRecord {
            account_id: ctx.account_id.clone(),
            cast_name: ctx.cast_name.clone(),
            user_name: ctx.user_name.clone(),
            message: render_template(template, ctx),
            campaign: trigger.campaign_tag(),
            template_name: Some(trigger.name.clone()),
        };

        match self.repos.outreach.enqueue(&record).await {
            Ok(id) => {
                self.log_action(trigger, ctx, ActionTaken::DmQueued, Some(id), None, None).await;
                info!("[Trigger] [{}] DM queued for {} ({})", trigger.name, ctx.user_name, ctx.cast_name);
                ActionTaken::DmQueued
            }
            Err(e) => {
                error!("[Trigger] DM insert for {} failed: {}", ctx.user_name, e);
                self.log_action(trigger, ctx, ActionTaken::Error, None, None, Some(e.to_string())).await;
                ActionTaken::Error
            }
        }
    }

    async fn enroll(&self, trigger: &Trigger, ctx: &TriggerContext) -> ActionTaken {
        let Some(scenario_id) = trigger.scenario_id else {
            self.log_action(trigger, ctx, ActionTaken::Error, None, None, Some("scenario_id is null".into()))
                .await;
            return ActionTaken::Error;
        };

        match self
            .repos
            .triggers
            .enroll_scenario(scenario_id, &ctx.account_id, &ctx.cast_name, &ctx.user_name)
            .await
        {
            Ok(Some(enrollment)) => {
                self.log_action(trigger, ctx, ActionTaken::ScenarioEnrolled, None, Some(enrollment), None)
                    .await;
                info!("[Trigger] [{}] scenario enrollment for {}", trigger.name, ctx.user_name);
                ActionTaken::ScenarioEnrolled
            }
            Ok(None) => {
                self.log_action(trigger, ctx, ActionTaken::SkippedDuplicate, None, None, None).await;
                ActionTaken::SkippedDuplicate
            }
            Err(e) => {
                error!("[Trigger] scenario enrollment for {} failed: {}", ctx.user_name, e);
                self.log_action(trigger, ctx, ActionTaken::Error, None, None, Some(e.to_string())).await;
                ActionTaken::Error
            }
        }
    }

    async fn log_action(
        &self,
        trigger: &Trigger,
        ctx: &TriggerContext,
        action: ActionTaken,
        outreach_id: Option<i64>,
        enrollment_id: Option<Uuid>,
        error_message: Option<String>,
    ) {
        let entry = TriggerLogEntry {
            trigger_id: trigger.id,
            account_id: ctx.account_id.clone(),
            cast_name: ctx.cast_name.clone(),
            user_name: ctx.user_name.clone(),
            action_taken: action,
            outreach_id,
            enrollment_id,
            error_message,
            metadata: json!({
                "trigger_type": trigger.trigger_type.to_string(),
                "segment": ctx.segment,
                "tokens": ctx.total_tokens.unwrap_or(0),
            }),
            triggered_at: Utc::now(),
        };
        if let Err(e) = self.repos.triggers.insert_trigger_log(&entry).await {
            warn!("[Trigger] log insert failed: {}", e);
        }
    }
}
