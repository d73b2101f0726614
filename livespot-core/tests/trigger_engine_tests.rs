// tests/trigger_engine_tests.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Map};
use uuid::Uuid;

use livespot_common::models::{
    ActionTaken, ActionType, MessageKind, NormalizedMessage, NormalizedViewer, RegisteredCast, SegmentMember,
    SpyProfileRow, Trigger, TriggerContext, TriggerLogEntry, TriggerType,
};
use livespot_common::traits::EventRepository;
use livespot_core::config::EvaluatorCaps;
use livespot_core::store::MemoryStore;
use livespot_core::test_utils::helpers::{hours_ago, sample_trigger};
use livespot_core::test_utils::MemoryRepos;
use livespot_core::triggers::evaluators::post_session;
use livespot_core::triggers::{TriggerEngine, TriggerRepos, TriggerState};

const ACCOUNT: &str = "acct-1";
const CAST: &str = "alice";

fn build_engine(repos: &Arc<MemoryRepos>) -> TriggerEngine {
    TriggerEngine::new(
        TriggerRepos {
            triggers: repos.clone(),
            outreach: repos.clone(),
            profiles: repos.clone(),
            casts: repos.clone(),
        },
        TriggerState {
            known_viewers: MemoryStore::shared(),
            segment_snapshots: MemoryStore::shared(),
        },
        EvaluatorCaps::default(),
    )
}

fn fired_log(trigger: &Trigger, user: &str, at: chrono::DateTime<Utc>) -> TriggerLogEntry {
    TriggerLogEntry {
        trigger_id: trigger.id,
        account_id: ACCOUNT.to_string(),
        cast_name: CAST.to_string(),
        user_name: user.to_string(),
        action_taken: ActionTaken::DmQueued,
        outreach_id: None,
        enrollment_id: None,
        error_message: None,
        metadata: json!({}),
        triggered_at: at,
    }
}

fn profile(user: &str, total_tokens: i64, last_seen_days: i64) -> SpyProfileRow {
    SpyProfileRow {
        user_name: user.to_string(),
        cast_name: CAST.to_string(),
        total_tokens,
        message_count: 1,
        last_seen: Some(Utc::now() - Duration::days(last_seen_days)),
    }
}

fn viewer(name: &str) -> NormalizedViewer {
    NormalizedViewer {
        user_name: name.to_string(),
        user_id: format!("id-{}", name),
        league: "gold".to_string(),
        level: 10,
        is_fan_club: false,
        is_new: false,
    }
}

fn tip(user: &str, tokens: i64, session_id: Uuid) -> NormalizedMessage {
    NormalizedMessage {
        account_id: ACCOUNT.to_string(),
        cast_name: CAST.to_string(),
        message_time: Utc::now(),
        kind: MessageKind::Tip,
        user_name: user.to_string(),
        message: String::new(),
        tokens,
        is_vip: false,
        session_id: Some(session_id),
        user_league: None,
        user_level: None,
        metadata: Map::new(),
    }
}

#[tokio::test]
async fn direct_dm_is_queued_with_rendered_template() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    let trigger = sample_trigger(ACCOUNT, TriggerType::FirstVisit);

    let action = engine
        .fire_trigger(&trigger, &TriggerContext::new(ACCOUNT, CAST, "bob"))
        .await;
    assert_eq!(action, ActionTaken::DmQueued);

    let records = repos.outreach_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "Hi bob, thanks for visiting alice!");
    assert_eq!(records[0].campaign.as_deref(), Some(trigger.campaign_tag().as_str()));
    assert!(records[0].campaign.as_deref().unwrap().starts_with("trigger_first_visit_"));

    let logs = repos.trigger_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action_taken, ActionTaken::DmQueued);
    assert_eq!(logs[0].outreach_id, Some(records[0].id));
}

#[tokio::test]
async fn empty_template_falls_back_to_default() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    let mut trigger = sample_trigger(ACCOUNT, TriggerType::FirstVisit);
    trigger.message_template = Some("   ".to_string());

    engine.fire_trigger(&trigger, &TriggerContext::new(ACCOUNT, CAST, "bob")).await;
    assert_eq!(repos.outreach_records()[0].message, "Hi bob!");
}

#[tokio::test]
async fn recent_firing_puts_user_in_cooldown() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    let mut trigger = sample_trigger(ACCOUNT, TriggerType::FirstVisit);
    repos.add_trigger_log(fired_log(&trigger, "bob", hours_ago(2)));

    let ctx = TriggerContext::new(ACCOUNT, CAST, "bob");
    assert_eq!(engine.fire_trigger(&trigger, &ctx).await, ActionTaken::SkippedCooldown);
    assert!(repos.outreach_records().is_empty());

    trigger.cooldown_hours = 1;
    assert_eq!(engine.fire_trigger(&trigger, &ctx).await, ActionTaken::DmQueued);
}

#[tokio::test]
async fn cooldown_is_per_user() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    let trigger = sample_trigger(ACCOUNT, TriggerType::FirstVisit);
    repos.add_trigger_log(fired_log(&trigger, "bob", hours_ago(1)));

    let action = engine
        .fire_trigger(&trigger, &TriggerContext::new(ACCOUNT, CAST, "carol"))
        .await;
    assert_eq!(action, ActionTaken::DmQueued);
}

#[tokio::test]
async fn daily_limit_skips_the_rest_of_the_batch() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    let mut trigger = sample_trigger(ACCOUNT, TriggerType::FirstVisit);
    trigger.daily_limit = 2;

    let result = livespot_core::triggers::evaluators::EvaluationResult::capped(
        ["u1", "u2", "u3", "u4"]
            .iter()
            .map(|u| TriggerContext::new(ACCOUNT, CAST, u))
            .collect(),
        50,
    );
    let outcomes = engine.fire_all(&trigger, result).await;
    assert_eq!(
        outcomes,
        vec![
            ActionTaken::DmQueued,
            ActionTaken::DmQueued,
            ActionTaken::SkippedDailyLimit,
            ActionTaken::SkippedDailyLimit,
        ]
    );
    assert_eq!(repos.outreach_records().len(), 2);
    assert_eq!(repos.trigger_logs().len(), 4);
}

#[tokio::test]
async fn checks_run_cooldown_then_limit_then_segment() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    let mut trigger = sample_trigger(ACCOUNT, TriggerType::SegmentUpgrade);
    trigger.target_segments = vec!["S1".to_string()];
    trigger.daily_limit = 0;
    repos.add_trigger_log(fired_log(&trigger, "bob", hours_ago(1)));

    let mut ctx = TriggerContext::new(ACCOUNT, CAST, "bob");
    ctx.segment = Some("S5".to_string());
    assert_eq!(engine.fire_trigger(&trigger, &ctx).await, ActionTaken::SkippedCooldown);

    ctx.user_name = "carol".to_string();
    assert_eq!(engine.fire_trigger(&trigger, &ctx).await, ActionTaken::SkippedDailyLimit);

    trigger.daily_limit = 100;
    assert_eq!(engine.fire_trigger(&trigger, &ctx).await, ActionTaken::SkippedSegment);

    ctx.segment = Some("S1".to_string());
    assert_eq!(engine.fire_trigger(&trigger, &ctx).await, ActionTaken::DmQueued);
}

#[tokio::test]
async fn failed_cooldown_query_does_not_fire() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    repos.fail_cooldown_queries(true);
    let trigger = sample_trigger(ACCOUNT, TriggerType::FirstVisit);

    let action = engine
        .fire_trigger(&trigger, &TriggerContext::new(ACCOUNT, CAST, "bob"))
        .await;
    assert_eq!(action, ActionTaken::SkippedCooldown);
    assert!(repos.outreach_records().is_empty());
}

#[tokio::test]
async fn scenario_enrollment_and_duplicate() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    let scenario = Uuid::new_v4();
    let mut first = sample_trigger(ACCOUNT, TriggerType::FirstVisit);
    first.action_type = ActionType::EnrollScenario;
    first.scenario_id = Some(scenario);
    let mut second = first.clone();
    second.id = Uuid::new_v4();

    let ctx = TriggerContext::new(ACCOUNT, CAST, "bob");
    assert_eq!(engine.fire_trigger(&first, &ctx).await, ActionTaken::ScenarioEnrolled);
    assert_eq!(engine.fire_trigger(&second, &ctx).await, ActionTaken::SkippedDuplicate);

    let logs = repos.trigger_logs();
    assert!(logs[0].enrollment_id.is_some());
    assert!(repos.outreach_records().is_empty());
}

#[tokio::test]
async fn enrollment_without_scenario_is_an_error() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    let mut trigger = sample_trigger(ACCOUNT, TriggerType::FirstVisit);
    trigger.action_type = ActionType::EnrollScenario;

    let action = engine
        .fire_trigger(&trigger, &TriggerContext::new(ACCOUNT, CAST, "bob"))
        .await;
    assert_eq!(action, ActionTaken::Error);
    assert_eq!(repos.trigger_logs()[0].error_message.as_deref(), Some("scenario_id is null"));
}

#[tokio::test]
async fn first_visit_waits_for_warmup() {
    let repos = Arc::new(MemoryRepos::new());
    repos.add_profile(ACCOUNT, profile("regular", 100, 1), true);
    repos.add_trigger(sample_trigger(ACCOUNT, TriggerType::FirstVisit));
    let engine = build_engine(&repos);

    engine.on_viewer_list_update(ACCOUNT, CAST, &[viewer("regular"), viewer("early")]).await;
    engine.increment_warmup();
    engine.on_viewer_list_update(ACCOUNT, CAST, &[viewer("early")]).await;
    engine.increment_warmup();
    assert!(engine.is_warm());
    assert!(repos.outreach_records().is_empty());

    engine
        .on_viewer_list_update(ACCOUNT, CAST, &[viewer("regular"), viewer("early"), viewer("newbie")])
        .await;
    let records = repos.outreach_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_name, "newbie");

    // Already recorded, so the next poll stays quiet.
    engine.on_viewer_list_update(ACCOUNT, CAST, &[viewer("newbie")]).await;
    assert_eq!(repos.outreach_records().len(), 1);
}

#[tokio::test]
async fn first_visit_respects_cast_scope() {
    let repos = Arc::new(MemoryRepos::new());
    let mut trigger = sample_trigger(ACCOUNT, TriggerType::FirstVisit);
    trigger.cast_name = Some("other_cast".to_string());
    repos.add_trigger(trigger);
    let engine = build_engine(&repos);
    engine.on_session_start(ACCOUNT, CAST).await;

    engine.on_viewer_list_update(ACCOUNT, CAST, &[viewer("newbie")]).await;
    assert!(repos.outreach_records().is_empty());
}

#[tokio::test]
async fn session_start_ends_warmup() {
    let repos = Arc::new(MemoryRepos::new());
    let engine = build_engine(&repos);
    assert!(!engine.is_warm());
    engine.on_session_start(ACCOUNT, CAST).await;
    assert!(engine.is_warm());
}

async fn seed_finished_session(repos: &MemoryRepos) -> Uuid {
    let session_id = Uuid::new_v4();
    repos
        .upsert_viewers(ACCOUNT, CAST, Some(session_id), &[viewer("carol"), viewer("dave"), viewer("erin")])
        .await
        .unwrap();
    repos
        .insert_messages(&[tip("dave", 60, session_id), tip("dave", 40, session_id)])
        .await
        .unwrap();
    repos.add_profile(ACCOUNT, profile("carol", 5000, 0), true);
    repos.add_profile(ACCOUNT, profile("dave", 3000, 0), true);
    repos.add_profile(ACCOUNT, profile("erin", 10, 0), true);
    session_id
}

#[tokio::test]
async fn session_end_fires_vip_no_tip_and_schedules_post_session() {
    let repos = Arc::new(MemoryRepos::new());
    let session_id = seed_finished_session(&repos).await;
    repos.add_trigger(sample_trigger(ACCOUNT, TriggerType::VipNoTip));
    repos.add_trigger(sample_trigger(ACCOUNT, TriggerType::PostSession));
    let engine = build_engine(&repos);

    engine.on_session_end(ACCOUNT, CAST, Some(session_id)).await;
    let records = repos.outreach_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_name, "carol");
    assert_eq!(engine.pending_post_session(), 1);

    assert_eq!(engine.process_post_session_queue_at(Utc::now()).await, 0);
    assert_eq!(engine.pending_post_session(), 1);

    let due = Utc::now() + Duration::minutes(post_session::DEFAULT_DELAY_MINUTES + 1);
    assert_eq!(engine.process_post_session_queue_at(due).await, 1);
    assert_eq!(engine.pending_post_session(), 0);
    let users: Vec<String> = repos.outreach_records().into_iter().map(|r| r.user_name).collect();
    assert_eq!(users, vec!["carol", "dave"]);
}

#[tokio::test]
async fn session_end_without_session_id_does_nothing() {
    let repos = Arc::new(MemoryRepos::new());
    seed_finished_session(&repos).await;
    repos.add_trigger(sample_trigger(ACCOUNT, TriggerType::VipNoTip));
    repos.add_trigger(sample_trigger(ACCOUNT, TriggerType::PostSession));
    let engine = build_engine(&repos);

    engine.on_session_end(ACCOUNT, CAST, None).await;
    assert!(repos.outreach_records().is_empty());
    assert_eq!(engine.pending_post_session(), 0);
}

#[tokio::test]
async fn post_session_sums_tips_when_totals_fail() {
    let repos = Arc::new(MemoryRepos::new());
    let session_id = seed_finished_session(&repos).await;
    repos.fail_session_totals(true);
    let trigger = sample_trigger(ACCOUNT, TriggerType::PostSession);

    let result = post_session::evaluate(&trigger, ACCOUNT, CAST, Some(session_id), repos.as_ref(), 50)
        .await
        .unwrap();
    assert!(result.should_fire);
    assert_eq!(result.targets.len(), 1);
    assert_eq!(result.targets[0].user_name, "dave");
    assert_eq!(result.targets[0].session_tokens, Some(100));
}

#[tokio::test]
async fn scheduled_churn_risk_targets_dormant_spenders() {
    let repos = Arc::new(MemoryRepos::new());
    repos.add_profile(ACCOUNT, profile("gone", 800, 30), true);
    repos.add_profile(ACCOUNT, profile("recent", 800, 2), true);
    repos.add_profile(ACCOUNT, profile("small", 20, 30), true);
    repos.add_trigger(sample_trigger(ACCOUNT, TriggerType::ChurnRisk));
    let engine = build_engine(&repos);

    engine.evaluate_scheduled().await;
    let users: Vec<String> = repos.outreach_records().into_iter().map(|r| r.user_name).collect();
    assert_eq!(users, vec!["gone"]);
}

#[tokio::test]
async fn segment_upgrade_first_run_only_snapshots() {
    let repos = Arc::new(MemoryRepos::new());
    repos.add_cast(RegisteredCast {
        account_id: ACCOUNT.to_string(),
        cast_name: CAST.to_string(),
        platform_user_id: Some("100".to_string()),
        is_active: true,
    });
    let member = |segment: &str| SegmentMember {
        segment_id: segment.to_string(),
        user_name: "bob".to_string(),
        total_coins: 2500,
    };
    repos.add_segment(ACCOUNT, CAST, member("S5"));
    let mut trigger = sample_trigger(ACCOUNT, TriggerType::SegmentUpgrade);
    trigger.condition_config = json!({ "track_upgrades": ["S5->S4"] });
    trigger.message_template = Some("{username}: {previous_segment} to {segment}".to_string());
    repos.add_trigger(trigger);
    let engine = build_engine(&repos);

    engine.evaluate_scheduled().await;
    assert!(repos.outreach_records().is_empty());

    repos.clear_segments();
    repos.add_segment(ACCOUNT, CAST, member("S4"));
    engine.evaluate_scheduled().await;
    let records = repos.outreach_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "bob: S5 to S4");
}

#[tokio::test]
async fn competitor_outflow_needs_a_cast_for_unseen_users() {
    let repos = Arc::new(MemoryRepos::new());
    repos.add_profile(
        ACCOUNT,
        SpyProfileRow { cast_name: "rival".to_string(), ..profile("whale", 900, 1) },
        false,
    );
    let unscoped = sample_trigger(ACCOUNT, TriggerType::CompetitorOutflow);
    repos.add_trigger(unscoped);
    let engine = build_engine(&repos);
    engine.evaluate_scheduled().await;
    assert!(repos.outreach_records().is_empty());

    let repos = Arc::new(MemoryRepos::new());
    repos.add_profile(
        ACCOUNT,
        SpyProfileRow { cast_name: "rival".to_string(), ..profile("whale", 900, 1) },
        false,
    );
    let mut scoped = sample_trigger(ACCOUNT, TriggerType::CompetitorOutflow);
    scoped.cast_name = Some(CAST.to_string());
    repos.add_trigger(scoped);
    let engine = build_engine(&repos);
    engine.evaluate_scheduled().await;
    let records = repos.outreach_records();
    assert_eq!(records.len(), 1);
    assert_eq!((records[0].user_name.as_str(), records[0].cast_name.as_str()), ("whale", CAST));
}

#[tokio::test]
async fn cross_promotion_suggests_the_unvisited_cast() {
    let repos = Arc::new(MemoryRepos::new());
    for cast in ["alice", "bella"] {
        repos.add_cast(RegisteredCast {
            account_id: ACCOUNT.to_string(),
            cast_name: cast.to_string(),
            platform_user_id: None,
            is_active: true,
        });
    }
    repos.add_profile(ACCOUNT, SpyProfileRow { message_count: 5, ..profile("fan", 100, 1) }, true);
    repos.add_trigger(sample_trigger(ACCOUNT, TriggerType::CrossPromotion));
    let engine = build_engine(&repos);

    engine.evaluate_scheduled().await;
    let records = repos.outreach_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cast_name, "bella");
}

#[tokio::test]
async fn disabled_triggers_are_not_loaded() {
    let repos = Arc::new(MemoryRepos::new());
    let mut trigger = sample_trigger(ACCOUNT, TriggerType::ChurnRisk);
    trigger.enabled = false;
    repos.add_trigger(trigger);
    repos.add_trigger(sample_trigger(ACCOUNT, TriggerType::FirstVisit));
    let engine = build_engine(&repos);

    assert_eq!(engine.refresh_triggers(true).await.unwrap(), 1);
    assert!(engine.triggers_for(TriggerType::ChurnRisk, Some(ACCOUNT), None).await.is_empty());
}
