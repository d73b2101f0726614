// tests/outreach_pipeline_tests.rs
//
// Trigger firings land in the queue; the processor drains it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;

use livespot_common::models::{OutreachStatus, PlatformSession, RegisteredCast, TriggerContext, TriggerType};
use livespot_core::config::{EvaluatorCaps, OutreachConfig};
use livespot_core::outreach::{Halt, OutreachApi, OutreachProcessor, SendReceipt};
use livespot_core::store::MemoryStore;
use livespot_core::test_utils::helpers::sample_trigger;
use livespot_core::test_utils::MemoryRepos;
use livespot_core::triggers::{TriggerEngine, TriggerRepos, TriggerState};
use livespot_core::Error;

mock! {
    pub Api {}

    #[async_trait]
    impl OutreachApi for Api {
        async fn resolve_user_id(&self, session: &PlatformSession, user_name: &str) -> Result<Option<String>, Error>;

        async fn send_message(
            &self,
            session: &PlatformSession,
            target_user_id: &str,
            target_user_name: &str,
            message: &str,
        ) -> Result<SendReceipt, Error>;
    }
}

const ACCOUNT: &str = "acct-1";
const OTHER_ACCOUNT: &str = "acct-2";
const CAST: &str = "risa";

fn config(test_mode: bool, daily_limit: i64) -> OutreachConfig {
    OutreachConfig {
        test_mode,
        whitelist: vec!["pi_".to_string()],
        send_interval: Duration::ZERO,
        daily_limit,
        user_cooldown_hours: 24,
        poll_interval: Duration::from_secs(10),
        batch_size: 20,
        max_attempts: 3,
    }
}

fn login(repos: &MemoryRepos, account_id: &str, platform_user_id: &str) {
    repos.set_platform_session(PlatformSession {
        account_id: account_id.to_string(),
        platform_user_id: platform_user_id.to_string(),
        session_cookie: "sess".to_string(),
        csrf_token: Some("csrf".to_string()),
        cookies: BTreeMap::new(),
    });
    repos.add_cast(RegisteredCast {
        account_id: account_id.to_string(),
        cast_name: CAST.to_string(),
        platform_user_id: Some(platform_user_id.to_string()),
        is_active: true,
    });
}

fn engine(repos: &Arc<MemoryRepos>) -> TriggerEngine {
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

/// Queues one trigger DM per user and moves the rows past the grace period.
async fn queue_via_trigger(repos: &Arc<MemoryRepos>, account_id: &str, users: &[&str]) {
    let engine = engine(repos);
    let trigger = sample_trigger(account_id, TriggerType::FirstVisit);
    for user in users {
        engine
            .fire_trigger(&trigger, &TriggerContext::new(account_id, CAST, user))
            .await;
    }
    for record in repos.outreach_records() {
        repos.backdate_outreach(record.id, Utc::now() - chrono::Duration::minutes(5));
    }
}

fn echo_api() -> MockApi {
    let mut api = MockApi::new();
    api.expect_resolve_user_id()
        .returning(|_, user| Ok(Some(format!("id-{}", user))));
    api.expect_send_message()
        .returning(|_, target, _, _| Ok(SendReceipt { message_id: Some(format!("msg-{}", target)) }));
    api
}

fn status_of(repos: &MemoryRepos, user: &str) -> OutreachStatus {
    repos
        .outreach_records()
        .into_iter()
        .find(|r| r.user_name == user)
        .map(|r| r.status)
        .unwrap()
}

#[tokio::test]
async fn test_mode_sends_only_to_whitelist() {
    let repos = Arc::new(MemoryRepos::new());
    login(&repos, ACCOUNT, "100");
    queue_via_trigger(&repos, ACCOUNT, &["pi_", "stranger"]).await;

    let processor = OutreachProcessor::new(repos.clone(), repos.clone(), Arc::new(echo_api()), &config(true, 100));
    let summary = processor.process_batch().await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.blocked, 1);
    assert_eq!(status_of(&repos, "pi_"), OutreachStatus::Success);
    assert_eq!(status_of(&repos, "stranger"), OutreachStatus::BlockedTestMode);
}

#[tokio::test]
async fn live_mode_sends_everything_queued() {
    let repos = Arc::new(MemoryRepos::new());
    login(&repos, ACCOUNT, "100");
    queue_via_trigger(&repos, ACCOUNT, &["pi_", "stranger"]).await;

    let processor = OutreachProcessor::new(repos.clone(), repos.clone(), Arc::new(echo_api()), &config(false, 100));
    let summary = processor.process_batch().await.unwrap();

    assert_eq!(summary.sent, 2);
    let record = repos.outreach_records().into_iter().find(|r| r.user_name == "stranger").unwrap();
    assert_eq!(record.target_user_id.as_deref(), Some("id-stranger"));
    assert_eq!(processor.queue_count(ACCOUNT).await.unwrap(), 0);
}

#[tokio::test]
async fn second_batch_finds_nothing_left() {
    let repos = Arc::new(MemoryRepos::new());
    login(&repos, ACCOUNT, "100");
    queue_via_trigger(&repos, ACCOUNT, &["pi_"]).await;

    let processor = OutreachProcessor::new(repos.clone(), repos.clone(), Arc::new(echo_api()), &config(true, 100));
    assert_eq!(processor.process_batch().await.unwrap().sent, 1);
    let again = processor.process_batch().await.unwrap();
    assert_eq!(again.fetched, 0);
    assert!(again.is_idle());
}

#[tokio::test]
async fn daily_cap_counts_earlier_sends_today() {
    let repos = Arc::new(MemoryRepos::new());
    login(&repos, ACCOUNT, "100");
    repos.add_sent(ACCOUNT, CAST, "someone_else", Utc::now());
    queue_via_trigger(&repos, ACCOUNT, &["pi_"]).await;

    let processor = OutreachProcessor::new(repos.clone(), repos.clone(), Arc::new(MockApi::new()), &config(true, 1));
    let summary = processor.process_batch().await.unwrap();

    assert_eq!(summary.sent, 0);
    assert_eq!(summary.halted.get(ACCOUNT), Some(&Halt::DailyLimit));
    assert_eq!(status_of(&repos, "pi_"), OutreachStatus::Queued);
}

#[tokio::test]
async fn halt_on_one_account_leaves_others_running() {
    let repos = Arc::new(MemoryRepos::new());
    login(&repos, OTHER_ACCOUNT, "200");
    queue_via_trigger(&repos, ACCOUNT, &["pi_"]).await;
    queue_via_trigger(&repos, OTHER_ACCOUNT, &["pi_"]).await;

    let processor = OutreachProcessor::new(repos.clone(), repos.clone(), Arc::new(echo_api()), &config(false, 100));
    let summary = processor.process_batch().await.unwrap();

    assert_eq!(summary.halted.get(ACCOUNT), Some(&Halt::NoSession));
    assert_eq!(summary.sent, 1);
    let statuses: Vec<(String, OutreachStatus)> = repos
        .outreach_records()
        .into_iter()
        .map(|r| (r.account_id, r.status))
        .collect();
    assert!(statuses.contains(&(ACCOUNT.to_string(), OutreachStatus::Queued)));
    assert!(statuses.contains(&(OTHER_ACCOUNT.to_string(), OutreachStatus::Success)));
}

#[tokio::test]
async fn wrong_session_identity_fails_the_account_batch() {
    let repos = Arc::new(MemoryRepos::new());
    login(&repos, ACCOUNT, "100");
    repos.set_platform_session(PlatformSession {
        account_id: ACCOUNT.to_string(),
        platform_user_id: "999".to_string(),
        session_cookie: "sess".to_string(),
        csrf_token: None,
        cookies: BTreeMap::new(),
    });
    queue_via_trigger(&repos, ACCOUNT, &["pi_", "stranger"]).await;

    let processor = OutreachProcessor::new(repos.clone(), repos.clone(), Arc::new(MockApi::new()), &config(false, 100));
    let summary = processor.process_batch().await.unwrap();

    assert_eq!(summary.sent, 0);
    assert_eq!(summary.errors, 2);
    assert!(matches!(summary.halted.get(ACCOUNT), Some(Halt::IdentityMismatch(_))));
    assert!(repos.outreach_records().iter().all(|r| r.status == OutreachStatus::Error));
}
