// livespot-core/src/outreach/mod.rs
//
// Drains the outreach queue: claim, safety gate, rate limits, send, write back.

pub mod api;
pub mod rate_limiter;
pub mod safety;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use livespot_common::error::SafetyViolation;
use livespot_common::models::{OutreachRecord, OutreachStatus, PlatformSession};
use livespot_common::traits::{CastRepository, OutreachRepository};

use crate::config::OutreachConfig;
use crate::Error;

pub use api::{OutreachApi, SendReceipt, StripchatOutreachApi};
pub use rate_limiter::RateLimiter;
pub use safety::{is_valid_campaign, CastIdentity, SafetyGate};

/// Freshly queued rows are left alone for this long.
pub const QUEUE_GRACE_SECS: i64 = 30;

pub const ERROR_DETAIL_LIMIT: usize = 1000;

pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub const USER_COOLDOWN_DETAIL: &str = "user cooldown";

pub fn truncate_detail(detail: &str) -> String {
    detail.chars().take(ERROR_DETAIL_LIMIT).collect()
}

/// Why the processor stopped working on an account for the rest of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Halt {
    DailyLimit,
    NoSession,
    SessionExpired,
    /// Every remaining row of the account is failed with this detail.
    IdentityMismatch(String),
    /// Session or cast lookups failed; rows stay queued.
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub fetched: usize,
    pub sent: usize,
    pub errors: usize,
    pub blocked: usize,
    pub skipped: usize,
    pub requeued: usize,
    pub halted: HashMap<String, Halt>,
}

impl BatchSummary {
    pub fn is_idle(&self) -> bool {
        self.sent == 0 && self.errors == 0 && self.blocked == 0 && self.requeued == 0
    }
}

struct AccountContext {
    session: Option<PlatformSession>,
    identity: CastIdentity,
}

/// The single outreach sender of a process.
pub struct OutreachProcessor {
    outreach: Arc<dyn OutreachRepository>,
    casts: Arc<dyn CastRepository>,
    api: Arc<dyn OutreachApi>,
    gate: SafetyGate,
    limiter: RateLimiter,
    batch_size: i64,
    max_attempts: i32,
}

impl OutreachProcessor {
    pub fn new(
        outreach: Arc<dyn OutreachRepository>,
        casts: Arc<dyn CastRepository>,
        api: Arc<dyn OutreachApi>,
        config: &OutreachConfig,
    ) -> Self {
        Self {
            outreach,
            casts,
            api,
            gate: SafetyGate::from_config(config),
            limiter: RateLimiter::from_config(config),
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    pub async fn queue_count(&self, account_id: &str) -> Result<i64, Error> {
        self.outreach.queue_count(account_id).await
    }

    /// One poll: fetches up to `batch_size` queued rows past the grace period
    /// and processes them oldest first.
    pub async fn process_batch(&self) -> Result<BatchSummary, Error> {
        let cutoff = Utc::now() - chrono::Duration::seconds(QUEUE_GRACE_SECS);
        let records = self.outreach.fetch_queued(cutoff, self.batch_size).await?;
        let mut summary = BatchSummary {
            fetched: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(summary);
        }
        debug!("[Outreach] processing {} queued record(s)", records.len());

        let mut contexts: HashMap<String, AccountContext> = HashMap::new();
        for record in &records {
            self.process_record(record, &mut contexts, &mut summary).await?;
        }

        if !summary.is_idle() {
            info!(
                "[Outreach] batch done: sent={} errors={} blocked={} skipped={} requeued={}",
                summary.sent, summary.errors, summary.blocked, summary.skipped, summary.requeued
            );
        }
        Ok(summary)
    }

    async fn process_record(
        &self,
        record: &OutreachRecord,
        contexts: &mut HashMap<String, AccountContext>,
        summary: &mut BatchSummary,
    ) -> Result<(), Error> {
        let account = record.account_id.as_str();

        match summary.halted.get(account) {
            Some(Halt::IdentityMismatch(detail)) => {
                let detail = detail.clone();
                if self.outreach.claim(record.id).await? {
                    self.outreach.mark_error(record.id, &detail).await?;
                    summary.errors += 1;
                }
                return Ok(());
            }
            Some(_) => return Ok(()),
            None => {}
        }

        if !contexts.contains_key(account) {
            match self.load_context(account).await {
                Ok(ctx) => {
                    contexts.insert(account.to_string(), ctx);
                }
                Err(e) => {
                    warn!("[Outreach] {}: cannot load session/casts: {}", account, e);
                    summary.halted.insert(account.to_string(), Halt::Unavailable);
                    return Ok(());
                }
            }
        }
        let Some(ctx) = contexts.get(account) else {
            return Ok(());
        };
        let Some(session) = ctx.session.as_ref() else {
            warn!("[Outreach] {}: no valid platform session; leaving queue untouched", account);
            summary.halted.insert(account.to_string(), Halt::NoSession);
            return Ok(());
        };

        match self.limiter.is_daily_limit_reached(self.outreach.as_ref(), account).await {
            Ok(false) => {}
            Ok(true) => {
                warn!("[Outreach] {}: daily limit {} reached", account, self.limiter.daily_limit());
                summary.halted.insert(account.to_string(), Halt::DailyLimit);
                return Ok(());
            }
            Err(e) => {
                warn!("[Outreach] {}: daily count failed, not sending: {}", account, e);
                summary.halted.insert(account.to_string(), Halt::DailyLimit);
                return Ok(());
            }
        }

        if !self.outreach.claim(record.id).await? {
            debug!("[Outreach] record {} already claimed elsewhere", record.id);
            summary.skipped += 1;
            return Ok(());
        }

        if let Err(violation) = self.gate.guard_send(&record.user_name, record.campaign.as_deref()) {
            let status = match violation {
                SafetyViolation::CampaignRequired => OutreachStatus::BlockedNoCampaign,
                SafetyViolation::TestModeBlocked { .. } => OutreachStatus::BlockedTestMode,
                SafetyViolation::IdentityMismatch { .. } => OutreachStatus::Error,
            };
            warn!("[Outreach] record {} rejected: {} ({})", record.id, violation.code(), violation);
            self.outreach
                .mark_blocked(record.id, status, &truncate_detail(&violation.to_string()))
                .await?;
            summary.blocked += 1;
            return Ok(());
        }

        if let Err(violation) = ctx.identity.verify(&record.cast_name) {
            let detail = truncate_detail(&violation.to_string());
            error!("[Outreach] record {} rejected: {}; failing the rest of {}", record.id, violation, account);
            self.outreach.mark_error(record.id, &detail).await?;
            summary.errors += 1;
            summary.halted.insert(account.to_string(), Halt::IdentityMismatch(detail));
            return Ok(());
        }

        let campaign = record.campaign.as_deref().unwrap_or_default();
        if !is_valid_campaign(campaign) {
            warn!("[Outreach] record {} has an invalid campaign '{}'", record.id, campaign);
            let detail = format!(
                "invalid campaign format '{}'; allowed: TEST, pipe*, seq*, bulk*, trigger_*, *_sched_*",
                campaign
            );
            self.outreach.mark_error(record.id, &truncate_detail(&detail)).await?;
            summary.errors += 1;
            return Ok(());
        }

        match self
            .limiter
            .is_user_on_cooldown(self.outreach.as_ref(), account, &record.cast_name, &record.user_name)
            .await
        {
            Ok(false) => {}
            Ok(true) => {
                info!("[Outreach] {} is on cooldown; skipping record {}", record.user_name, record.id);
                self.outreach.mark_error(record.id, USER_COOLDOWN_DETAIL).await?;
                summary.skipped += 1;
                return Ok(());
            }
            Err(e) => {
                warn!("[Outreach] cooldown check failed for record {}: {}", record.id, e);
                self.outreach.requeue(record.id).await?;
                summary.requeued += 1;
                return Ok(());
            }
        }

        let target_id = match self.resolve_target(record, session).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                self.outreach
                    .mark_error(record.id, &format!("user id not found for {}", record.user_name))
                    .await?;
                summary.errors += 1;
                return Ok(());
            }
            Err(Error::SessionExpired(detail)) => {
                return self.on_session_expired(record, &detail, summary).await;
            }
            Err(e) => {
                self.outreach
                    .mark_error(record.id, &truncate_detail(&format!("user id resolution failed: {}", e)))
                    .await?;
                summary.errors += 1;
                return Ok(());
            }
        };

        self.limiter.wait_for_slot().await;
        if self.gate.test_mode() {
            info!(
                "[Outreach] sending: from={} to={} campaign={} test_mode=true",
                record.cast_name, record.user_name, campaign
            );
        } else {
            warn!(
                "[Outreach] sending: from={} to={} campaign={} test_mode=false",
                record.cast_name, record.user_name, campaign
            );
        }

        let sent = tokio::time::timeout(
            SEND_TIMEOUT,
            self.api
                .send_message(session, &target_id, &record.user_name, &record.message),
        )
        .await;

        match sent {
            Ok(Ok(receipt)) => {
                self.outreach.mark_success(record.id, Some(&target_id)).await?;
                summary.sent += 1;
                info!("[Outreach] sent to {} (message {:?})", record.user_name, receipt.message_id);
            }
            Ok(Err(Error::SessionExpired(detail))) => {
                return self.on_session_expired(record, &detail, summary).await;
            }
            Ok(Err(e)) if e.is_transient() && record.attempts + 1 < self.max_attempts => {
                warn!(
                    "[Outreach] transient send failure for record {} (attempt {}): {}",
                    record.id,
                    record.attempts + 1,
                    e
                );
                self.outreach.requeue(record.id).await?;
                summary.requeued += 1;
            }
            Ok(Err(e)) => {
                warn!("[Outreach] send to {} failed: {}", record.user_name, e);
                self.outreach.mark_error(record.id, &truncate_detail(&e.to_string())).await?;
                summary.errors += 1;
            }
            Err(_) => {
                warn!("[Outreach] send to {} timed out after {:?}", record.user_name, SEND_TIMEOUT);
                self.outreach
                    .mark_error(record.id, &format!("send timed out after {}s", SEND_TIMEOUT.as_secs()))
                    .await?;
                summary.errors += 1;
            }
        }
        Ok(())
    }

    async fn load_context(&self, account_id: &str) -> Result<AccountContext, Error> {
        let session = self.casts.active_session(account_id).await?;
        let casts = self.casts.registered_casts(account_id).await?;
        let identity = CastIdentity::new(&casts, session.as_ref().map(|s| s.platform_user_id.as_str()));
        Ok(AccountContext { session, identity })
    }

    /// Record value, then the paid-users cache, then the platform lookup.
    async fn resolve_target(&self, record: &OutreachRecord, session: &PlatformSession) -> Result<Option<String>, Error> {
        if let Some(id) = record.target_user_id.as_ref().filter(|id| !id.is_empty()) {
            return Ok(Some(id.clone()));
        }
        match self.casts.cached_user_id(&record.user_name).await {
            Ok(Some(id)) => return Ok(Some(id)),
            Ok(None) => {}
            Err(e) => warn!("[Outreach] user id cache lookup failed for {}: {}", record.user_name, e),
        }
        self.api.resolve_user_id(session, &record.user_name).await
    }

    /// The record goes back to the queue; the account's remaining rows are
    /// left queued until a new session shows up.
    async fn on_session_expired(
        &self,
        record: &OutreachRecord,
        detail: &str,
        summary: &mut BatchSummary,
    ) -> Result<(), Error> {
        error!("[Outreach] {}: platform session expired: {}", record.account_id, detail);
        self.outreach.requeue(record.id).await?;
        summary.requeued += 1;
        if let Err(e) = self.casts.mark_session_invalid(&record.account_id).await {
            warn!("[Outreach] could not invalidate session for {}: {}", record.account_id, e);
        }
        summary.halted.insert(record.account_id.clone(), Halt::SessionExpired);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outreach::api::MockOutreachApi;
    use crate::test_utils::MemoryRepos;
    use chrono::Duration as ChronoDuration;
    use livespot_common::models::{NewOutreachRecord, RegisteredCast};
    use std::collections::BTreeMap;

    fn config() -> OutreachConfig {
        OutreachConfig {
            test_mode: true,
            whitelist: vec!["alice".into(), "bob".into()],
            send_interval: Duration::ZERO,
            daily_limit: 100,
            user_cooldown_hours: 24,
            poll_interval: Duration::from_secs(10),
            batch_size: 20,
            max_attempts: 3,
        }
    }

    fn session(user_id: &str) -> PlatformSession {
        PlatformSession {
            account_id: "acct".into(),
            platform_user_id: user_id.into(),
            session_cookie: "sess".into(),
            csrf_token: Some("csrf".into()),
            cookies: BTreeMap::new(),
        }
    }

    fn repos() -> Arc<MemoryRepos> {
        let repos = Arc::new(MemoryRepos::new());
        repos.set_platform_session(session("100"));
        repos.add_cast(RegisteredCast {
            account_id: "acct".into(),
            cast_name: "risa".into(),
            platform_user_id: Some("100".into()),
            is_active: true,
        });
        repos
    }

    async fn queue(repos: &MemoryRepos, user: &str, campaign: &str) -> i64 {
        let id = repos
            .enqueue(&NewOutreachRecord {
                account_id: "acct".into(),
                cast_name: "risa".into(),
                user_name: user.into(),
                message: format!("hi {}", user),
                campaign: campaign.into(),
                template_name: None,
            })
            .await
            .unwrap();
        repos.backdate_outreach(id, Utc::now() - ChronoDuration::minutes(1));
        id
    }

    fn processor(repos: &Arc<MemoryRepos>, api: MockOutreachApi, config: &OutreachConfig) -> OutreachProcessor {
        OutreachProcessor::new(repos.clone(), repos.clone(), Arc::new(api), config)
    }

    fn api_resolving_to(id: &'static str) -> MockOutreachApi {
        let mut api = MockOutreachApi::new();
        api.expect_resolve_user_id()
            .returning(move |_, _| Ok(Some(id.to_string())));
        api
    }

    #[tokio::test]
    async fn sends_whitelisted_record() {
        let repos = repos();
        let id = queue(&repos, "alice", "TEST").await;

        let mut api = api_resolving_to("555");
        api.expect_send_message()
            .times(1)
            .returning(|_, target, _, _| {
                assert_eq!(target, "555");
                Ok(SendReceipt { message_id: Some("m1".into()) })
            });

        let summary = processor(&repos, api, &config()).process_batch().await.unwrap();
        assert_eq!(summary.sent, 1);
        let row = repos.outreach(id).unwrap();
        assert_eq!(row.status, OutreachStatus::Success);
        assert_eq!(row.target_user_id.as_deref(), Some("555"));
    }

    #[tokio::test]
    async fn fresh_records_wait_for_grace_period() {
        let repos = repos();
        let id = repos
            .enqueue(&NewOutreachRecord {
                account_id: "acct".into(),
                cast_name: "risa".into(),
                user_name: "alice".into(),
                message: "hi".into(),
                campaign: "TEST".into(),
                template_name: None,
            })
            .await
            .unwrap();

        let summary = processor(&repos, MockOutreachApi::new(), &config()).process_batch().await.unwrap();
        assert_eq!(summary.fetched, 0);
        assert_eq!(repos.outreach(id).unwrap().status, OutreachStatus::Queued);
    }

    #[tokio::test]
    async fn gate_rejections_are_terminal() {
        let repos = repos();
        let no_campaign = queue(&repos, "alice", "").await;
        let not_listed = queue(&repos, "mallory", "TEST").await;

        let summary = processor(&repos, MockOutreachApi::new(), &config()).process_batch().await.unwrap();
        assert_eq!(summary.blocked, 2);
        assert_eq!(repos.outreach(no_campaign).unwrap().status, OutreachStatus::BlockedNoCampaign);
        let blocked = repos.outreach(not_listed).unwrap();
        assert_eq!(blocked.status, OutreachStatus::BlockedTestMode);
        assert!(blocked.error.unwrap().starts_with("TEST_MODE_BLOCKED"));
    }

    #[tokio::test]
    async fn invalid_campaign_format_is_an_error() {
        let repos = repos();
        let id = queue(&repos, "alice", "manual_blast").await;

        processor(&repos, MockOutreachApi::new(), &config()).process_batch().await.unwrap();
        let row = repos.outreach(id).unwrap();
        assert_eq!(row.status, OutreachStatus::Error);
        assert!(row.error.unwrap().contains("invalid campaign"));
    }

    #[tokio::test]
    async fn identity_mismatch_fails_rest_of_batch() {
        let repos = repos();
        repos.set_platform_session(session("999"));
        let first = queue(&repos, "alice", "TEST").await;
        let second = queue(&repos, "bob", "TEST").await;

        let summary = processor(&repos, MockOutreachApi::new(), &config()).process_batch().await.unwrap();
        assert_eq!(summary.errors, 2);
        for id in [first, second] {
            let row = repos.outreach(id).unwrap();
            assert_eq!(row.status, OutreachStatus::Error);
            assert!(row.error.unwrap().starts_with("CAST_IDENTITY_MISMATCH"));
        }
    }

    #[tokio::test]
    async fn session_expiry_requeues_and_pauses() {
        let repos = repos();
        let first = queue(&repos, "alice", "TEST").await;
        let second = queue(&repos, "bob", "TEST").await;

        let mut api = api_resolving_to("555");
        api.expect_send_message()
            .times(1)
            .returning(|_, _, _, _| Err(Error::SessionExpired("HTTP 401".into())));

        let summary = processor(&repos, api, &config()).process_batch().await.unwrap();
        assert_eq!(summary.halted.get("acct"), Some(&Halt::SessionExpired));

        let row = repos.outreach(first).unwrap();
        assert_eq!(row.status, OutreachStatus::Queued);
        assert_eq!(row.attempts, 1);
        assert_eq!(repos.outreach(second).unwrap().status, OutreachStatus::Queued);
        assert!(repos.active_session("acct").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transient_failures_requeue_until_max_attempts() {
        let repos = repos();
        let id = queue(&repos, "alice", "TEST").await;

        let mut api = api_resolving_to("555");
        api.expect_send_message().returning(|_, _, _, _| {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")))
        });
        let processor = processor(&repos, api, &config());

        processor.process_batch().await.unwrap();
        assert_eq!(repos.outreach(id).unwrap().status, OutreachStatus::Queued);
        processor.process_batch().await.unwrap();
        assert_eq!(repos.outreach(id).unwrap().attempts, 2);
        processor.process_batch().await.unwrap();

        let row = repos.outreach(id).unwrap();
        assert_eq!(row.status, OutreachStatus::Error);
        assert!(row.error.unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn daily_cap_leaves_records_queued() {
        let repos = repos();
        let mut cfg = config();
        cfg.daily_limit = 1;
        repos.add_sent("acct", "risa", "earlier", Utc::now());
        let id = queue(&repos, "alice", "TEST").await;

        let summary = processor(&repos, MockOutreachApi::new(), &cfg).process_batch().await.unwrap();
        assert_eq!(summary.halted.get("acct"), Some(&Halt::DailyLimit));
        assert_eq!(repos.outreach(id).unwrap().status, OutreachStatus::Queued);
    }

    #[tokio::test]
    async fn user_cooldown_marks_error() {
        let repos = repos();
        repos.add_sent("acct", "risa", "alice", Utc::now() - ChronoDuration::hours(3));
        let id = queue(&repos, "alice", "TEST").await;

        processor(&repos, MockOutreachApi::new(), &config()).process_batch().await.unwrap();
        let row = repos.outreach(id).unwrap();
        assert_eq!(row.status, OutreachStatus::Error);
        assert_eq!(row.error.as_deref(), Some(USER_COOLDOWN_DETAIL));
    }

    #[tokio::test]
    async fn cached_user_id_skips_lookup() {
        let repos = repos();
        repos.add_paid_user("acct", "alice", Some("777"), 10);
        queue(&repos, "alice", "TEST").await;

        let mut api = MockOutreachApi::new();
        api.expect_resolve_user_id().times(0);
        api.expect_send_message()
            .times(1)
            .returning(|_, target, _, _| {
                assert_eq!(target, "777");
                Ok(SendReceipt { message_id: None })
            });

        let summary = processor(&repos, api, &config()).process_batch().await.unwrap();
        assert_eq!(summary.sent, 1);
    }

    #[tokio::test]
    async fn unknown_user_is_an_error() {
        let repos = repos();
        let id = queue(&repos, "alice", "TEST").await;

        let mut api = MockOutreachApi::new();
        api.expect_resolve_user_id().returning(|_, _| Ok(None));

        processor(&repos, api, &config()).process_batch().await.unwrap();
        assert_eq!(repos.outreach(id).unwrap().status, OutreachStatus::Error);
    }

    #[test]
    fn detail_is_truncated() {
        let long = "x".repeat(5000);
        assert_eq!(truncate_detail(&long).len(), ERROR_DETAIL_LIMIT);
    }
}
