use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Error;
use crate::models::{
    NewOutreachRecord, NormalizedMessage, NormalizedSession, NormalizedViewer, OutreachRecord,
    OutreachStatus, PlatformSession, RegisteredCast, SegmentMember, SessionTipTotal, SpyProfileRow, Trigger,
    TriggerLogEntry,
};

/// Trigger definitions, their firing log and scenario enrollments.
#[async_trait]
pub trait TriggerRepository: Send + Sync {
    async fn list_enabled_triggers(&self) -> Result<Vec<Trigger>, Error>;

    /// Whether the trigger fired (queued or enrolled) for this user since `since`.
    async fn has_fired_for_user_since(
        &self,
        trigger_id: Uuid,
        user_name: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Number of firings (queued or enrolled) since `since`.
    async fn count_fired_since(&self, trigger_id: Uuid, since: DateTime<Utc>) -> Result<i64, Error>;

    async fn insert_trigger_log(&self, entry: &TriggerLogEntry) -> Result<(), Error>;

    /// Returns `None` when the user is already enrolled in this scenario for the cast.
    async fn enroll_scenario(
        &self,
        scenario_id: Uuid,
        account_id: &str,
        cast_name: &str,
        user_name: &str,
    ) -> Result<Option<Uuid>, Error>;
}

/// The persistent outreach queue.
#[async_trait]
pub trait OutreachRepository: Send + Sync {
    async fn enqueue(&self, record: &NewOutreachRecord) -> Result<i64, Error>;

    /// Queued rows created before `created_before`, oldest first.
    async fn fetch_queued(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutreachRecord>, Error>;

    /// Conditional `queued -> sending` transition. False if someone else won.
    async fn claim(&self, id: i64) -> Result<bool, Error>;

    async fn mark_success(&self, id: i64, target_user_id: Option<&str>) -> Result<(), Error>;

    async fn mark_error(&self, id: i64, detail: &str) -> Result<(), Error>;

    async fn mark_blocked(&self, id: i64, status: OutreachStatus, detail: &str) -> Result<(), Error>;

    /// Back to `queued`, bumping the attempt counter.
    async fn requeue(&self, id: i64) -> Result<(), Error>;

    async fn count_sent_since(&self, account_id: &str, since: DateTime<Utc>) -> Result<i64, Error>;

    async fn has_recent_success(
        &self,
        account_id: &str,
        cast_name: &str,
        user_name: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, Error>;

    async fn queue_count(&self, account_id: &str) -> Result<i64, Error>;
}

/// Writes coming out of the ingestion side.
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert_messages(&self, messages: &[NormalizedMessage]) -> Result<(), Error>;

    async fn upsert_viewers(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Option<Uuid>,
        viewers: &[NormalizedViewer],
    ) -> Result<(), Error>;

    /// Inserts the session; on a unique conflict returns the already-active id.
    async fn open_session(&self, session: &NormalizedSession) -> Result<Uuid, Error>;

    async fn close_session(&self, session_id: Uuid, ended_at: DateTime<Utc>) -> Result<(), Error>;

    async fn close_stale_sessions(&self, account_id: &str, cast_name: &str) -> Result<u64, Error>;
}

/// Historical viewer data the trigger evaluators read.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn known_viewers(&self, account_id: &str, cast_name: &str) -> Result<Vec<String>, Error>;

    async fn session_viewers(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Uuid,
    ) -> Result<Vec<String>, Error>;

    async fn session_tippers(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Uuid,
    ) -> Result<Vec<String>, Error>;

    /// Pre-aggregated per-user session totals.
    async fn session_token_totals(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Uuid,
    ) -> Result<Vec<SessionTipTotal>, Error>;

    /// Raw tip rows for the session, one per tip.
    async fn session_tip_events(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Uuid,
    ) -> Result<Vec<SessionTipTotal>, Error>;

    /// Own-cast profiles for the given users with at least `min_total_tokens`.
    async fn own_profiles_for_users(
        &self,
        account_id: &str,
        cast_name: Option<&str>,
        user_names: &[String],
        min_total_tokens: i64,
    ) -> Result<Vec<SpyProfileRow>, Error>;

    async fn dormant_own_profiles(
        &self,
        account_id: &str,
        cast_name: Option<&str>,
        min_total_tokens: i64,
        last_seen_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SpyProfileRow>, Error>;

    /// Users spending at casts the account does not own, biggest first.
    async fn competitor_spenders(
        &self,
        account_id: &str,
        min_total_tokens: i64,
        limit: i64,
    ) -> Result<Vec<SpyProfileRow>, Error>;

    async fn own_visits(
        &self,
        account_id: &str,
        cast_names: &[String],
        min_visits: i64,
    ) -> Result<Vec<SpyProfileRow>, Error>;

    async fn user_segments(&self, account_id: &str, cast_name: &str) -> Result<Vec<SegmentMember>, Error>;
}

/// Registered casts, platform session identity and the paid-users cache.
#[async_trait]
pub trait CastRepository: Send + Sync {
    async fn registered_casts(&self, account_id: &str) -> Result<Vec<RegisteredCast>, Error>;

    /// The account's currently valid logged-in platform session.
    async fn active_session(&self, account_id: &str) -> Result<Option<PlatformSession>, Error>;

    async fn mark_session_invalid(&self, account_id: &str) -> Result<(), Error>;

    async fn cached_user_id(&self, user_name: &str) -> Result<Option<String>, Error>;

    /// `paid_users.user_level` for those of `user_names` that have a row.
    async fn user_levels(&self, account_id: &str, user_names: &[String]) -> Result<HashMap<String, i64>, Error>;

    async fn raise_user_level(&self, account_id: &str, user_name: &str, level: i64) -> Result<(), Error>;
}
