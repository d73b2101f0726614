//! In-memory implementations of every repository trait, for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use livespot_common::models::{
    NewOutreachRecord, NormalizedMessage, NormalizedSession, NormalizedViewer, OutreachRecord,
    OutreachStatus, PlatformSession, RegisteredCast, SegmentMember, SessionTipTotal, SpyProfileRow, Trigger,
    TriggerLogEntry,
};
use livespot_common::traits::{
    CastRepository, EventRepository, OutreachRepository, ProfileRepository, TriggerRepository,
};
use crate::Error;

#[derive(Default)]
struct State {
    triggers: Vec<Trigger>,
    trigger_logs: Vec<TriggerLogEntry>,
    /// (scenario, cast, user) → enrollment id
    enrollments: HashMap<(Uuid, String, String), Uuid>,
    outreach: Vec<OutreachRecord>,
    next_outreach_id: i64,
    messages: Vec<NormalizedMessage>,
    viewers: Vec<(String, String, Option<Uuid>, NormalizedViewer)>,
    sessions: Vec<NormalizedSession>,
    /// (account, row, is own cast)
    profiles: Vec<(String, SpyProfileRow, bool)>,
    segments: Vec<(String, String, SegmentMember)>,
    casts: Vec<RegisteredCast>,
    platform_sessions: HashMap<String, PlatformSession>,
    /// (account, user) → (platform user id, level)
    paid_users: HashMap<(String, String), (Option<String>, i64)>,
    fail_session_totals: bool,
    fail_cooldown_queries: bool,
}

/// One shared in-memory backend for all repository traits.
#[derive(Default)]
pub struct MemoryRepos {
    state: Mutex<State>,
}

impl MemoryRepos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trigger(&self, trigger: Trigger) {
        self.state.lock().triggers.push(trigger);
    }

    pub fn add_trigger_log(&self, entry: TriggerLogEntry) {
        self.state.lock().trigger_logs.push(entry);
    }

    pub fn trigger_logs(&self) -> Vec<TriggerLogEntry> {
        self.state.lock().trigger_logs.clone()
    }

    pub fn add_profile(&self, account_id: &str, row: SpyProfileRow, own_cast: bool) {
        self.state.lock().profiles.push((account_id.to_string(), row, own_cast));
    }

    pub fn add_segment(&self, account_id: &str, cast_name: &str, member: SegmentMember) {
        self.state
            .lock()
            .segments
            .push((account_id.to_string(), cast_name.to_string(), member));
    }

    pub fn clear_segments(&self) {
        self.state.lock().segments.clear();
    }

    pub fn add_cast(&self, cast: RegisteredCast) {
        self.state.lock().casts.push(cast);
    }

    pub fn set_platform_session(&self, session: PlatformSession) {
        self.state.lock().platform_sessions.insert(session.account_id.clone(), session);
    }

    pub fn add_paid_user(&self, account_id: &str, user_name: &str, user_id: Option<&str>, level: i64) {
        self.state.lock().paid_users.insert(
            (account_id.to_string(), user_name.to_string()),
            (user_id.map(str::to_string), level),
        );
    }

    pub fn paid_user_level(&self, account_id: &str, user_name: &str) -> Option<i64> {
        self.state
            .lock()
            .paid_users
            .get(&(account_id.to_string(), user_name.to_string()))
            .map(|(_, level)| *level)
    }

    pub fn fail_session_totals(&self, fail: bool) {
        self.state.lock().fail_session_totals = fail;
    }

    pub fn fail_cooldown_queries(&self, fail: bool) {
        self.state.lock().fail_cooldown_queries = fail;
    }

    pub fn outreach(&self, id: i64) -> Option<OutreachRecord> {
        self.state.lock().outreach.iter().find(|r| r.id == id).cloned()
    }

    pub fn outreach_records(&self) -> Vec<OutreachRecord> {
        self.state.lock().outreach.clone()
    }

    /// Moves a queue row's creation time, e.g. past the processing grace period.
    pub fn backdate_outreach(&self, id: i64, created_at: DateTime<Utc>) {
        if let Some(r) = self.state.lock().outreach.iter_mut().find(|r| r.id == id) {
            r.created_at = created_at;
        }
    }

    /// Inserts a finished send, for cooldown and daily-cap history.
    pub fn add_sent(&self, account_id: &str, cast_name: &str, user_name: &str, sent_at: DateTime<Utc>) {
        let mut st = self.state.lock();
        st.next_outreach_id += 1;
        let id = st.next_outreach_id;
        st.outreach.push(OutreachRecord {
            id,
            account_id: account_id.to_string(),
            user_name: user_name.to_string(),
            message: "earlier".to_string(),
            cast_name: cast_name.to_string(),
            status: OutreachStatus::Success,
            campaign: Some("TEST".to_string()),
            target_user_id: None,
            attempts: 0,
            created_at: sent_at,
            sent_at: Some(sent_at),
            error: None,
            sent_via: Some("api".to_string()),
        });
    }

    pub fn messages(&self) -> Vec<NormalizedMessage> {
        self.state.lock().messages.clone()
    }

    pub fn sessions(&self) -> Vec<NormalizedSession> {
        self.state.lock().sessions.clone()
    }

    pub fn viewer_rows(&self) -> usize {
        self.state.lock().viewers.len()
    }
}

fn injected_failure() -> Error {
    Error::Platform("injected failure".to_string())
}

#[async_trait]
impl TriggerRepository for MemoryRepos {
    async fn list_enabled_triggers(&self) -> Result<Vec<Trigger>, Error> {
        Ok(self.state.lock().triggers.iter().filter(|t| t.enabled).cloned().collect())
    }

    async fn has_fired_for_user_since(
        &self,
        trigger_id: Uuid,
        user_name: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let st = self.state.lock();
        if st.fail_cooldown_queries {
            return Err(injected_failure());
        }
        Ok(st.trigger_logs.iter().any(|l| {
            l.trigger_id == trigger_id && l.user_name == user_name && l.action_taken.is_fired() && l.triggered_at >= since
        }))
    }

    async fn count_fired_since(&self, trigger_id: Uuid, since: DateTime<Utc>) -> Result<i64, Error> {
        let st = self.state.lock();
        if st.fail_cooldown_queries {
            return Err(injected_failure());
        }
        Ok(st
            .trigger_logs
            .iter()
            .filter(|l| l.trigger_id == trigger_id && l.action_taken.is_fired() && l.triggered_at >= since)
            .count() as i64)
    }

    async fn insert_trigger_log(&self, entry: &TriggerLogEntry) -> Result<(), Error> {
        self.state.lock().trigger_logs.push(entry.clone());
        Ok(())
    }

    async fn enroll_scenario(
        &self,
        scenario_id: Uuid,
        _account_id: &str,
        cast_name: &str,
        user_name: &str,
    ) -> Result<Option<Uuid>, Error> {
        let mut st = self.state.lock();
        let key = (scenario_id, cast_name.to_string(), user_name.to_string());
        if st.enrollments.contains_key(&key) {
            return Ok(None);
        }
        let id = Uuid::new_v4();
        st.enrollments.insert(key, id);
        Ok(Some(id))
    }
}

#[async_trait]
impl OutreachRepository for MemoryRepos {
    async fn enqueue(&self, record: &NewOutreachRecord) -> Result<i64, Error> {
        let mut st = self.state.lock();
        st.next_outreach_id += 1;
        let id = st.next_outreach_id;
        st.outreach.push(OutreachRecord {
            id,
            account_id: record.account_id.clone(),
            user_name: record.user_name.clone(),
            message: record.message.clone(),
            cast_name: record.cast_name.clone(),
            status: OutreachStatus::Queued,
            campaign: Some(record.campaign.clone()).filter(|c| !c.is_empty()),
            target_user_id: None,
            attempts: 0,
            created_at: Utc::now(),
            sent_at: None,
            error: None,
            sent_via: None,
        });
        Ok(id)
    }

    async fn fetch_queued(&self, created_before: DateTime<Utc>, limit: i64) -> Result<Vec<OutreachRecord>, Error> {
        let st = self.state.lock();
        let mut rows: Vec<OutreachRecord> = st
            .outreach
            .iter()
            .filter(|r| r.status == OutreachStatus::Queued && r.created_at < created_before)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn claim(&self, id: i64) -> Result<bool, Error> {
        let mut st = self.state.lock();
        match st.outreach.iter_mut().find(|r| r.id == id) {
            Some(r) if r.status == OutreachStatus::Queued => {
                r.status = OutreachStatus::Sending;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_success(&self, id: i64, target_user_id: Option<&str>) -> Result<(), Error> {
        let mut st = self.state.lock();
        if let Some(r) = st.outreach.iter_mut().find(|r| r.id == id) {
            r.status = OutreachStatus::Success;
            r.sent_at = Some(Utc::now());
            r.sent_via = Some("api".to_string());
            if let Some(uid) = target_user_id {
                r.target_user_id = Some(uid.to_string());
            }
        }
        Ok(())
    }

    async fn mark_error(&self, id: i64, detail: &str) -> Result<(), Error> {
        self.mark_blocked(id, OutreachStatus::Error, detail).await
    }

    async fn mark_blocked(&self, id: i64, status: OutreachStatus, detail: &str) -> Result<(), Error> {
        let mut st = self.state.lock();
        if let Some(r) = st.outreach.iter_mut().find(|r| r.id == id) {
            r.status = status;
            r.error = Some(detail.to_string());
        }
        Ok(())
    }

    async fn requeue(&self, id: i64) -> Result<(), Error> {
        let mut st = self.state.lock();
        if let Some(r) = st.outreach.iter_mut().find(|r| r.id == id) {
            r.status = OutreachStatus::Queued;
            r.attempts += 1;
        }
        Ok(())
    }

    async fn count_sent_since(&self, account_id: &str, since: DateTime<Utc>) -> Result<i64, Error> {
        Ok(self
            .state
            .lock()
            .outreach
            .iter()
            .filter(|r| {
                r.account_id == account_id
                    && r.status == OutreachStatus::Success
                    && r.sent_at.map_or(false, |t| t >= since)
            })
            .count() as i64)
    }

    async fn has_recent_success(
        &self,
        account_id: &str,
        cast_name: &str,
        user_name: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, Error> {
        Ok(self.state.lock().outreach.iter().any(|r| {
            r.account_id == account_id
                && r.cast_name == cast_name
                && r.user_name == user_name
                && r.status == OutreachStatus::Success
                && r.sent_at.map_or(false, |t| t >= since)
        }))
    }

    async fn queue_count(&self, account_id: &str) -> Result<i64, Error> {
        Ok(self
            .state
            .lock()
            .outreach
            .iter()
            .filter(|r| r.account_id == account_id && r.status == OutreachStatus::Queued)
            .count() as i64)
    }
}

#[async_trait]
impl EventRepository for MemoryRepos {
    async fn insert_messages(&self, messages: &[NormalizedMessage]) -> Result<(), Error> {
        self.state.lock().messages.extend_from_slice(messages);
        Ok(())
    }

    async fn upsert_viewers(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Option<Uuid>,
        viewers: &[NormalizedViewer],
    ) -> Result<(), Error> {
        let mut st = self.state.lock();
        for v in viewers {
            let key = v.user_name.to_lowercase();
            st.viewers.retain(|(a, c, s, existing)| {
                !(a == account_id && c == cast_name && *s == session_id && existing.user_name.to_lowercase() == key)
            });
            st.viewers
                .push((account_id.to_string(), cast_name.to_string(), session_id, v.clone()));
        }
        Ok(())
    }

    async fn open_session(&self, session: &NormalizedSession) -> Result<Uuid, Error> {
        let mut st = self.state.lock();
        if let Some(active) = st.sessions.iter().find(|s| {
            s.account_id == session.account_id && s.cast_name == session.cast_name && s.ended_at.is_none()
        }) {
            return Ok(active.session_id);
        }
        st.sessions.push(session.clone());
        Ok(session.session_id)
    }

    async fn close_session(&self, session_id: Uuid, ended_at: DateTime<Utc>) -> Result<(), Error> {
        let mut st = self.state.lock();
        if let Some(s) = st.sessions.iter_mut().find(|s| s.session_id == session_id) {
            s.ended_at = Some(ended_at.max(s.started_at));
        }
        Ok(())
    }

    async fn close_stale_sessions(&self, account_id: &str, cast_name: &str) -> Result<u64, Error> {
        let mut st = self.state.lock();
        let now = Utc::now();
        let mut closed = 0;
        for s in st.sessions.iter_mut() {
            if s.account_id.to_string() == account_id && s.cast_name == cast_name && s.ended_at.is_none() {
                s.ended_at = Some(now.max(s.started_at));
                closed += 1;
            }
        }
        Ok(closed)
    }
}

impl MemoryRepos {
    fn session_tips(&self, account_id: &str, cast_name: &str, session_id: Uuid) -> Vec<SessionTipTotal> {
        self.state
            .lock()
            .messages
            .iter()
            .filter(|m| {
                m.account_id == account_id && m.cast_name == cast_name && m.session_id == Some(session_id) && m.tokens > 0
            })
            .map(|m| SessionTipTotal { user_name: m.user_name.clone(), tokens: m.tokens })
            .collect()
    }

    fn own_rows(&self, account_id: &str, own: bool) -> Vec<SpyProfileRow> {
        self.state
            .lock()
            .profiles
            .iter()
            .filter(|(a, _, is_own)| a == account_id && *is_own == own)
            .map(|(_, row, _)| row.clone())
            .collect()
    }
}

fn dedup_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for n in names {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

#[async_trait]
impl ProfileRepository for MemoryRepos {
    async fn known_viewers(&self, account_id: &str, cast_name: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .own_rows(account_id, true)
            .into_iter()
            .filter(|r| r.cast_name == cast_name)
            .map(|r| r.user_name)
            .collect())
    }

    async fn session_viewers(&self, account_id: &str, cast_name: &str, session_id: Uuid) -> Result<Vec<String>, Error> {
        let names: Vec<String> = self
            .state
            .lock()
            .viewers
            .iter()
            .filter(|(a, c, s, _)| a == account_id && c == cast_name && *s == Some(session_id))
            .map(|(_, _, _, v)| v.user_name.clone())
            .collect();
        Ok(dedup_names(names.into_iter()))
    }

    async fn session_tippers(&self, account_id: &str, cast_name: &str, session_id: Uuid) -> Result<Vec<String>, Error> {
        let tips = self.session_tips(account_id, cast_name, session_id);
        Ok(dedup_names(tips.into_iter().map(|t| t.user_name)))
    }

    async fn session_token_totals(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Uuid,
    ) -> Result<Vec<SessionTipTotal>, Error> {
        if self.state.lock().fail_session_totals {
            return Err(injected_failure());
        }
        let mut totals: Vec<SessionTipTotal> = Vec::new();
        for tip in self.session_tips(account_id, cast_name, session_id) {
            match totals.iter_mut().find(|t| t.user_name == tip.user_name) {
                Some(t) => t.tokens += tip.tokens,
                None => totals.push(tip),
            }
        }
        Ok(totals)
    }

    async fn session_tip_events(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Uuid,
    ) -> Result<Vec<SessionTipTotal>, Error> {
        Ok(self.session_tips(account_id, cast_name, session_id))
    }

    async fn own_profiles_for_users(
        &self,
        account_id: &str,
        cast_name: Option<&str>,
        user_names: &[String],
        min_total_tokens: i64,
    ) -> Result<Vec<SpyProfileRow>, Error> {
        Ok(self
            .own_rows(account_id, true)
            .into_iter()
            .filter(|r| cast_name.map_or(true, |c| r.cast_name == c))
            .filter(|r| user_names.contains(&r.user_name) && r.total_tokens >= min_total_tokens)
            .collect())
    }

    async fn dormant_own_profiles(
        &self,
        account_id: &str,
        cast_name: Option<&str>,
        min_total_tokens: i64,
        last_seen_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SpyProfileRow>, Error> {
        let mut rows: Vec<SpyProfileRow> = self
            .own_rows(account_id, true)
            .into_iter()
            .filter(|r| cast_name.map_or(true, |c| r.cast_name == c))
            .filter(|r| r.total_tokens >= min_total_tokens && r.last_seen.map_or(false, |t| t < last_seen_before))
            .collect();
        rows.sort_by(|a, b| b.total_tokens.cmp(&a.total_tokens));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn competitor_spenders(
        &self,
        account_id: &str,
        min_total_tokens: i64,
        limit: i64,
    ) -> Result<Vec<SpyProfileRow>, Error> {
        let mut rows: Vec<SpyProfileRow> = self
            .own_rows(account_id, false)
            .into_iter()
            .filter(|r| r.total_tokens >= min_total_tokens)
            .collect();
        rows.sort_by(|a, b| b.total_tokens.cmp(&a.total_tokens));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn own_visits(&self, account_id: &str, cast_names: &[String], min_visits: i64) -> Result<Vec<SpyProfileRow>, Error> {
        Ok(self
            .own_rows(account_id, true)
            .into_iter()
            .filter(|r| cast_names.contains(&r.cast_name) && r.message_count >= min_visits)
            .collect())
    }

    async fn user_segments(&self, account_id: &str, cast_name: &str) -> Result<Vec<SegmentMember>, Error> {
        Ok(self
            .state
            .lock()
            .segments
            .iter()
            .filter(|(a, c, _)| a == account_id && c == cast_name)
            .map(|(_, _, m)| m.clone())
            .collect())
    }
}

#[async_trait]
impl CastRepository for MemoryRepos {
    async fn registered_casts(&self, account_id: &str) -> Result<Vec<RegisteredCast>, Error> {
        Ok(self
            .state
            .lock()
            .casts
            .iter()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn active_session(&self, account_id: &str) -> Result<Option<PlatformSession>, Error> {
        Ok(self.state.lock().platform_sessions.get(account_id).cloned())
    }

    async fn mark_session_invalid(&self, account_id: &str) -> Result<(), Error> {
        self.state.lock().platform_sessions.remove(account_id);
        Ok(())
    }

    async fn cached_user_id(&self, user_name: &str) -> Result<Option<String>, Error> {
        Ok(self
            .state
            .lock()
            .paid_users
            .iter()
            .find(|((_, u), (id, _))| u == user_name && id.is_some())
            .and_then(|(_, (id, _))| id.clone()))
    }

    async fn user_levels(&self, account_id: &str, user_names: &[String]) -> Result<HashMap<String, i64>, Error> {
        Ok(self
            .state
            .lock()
            .paid_users
            .iter()
            .filter(|((a, u), _)| a == account_id && user_names.contains(u))
            .map(|((_, u), (_, level))| (u.clone(), *level))
            .collect())
    }

    async fn raise_user_level(&self, account_id: &str, user_name: &str, level: i64) -> Result<(), Error> {
        let mut st = self.state.lock();
        if let Some(entry) = st.paid_users.get_mut(&(account_id.to_string(), user_name.to_string())) {
            entry.1 = entry.1.max(level);
        }
        Ok(())
    }
}
