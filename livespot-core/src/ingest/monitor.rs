// livespot-core/src/ingest/monitor.rs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use livespot_common::models::{NormalizedMessage, NormalizedViewer};
use livespot_common::traits::{EventRepository, ProfileRepository};
use crate::auth::broker::CredentialBroker;
use crate::config::PollConfig;
use crate::eventbus::{EventBus, LiveEvent};
use crate::extract::as_text;
use crate::normalizer::message::{normalize_message, RawMessage};
use crate::normalizer::session::{normalize_session, RawSession};
use crate::normalizer::viewer::normalize_viewers;
use crate::parsers::chat::parse_chat;
use crate::parsers::viewer::parse_viewer_list;
use crate::platforms::stripchat::client::{StreamClient, StreamClientConfig, StreamEvent, StreamTarget};
use crate::platforms::stripchat::rest::{CastStatus, PlatformRest, StatusResult};
use crate::profiles::ProfileAccumulator;
use crate::retry::RetryTracker;
use super::batch_writer::BatchWriter;

/// Tip size at which a sender counts as VIP regardless of rank.
pub const VIP_TOKEN_THRESHOLD: i64 = 1000;

/// Sender name on rows the monitor writes itself.
pub const SYSTEM_USER: &str = "collector";

const SESSION_NAMESPACE: Uuid = Uuid::from_u128(0x6c69_7665_7370_6f74_7365_7373_696f_6e00);

/// Deterministic session id for a cast going live in a given minute.
pub fn session_id_for(cast_name: &str, started_at: DateTime<Utc>) -> Uuid {
    let minute = started_at
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(started_at);
    let key = format!("{}:{}", cast_name, minute.format("%Y-%m-%dT%H:%M"));
    Uuid::new_v5(&SESSION_NAMESPACE, key.as_bytes())
}

/// What a status poll changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    /// Offline → live. Session-start hooks run.
    WentLive { session_id: Option<Uuid> },
    /// Live on the first poll after startup; the session row is reused if one is open.
    AlreadyLive { session_id: Option<Uuid> },
    WentOffline { session_id: Option<Uuid> },
}

impl StatusChange {
    pub fn is_live(&self) -> bool {
        matches!(self, StatusChange::WentLive { .. } | StatusChange::AlreadyLive { .. })
    }
}

#[derive(Default)]
struct MonitorState {
    online: Option<bool>,
    session_id: Option<Uuid>,
    model_id: Option<String>,
    viewer_count: i64,
    known: HashSet<String>,
    message_count: u64,
    tip_total: i64,
}

/// Runtime collaborators for [`CastMonitor::run`].
pub struct MonitorDeps {
    pub rest: PlatformRest,
    pub broker: Arc<CredentialBroker>,
    pub retry: RetryTracker,
    pub poll: PollConfig,
    pub stream_config: StreamClientConfig,
    pub profile_repo: Arc<dyn ProfileRepository>,
}

/// Watches one cast: live status, viewer list and the chat stream.
pub struct CastMonitor {
    account_id: String,
    cast_name: String,
    events: Arc<dyn EventRepository>,
    writer: Arc<BatchWriter>,
    profiles: Arc<ProfileAccumulator>,
    bus: EventBus,
    state: Mutex<MonitorState>,
}

impl CastMonitor {
    pub fn new(
        account_id: impl Into<String>,
        cast_name: impl Into<String>,
        model_id: Option<String>,
        events: Arc<dyn EventRepository>,
        writer: Arc<BatchWriter>,
        profiles: Arc<ProfileAccumulator>,
        bus: EventBus,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            cast_name: cast_name.into(),
            events,
            writer,
            profiles,
            bus,
            state: Mutex::new(MonitorState {
                model_id,
                ..MonitorState::default()
            }),
        }
    }

    pub fn cast_name(&self) -> &str {
        &self.cast_name
    }

    pub fn is_online(&self) -> bool {
        self.state.lock().online == Some(true)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.state.lock().session_id
    }

    pub fn model_id(&self) -> Option<String> {
        self.state.lock().model_id.clone()
    }

    /// Adds names to the set used for the viewer rows' is-new flag.
    pub fn seed_known<I: IntoIterator<Item = String>>(&self, names: I) {
        self.state.lock().known.extend(names);
    }

    // ---------------------------------------------------------------
    // Stream events
    // ---------------------------------------------------------------

    /// Turns one stream push into a stored message, if it carries one.
    pub async fn handle_stream_event(&self, event: &StreamEvent) -> Option<NormalizedMessage> {
        match event.event.as_str() {
            "newChatMessage" => {
                let chat = parse_chat(&event.data)?;
                let is_vip = chat.tokens >= VIP_TOKEN_THRESHOLD || chat.is_king || chat.is_knight;
                let raw = RawMessage::from_chat(&self.account_id, &self.cast_name, &chat, is_vip, self.session_id());
                let message = normalize_message(&raw)?;
                if message.tokens > 0 {
                    info!("[Stream] {}: TIP {} {}tk", self.cast_name, message.user_name, message.tokens);
                }
                self.record(message).await
            }
            "newModelEvent" => {
                let kind = event
                    .data
                    .get("event")
                    .or_else(|| event.data.get("type"))
                    .and_then(as_text)
                    .unwrap_or_else(|| "unknown".to_string());
                info!("[Stream] {}: model event {}", self.cast_name, kind);
                let mut metadata = Map::new();
                metadata.insert("source".into(), json!("stream"));
                metadata.insert("event".into(), json!(kind));
                metadata.insert("rawData".into(), event.data.clone());
                self.record_system(format!("Model event: {}", kind), metadata).await
            }
            "userUpdated" => {
                debug!("[Stream] {}: user updated", self.cast_name);
                None
            }
            other => {
                trace!("[Stream] {}: ignoring {} push", self.cast_name, other);
                None
            }
        }
    }

    async fn record(&self, message: NormalizedMessage) -> Option<NormalizedMessage> {
        {
            let mut st = self.state.lock();
            st.message_count += 1;
            st.tip_total += message.tokens;
        }
        self.writer.push(message.clone()).await;
        self.bus.publish(LiveEvent::Message(message.clone())).await;
        Some(message)
    }

    async fn record_system(&self, text: String, metadata: Map<String, Value>) -> Option<NormalizedMessage> {
        let raw = RawMessage {
            account_id: json!(self.account_id),
            cast_name: json!(self.cast_name),
            message_time: json!(Utc::now().to_rfc3339()),
            kind: json!("system"),
            user_name: json!(SYSTEM_USER),
            message: json!(text),
            tokens: json!(0),
            is_vip: json!(false),
            session_id: self.session_id().map(|s| json!(s.to_string())).unwrap_or(Value::Null),
            metadata: Value::Object(metadata),
            ..RawMessage::default()
        };
        let message = normalize_message(&raw)?;
        self.writer.push(message.clone()).await;
        Some(message)
    }

    // ---------------------------------------------------------------
    // Viewer list
    // ---------------------------------------------------------------

    /// Parses and stores one viewer-list response. Returns the normalized viewers.
    pub async fn handle_viewer_body(&self, body: &Value) -> Vec<NormalizedViewer> {
        let entries = parse_viewer_list(body);
        let (viewers, session_id) = {
            let mut st = self.state.lock();
            let viewers = normalize_viewers(&entries, Some(&st.known));
            st.known.extend(viewers.iter().map(|v| v.user_name.clone()));
            (viewers, st.session_id)
        };
        if viewers.is_empty() {
            return viewers;
        }

        let fresh = viewers.iter().filter(|v| v.is_new).count();
        info!("[Stream] {}: {} viewers ({} new)", self.cast_name, viewers.len(), fresh);

        if let Err(e) = self
            .events
            .upsert_viewers(&self.account_id, &self.cast_name, session_id, &viewers)
            .await
        {
            warn!("[DB] {}: viewer upsert failed: {}", self.cast_name, e);
        }
        self.profiles.observe_all(&self.cast_name, &viewers);
        self.bus
            .publish(LiveEvent::ViewerSnapshot {
                account_id: self.account_id.clone(),
                cast_name: self.cast_name.clone(),
                viewers: viewers.clone(),
            })
            .await;
        viewers
    }

    // ---------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------

    /// Applies one status poll and opens or closes the session on a transition.
    pub async fn handle_status(&self, result: &StatusResult) -> StatusChange {
        if result.status == CastStatus::Unknown {
            return StatusChange::Unchanged;
        }
        let online = result.status.is_online();
        let previous = {
            let mut st = self.state.lock();
            if let Some(id) = &result.model_id {
                st.model_id = Some(id.clone());
            }
            st.viewer_count = result.viewer_count;
            st.online.replace(online)
        };

        match (previous, online) {
            (Some(false), true) => {
                let session_id = self.open_session(result, true).await;
                if let Some(id) = session_id {
                    self.bus
                        .publish(LiveEvent::SessionStarted {
                            account_id: self.account_id.clone(),
                            cast_name: self.cast_name.clone(),
                            session_id: id,
                        })
                        .await;
                }
                StatusChange::WentLive { session_id }
            }
            (None, true) => {
                let session_id = self.open_session(result, false).await;
                StatusChange::AlreadyLive { session_id }
            }
            (Some(true), false) => StatusChange::WentOffline {
                session_id: self.close_session().await,
            },
            _ => StatusChange::Unchanged,
        }
    }

    async fn open_session(&self, result: &StatusResult, close_stale: bool) -> Option<Uuid> {
        let now = Utc::now();
        info!("[Stream] {}: LIVE ({:?}, {} viewers)", self.cast_name, result.status, result.viewer_count);

        if close_stale {
            match self.events.close_stale_sessions(&self.account_id, &self.cast_name).await {
                Ok(0) => {}
                Ok(n) => info!("[DB] {}: closed {} stale sessions", self.cast_name, n),
                Err(e) => warn!("[DB] {}: closing stale sessions failed: {}", self.cast_name, e),
            }
        }

        let raw = RawSession {
            session_id: json!(session_id_for(&self.cast_name, now).to_string()),
            account_id: json!(self.account_id),
            cast_name: json!(self.cast_name),
            started_at: json!(now.to_rfc3339()),
            ended_at: Value::Null,
        };
        let session_id = match normalize_session(&raw) {
            Some(session) => match self.events.open_session(&session).await {
                Ok(id) => Some(id),
                Err(e) => {
                    error!("[DB] {}: opening session failed: {}", self.cast_name, e);
                    None
                }
            },
            None => {
                warn!(
                    "[Stream] {}: account id {} is not a UUID; running without a session",
                    self.cast_name, self.account_id
                );
                None
            }
        };

        {
            let mut st = self.state.lock();
            st.session_id = session_id;
            st.message_count = 0;
            st.tip_total = 0;
        }

        let mut metadata = Map::new();
        metadata.insert("source".into(), json!("collector"));
        metadata.insert("modelId".into(), json!(result.model_id));
        metadata.insert("viewerCount".into(), json!(result.viewer_count));
        let status = match &result.status {
            CastStatus::Private => "private",
            CastStatus::P2p => "p2p",
            _ => "public",
        };
        self.record_system(
            format!("Stream start detected ({}, {} viewers)", status, result.viewer_count),
            metadata,
        )
        .await;
        session_id
    }

    async fn close_session(&self) -> Option<Uuid> {
        let (session_id, messages, tips, viewers) = {
            let st = self.state.lock();
            (st.session_id, st.message_count, st.tip_total, st.viewer_count)
        };
        info!("[Stream] {}: OFFLINE ({} messages, {}tk)", self.cast_name, messages, tips);

        let mut metadata = Map::new();
        metadata.insert("source".into(), json!("collector"));
        metadata.insert("lastViewerCount".into(), json!(viewers));
        self.record_system(
            format!("Stream end detected ({} messages, {}tk)", messages, tips),
            metadata,
        )
        .await;

        if let Some(id) = session_id {
            if let Err(e) = self.events.close_session(id, Utc::now()).await {
                error!("[DB] {}: closing session {} failed: {}", self.cast_name, id, e);
            }
        }
        self.state.lock().session_id = None;

        self.bus
            .publish(LiveEvent::SessionEnded {
                account_id: self.account_id.clone(),
                cast_name: self.cast_name.clone(),
                session_id,
            })
            .await;
        session_id
    }

    // ---------------------------------------------------------------
    // Run loop
    // ---------------------------------------------------------------

    /// Polls status and viewers and keeps the stream connected while live.
    pub async fn run(self: Arc<Self>, deps: MonitorDeps, mut shutdown_rx: watch::Receiver<bool>) {
        match deps.profile_repo.known_viewers(&self.account_id, &self.cast_name).await {
            Ok(names) => {
                debug!("[Stream] {}: seeded {} known viewers", self.cast_name, names.len());
                self.seed_known(names);
            }
            Err(e) => warn!("[Stream] {}: loading known viewers failed: {}", self.cast_name, e),
        }

        let (events_tx, mut events_rx) = mpsc::channel::<StreamEvent>(1024);
        let mut stream: Option<(JoinHandle<()>, watch::Sender<bool>)> = None;

        let mut status_tick = interval(deps.poll.status_interval);
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut viewer_tick = interval(deps.poll.viewer_interval);
        viewer_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("[Stream] {}: monitor started", self.cast_name);
        loop {
            tokio::select! {
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = status_tick.tick() => {
                    let change = self.poll_status(&deps).await;
                    if change.is_live() && stream.is_none() {
                        stream = self.start_stream(&deps, events_tx.clone()).await;
                    } else if matches!(change, StatusChange::WentOffline { .. }) {
                        stop_stream(&mut stream).await;
                    }
                }
                _ = viewer_tick.tick() => {
                    if self.is_online() {
                        self.poll_viewers(&deps).await;
                    }
                }
                Some(event) = events_rx.recv() => {
                    self.handle_stream_event(&event).await;
                }
            }
        }

        stop_stream(&mut stream).await;
        info!("[Stream] {}: monitor stopped", self.cast_name);
    }

    async fn poll_status(&self, deps: &MonitorDeps) -> StatusChange {
        let key = format!("status:{}", self.cast_name);
        let cf = deps.broker.snapshot().map(|c| c.cf_clearance).filter(|c| !c.is_empty());
        let result = deps.rest.poll_status(&self.cast_name, cf.as_deref()).await;
        if result.status == CastStatus::Unknown {
            deps.retry.record_failure(&key);
            debug!(
                "[Stream] {}: status unknown ({} consecutive)",
                self.cast_name,
                deps.retry.failure_count(&key)
            );
        } else {
            deps.retry.record_success(&key);
        }
        self.handle_status(&result).await
    }

    async fn poll_viewers(&self, deps: &MonitorDeps) {
        let key = format!("viewers:{}", self.cast_name);
        let cred = deps.broker.get_credential(Some(&self.cast_name)).await;
        let bearer = (!cred.is_empty()).then(|| cred.jwt.clone());
        let cookie = (!cred.cf_clearance.is_empty()).then(|| format!("cf_clearance={}", cred.cf_clearance));

        match deps
            .rest
            .fetch_viewers(&self.cast_name, bearer.as_deref(), cookie.as_deref())
            .await
        {
            Ok(body) => {
                if self.handle_viewer_body(&body).await.is_empty() {
                    deps.retry.record_failure(&key);
                } else {
                    deps.retry.record_success(&key);
                }
            }
            Err(e) => {
                deps.retry.record_failure(&key);
                warn!("[Rest] {}: viewer poll failed: {}", self.cast_name, e);
            }
        }
    }

    async fn start_stream(
        &self,
        deps: &MonitorDeps,
        events_tx: mpsc::Sender<StreamEvent>,
    ) -> Option<(JoinHandle<()>, watch::Sender<bool>)> {
        let model_id = match self.model_id() {
            Some(id) => id,
            None => match deps.rest.resolve_model_id(&self.cast_name).await {
                Ok(Some(id)) => {
                    self.state.lock().model_id = Some(id.clone());
                    id
                }
                Ok(None) => {
                    warn!("[Stream] {}: model id unknown; chat not collected", self.cast_name);
                    return None;
                }
                Err(e) => {
                    warn!("[Stream] {}: model id lookup failed: {}", self.cast_name, e);
                    return None;
                }
            },
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let client = StreamClient::new(
            StreamTarget { cast_name: self.cast_name.clone(), model_id },
            deps.broker.clone(),
            deps.retry.clone(),
            events_tx,
            deps.stream_config.clone(),
        );
        let handle = tokio::spawn(client.run(stop_rx));
        Some((handle, stop_tx))
    }
}

async fn stop_stream(stream: &mut Option<(JoinHandle<()>, watch::Sender<bool>)>) {
    if let Some((handle, stop_tx)) = stream.take() {
        let _ = stop_tx.send(true);
        if let Err(e) = handle.await {
            error!("[Stream] stream task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_utils::MemoryRepos;
    use livespot_common::models::MessageKind;

    const ACCOUNT: &str = "5b1f7c3e-2a4d-4e8b-9c6f-0d1e2f3a4b5c";

    struct Fixture {
        repos: Arc<MemoryRepos>,
        writer: Arc<BatchWriter>,
        profiles: Arc<ProfileAccumulator>,
        bus: EventBus,
        monitor: CastMonitor,
    }

    fn fixture(account: &str) -> Fixture {
        let repos = Arc::new(MemoryRepos::new());
        let writer = Arc::new(BatchWriter::new(repos.clone()));
        let profiles = Arc::new(ProfileAccumulator::new(MemoryStore::shared()));
        let bus = EventBus::new();
        let monitor = CastMonitor::new(
            account,
            "alice",
            Some("555".into()),
            repos.clone(),
            writer.clone(),
            profiles.clone(),
            bus.clone(),
        );
        Fixture { repos, writer, profiles, bus, monitor }
    }

    fn status(s: CastStatus) -> StatusResult {
        StatusResult { status: s, viewer_count: 42, model_id: Some("555".into()) }
    }

    fn chat_event(data: Value) -> StreamEvent {
        StreamEvent {
            cast_name: "alice".into(),
            event: "newChatMessage".into(),
            channel: "newChatMessage@555".into(),
            data,
        }
    }

    #[test]
    fn session_ids_are_stable_within_a_minute() {
        let a = DateTime::parse_from_rfc3339("2025-03-01T10:00:05Z").unwrap().with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2025-03-01T10:00:55Z").unwrap().with_timezone(&Utc);
        let c = DateTime::parse_from_rfc3339("2025-03-01T10:01:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(session_id_for("alice", a), session_id_for("alice", b));
        assert_ne!(session_id_for("alice", a), session_id_for("alice", c));
        assert_ne!(session_id_for("alice", a), session_id_for("bob", a));
    }

    #[tokio::test]
    async fn big_tip_is_vip() {
        let f = fixture(ACCOUNT);
        let msg = f
            .monitor
            .handle_stream_event(&chat_event(json!({
                "message": {
                    "type": "tip",
                    "userData": {"username": "whale"},
                    "details": {"amount": 1500, "body": ""}
                }
            })))
            .await
            .unwrap();
        assert_eq!(msg.kind, MessageKind::Tip);
        assert!(msg.is_vip);
        assert_eq!(f.writer.pending(), 1);
    }

    #[tokio::test]
    async fn small_chat_is_not_vip() {
        let f = fixture(ACCOUNT);
        let msg = f
            .monitor
            .handle_stream_event(&chat_event(json!({
                "message": {"type": "text", "userData": {"username": "fan"}, "details": {"body": "hello"}}
            })))
            .await
            .unwrap();
        assert_eq!(msg.kind, MessageKind::Chat);
        assert!(!msg.is_vip);
    }

    #[tokio::test]
    async fn model_event_becomes_system_row() {
        let f = fixture(ACCOUNT);
        let msg = f
            .monitor
            .handle_stream_event(&StreamEvent {
                cast_name: "alice".into(),
                event: "newModelEvent".into(),
                channel: "newModelEvent@555".into(),
                data: json!({"event": "goalReached"}),
            })
            .await
            .unwrap();
        assert_eq!(msg.kind, MessageKind::System);
        assert_eq!(msg.user_name, SYSTEM_USER);
        assert_eq!(msg.message, "Model event: goalReached");
    }

    #[tokio::test]
    async fn viewer_poll_flags_new_and_feeds_profiles() {
        let f = fixture(ACCOUNT);
        f.monitor.seed_known(vec!["regular".to_string()]);
        let mut rx = f.bus.subscribe(Some(8)).await;

        let body = json!({"members": [
            {"user": {"id": 1, "username": "regular", "userRanking": {"league": "gold", "level": 10}}},
            {"user": {"id": 2, "username": "newbie"}}
        ]});
        let viewers = f.monitor.handle_viewer_body(&body).await;
        assert_eq!(viewers.len(), 2);
        assert!(!viewers[0].is_new);
        assert!(viewers[1].is_new);
        assert_eq!(f.repos.viewer_rows(), 2);
        assert_eq!(f.profiles.len(), 2);
        assert!(matches!(rx.try_recv(), Ok(LiveEvent::ViewerSnapshot { .. })));

        // Seen once, no longer new.
        let again = f.monitor.handle_viewer_body(&body).await;
        assert!(again.iter().all(|v| !v.is_new));
    }

    #[tokio::test]
    async fn offline_to_live_opens_session_and_announces_it() {
        let f = fixture(ACCOUNT);
        let mut rx = f.bus.subscribe(Some(8)).await;

        assert_eq!(f.monitor.handle_status(&status(CastStatus::Off)).await, StatusChange::Unchanged);
        let change = f.monitor.handle_status(&status(CastStatus::Public)).await;
        let StatusChange::WentLive { session_id: Some(id) } = change else {
            panic!("expected a live transition with a session, got {:?}", change);
        };
        assert_eq!(f.monitor.session_id(), Some(id));
        assert_eq!(f.repos.sessions().len(), 1);
        assert!(matches!(rx.try_recv(), Ok(LiveEvent::SessionStarted { session_id, .. }) if session_id == id));

        let change = f.monitor.handle_status(&status(CastStatus::Off)).await;
        assert_eq!(change, StatusChange::WentOffline { session_id: Some(id) });
        assert!(f.repos.sessions()[0].ended_at.is_some());
        assert!(f.monitor.session_id().is_none());
        assert!(matches!(rx.try_recv(), Ok(LiveEvent::SessionEnded { session_id: Some(s), .. }) if s == id));
    }

    #[tokio::test]
    async fn live_at_startup_reuses_open_session_quietly() {
        let f = fixture(ACCOUNT);
        let mut rx = f.bus.subscribe(Some(8)).await;

        let change = f.monitor.handle_status(&status(CastStatus::Private)).await;
        assert!(matches!(change, StatusChange::AlreadyLive { session_id: Some(_) }));
        assert!(rx.try_recv().is_err());
        assert_eq!(f.monitor.handle_status(&status(CastStatus::Public)).await, StatusChange::Unchanged);
    }

    #[tokio::test]
    async fn unknown_status_changes_nothing() {
        let f = fixture(ACCOUNT);
        let change = f
            .monitor
            .handle_status(&StatusResult { status: CastStatus::Unknown, viewer_count: 0, model_id: None })
            .await;
        assert_eq!(change, StatusChange::Unchanged);
        assert!(!f.monitor.is_online());
    }

    #[tokio::test]
    async fn non_uuid_account_runs_without_session() {
        let f = fixture("acct-1");
        f.monitor.handle_status(&status(CastStatus::Off)).await;
        let change = f.monitor.handle_status(&status(CastStatus::Public)).await;
        assert_eq!(change, StatusChange::WentLive { session_id: None });
        assert!(f.repos.sessions().is_empty());
        assert!(f.monitor.is_online());
    }

    #[tokio::test]
    async fn messages_carry_the_open_session() {
        let f = fixture(ACCOUNT);
        f.monitor.handle_status(&status(CastStatus::Off)).await;
        f.monitor.handle_status(&status(CastStatus::Public)).await;
        let session = f.monitor.session_id();
        let msg = f
            .monitor
            .handle_stream_event(&chat_event(json!({
                "message": {"type": "text", "userData": {"username": "fan"}, "details": {"body": "hi"}}
            })))
            .await
            .unwrap();
        assert_eq!(msg.session_id, session);
        f.writer.flush().await.unwrap();
        // start system row + chat row
        assert_eq!(f.repos.messages().len(), 2);
    }
}
