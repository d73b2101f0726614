// livespot-core/src/platforms/stripchat/client.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, trace, warn};

use livespot_common::models::Credential;
use crate::auth::broker::{CredentialBroker, CACHE_MARGIN_SECS};
use crate::auth::sources::BROWSER_USER_AGENT;
use crate::retry::RetryTracker;
use crate::Error;
use super::frames::{self, Frame, AUTH_ERROR_CODE, CHANNELS, CONNECT_ID};
use super::ORIGIN;

/// One decoded push from a subscribed channel.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub cast_name: String,
    /// Channel name before `@`, e.g. `newChatMessage`.
    pub event: String,
    pub channel: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct StreamTarget {
    pub cast_name: String,
    pub model_id: String,
}

#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Window for the socket handshake and for the first frame after it.
    pub handshake_timeout: Duration,
    pub keepalive_interval: Duration,
    /// Minimum gap between credential refreshes caused by auth rejections.
    pub auth_debounce: Duration,
    pub client_name: String,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(25),
            auth_debounce: Duration::from_secs(10),
            client_name: "js".to_string(),
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Shutdown,
    /// Error frame or close with code 3501.
    AuthRejected,
    /// Credential entered the refresh margin; reconnect with a fresh one.
    Expiring,
    Closed,
}

/// What the socket loop should do after one text frame.
#[derive(Debug, Default)]
pub struct Reaction {
    pub replies: Vec<String>,
    pub events: Vec<StreamEvent>,
    pub authenticated: bool,
    pub end: Option<SessionEnd>,
}

/// Protocol state of one connection, independent of the socket.
#[derive(Debug)]
pub struct SessionState {
    cast_name: String,
    model_id: String,
    next_id: u64,
    authenticated: bool,
}

impl SessionState {
    pub fn new(target: &StreamTarget) -> Self {
        Self {
            cast_name: target.cast_name.clone(),
            model_id: target.model_id.clone(),
            next_id: CONNECT_ID + 1,
            authenticated: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn on_text(&mut self, text: &str) -> Reaction {
        let mut reaction = Reaction::default();
        for piece in frames::split_frames(text) {
            let value: Value = match serde_json::from_str(piece) {
                Ok(v) => v,
                Err(e) => {
                    debug!("[Stream] {}: unparseable frame dropped: {}", self.cast_name, e);
                    continue;
                }
            };
            match frames::classify(&value) {
                Frame::Heartbeat => reaction.replies.push("{}".to_string()),
                Frame::ConnectAck { id } if id == CONNECT_ID => {
                    self.authenticated = true;
                    reaction.authenticated = true;
                    for ch in CHANNELS {
                        let channel = format!("{}@{}", ch, self.model_id);
                        reaction.replies.push(frames::subscribe_request(&channel, self.next_id));
                        self.next_id += 1;
                    }
                }
                Frame::ConnectAck { id } | Frame::Reply { id } => {
                    trace!("[Stream] {}: reply to #{}", self.cast_name, id);
                }
                Frame::Error { id, code, message } => {
                    if code == AUTH_ERROR_CODE && (id == Some(CONNECT_ID) || !self.authenticated) {
                        warn!("[Stream] {}: auth rejected ({}: {})", self.cast_name, code, message);
                        reaction.end = Some(SessionEnd::AuthRejected);
                    } else if id == Some(CONNECT_ID) {
                        warn!("[Stream] {}: connect failed ({}: {})", self.cast_name, code, message);
                        reaction.end = Some(SessionEnd::Closed);
                    } else {
                        warn!("[Stream] {}: error reply #{:?} ({}: {})", self.cast_name, id, code, message);
                    }
                }
                Frame::Push { channel, event, data } => reaction.events.push(StreamEvent {
                    cast_name: self.cast_name.clone(),
                    event,
                    channel,
                    data,
                }),
                Frame::Other(v) => trace!("[Stream] {}: unhandled frame {}", self.cast_name, v),
            }
        }
        reaction
    }
}

/// Keeps one cast's stream connection alive for the life of the process.
pub struct StreamClient {
    target: StreamTarget,
    broker: Arc<CredentialBroker>,
    retry: RetryTracker,
    events_tx: mpsc::Sender<StreamEvent>,
    config: StreamClientConfig,
    last_auth_refresh: Mutex<Option<Instant>>,
}

impl StreamClient {
    pub fn new(
        target: StreamTarget,
        broker: Arc<CredentialBroker>,
        retry: RetryTracker,
        events_tx: mpsc::Sender<StreamEvent>,
        config: StreamClientConfig,
    ) -> Self {
        Self {
            target,
            broker,
            retry,
            events_tx,
            config,
            last_auth_refresh: Mutex::new(None),
        }
    }

    fn retry_key(&self) -> String {
        format!("stream:{}", self.target.cast_name)
    }

    /// Connect/reconnect loop. Returns only on shutdown or when the event receiver is gone.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let key = self.retry_key();
        info!("[Stream] {} (model {}) starting", self.target.cast_name, self.target.model_id);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let cred = self.broker.get_credential(Some(&self.target.cast_name)).await;
            if cred.is_empty() {
                warn!("[Stream] {}: no valid credential; backing off", self.target.cast_name);
                if self.back_off(&key, &mut shutdown_rx).await {
                    break;
                }
                continue;
            }

            match self.run_session(&cred, &mut shutdown_rx).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Expiring) => {
                    info!("[Stream] {}: credential near expiry; reconnecting", self.target.cast_name);
                }
                Ok(SessionEnd::AuthRejected) => {
                    self.handle_auth_rejection().await;
                }
                Ok(SessionEnd::Closed) => {
                    info!("[Stream] {}: connection closed", self.target.cast_name);
                }
                Err(e) => {
                    warn!("[Stream] {}: connection failed: {}", self.target.cast_name, e);
                }
            }
            if self.back_off(&key, &mut shutdown_rx).await {
                break;
            }
        }
        info!("[Stream] {} stopped", self.target.cast_name);
    }

    /// Sleeps per the retry policy. Returns true if shutdown was signalled meanwhile.
    async fn back_off(&self, key: &str, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        let mut delay = self.retry.get_delay(key);
        if !self.retry.record_failure(key) {
            error!(
                "[Stream] {}: retries exhausted; cooling down for {:?}",
                self.target.cast_name,
                self.retry.config().max_delay
            );
            delay = self.retry.config().max_delay;
            self.retry.reset(key);
        }
        debug!("[Stream] {}: reconnecting in {:?}", self.target.cast_name, delay);
        tokio::select! {
            _ = sleep(delay) => false,
            _ = shutdown_rx.changed() => true,
        }
    }

    /// Invalidates and refreshes the credential, at most once per debounce window.
    async fn handle_auth_rejection(&self) {
        let mut last = self.last_auth_refresh.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < self.config.auth_debounce {
                debug!("[Stream] {}: auth refresh debounced", self.target.cast_name);
                return;
            }
        }
        *last = Some(Instant::now());
        drop(last);

        self.broker.invalidate().await;
        let fresh = self.broker.get_credential(Some(&self.target.cast_name)).await;
        if fresh.is_empty() {
            error!("[Stream] {}: refresh after auth rejection failed", self.target.cast_name);
        } else {
            self.retry.reset_by_prefix("stream:");
        }
    }

    async fn run_session(
        &self,
        cred: &Credential,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, Error> {
        let mut request = cred.ws_url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("User-Agent", HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert("Origin", HeaderValue::from_static(ORIGIN));
        if !cred.cf_clearance.is_empty() {
            let cookie = HeaderValue::from_str(&format!("cf_clearance={}", cred.cf_clearance))
                .map_err(|e| Error::Platform(format!("bad clearance cookie: {}", e)))?;
            headers.insert("Cookie", cookie);
        }

        let (ws_stream, _) = timeout(self.config.handshake_timeout, connect_async(request)).await??;
        info!("[Stream] {}: connected → {}", self.target.cast_name, cred.ws_url);
        let (mut write, mut read) = ws_stream.split();

        let connect = frames::connect_request(&cred.jwt, &self.config.client_name, CONNECT_ID);
        write.send(Message::Text(connect.into())).await?;

        let mut state = SessionState::new(&self.target);
        let mut keepalive = interval(self.config.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // A credential that arrives already inside the margin is the best the
        // broker has; ride it until the server rejects it.
        let renew_at = renewal_delay(cred, Utc::now().timestamp());
        if renew_at.is_none() {
            warn!("[Stream] {}: credential already inside the refresh margin", self.target.cast_name);
        }
        let expiring = sleep(renew_at.unwrap_or(Duration::from_secs(86_400)));
        tokio::pin!(expiring);

        let key = self.retry_key();
        let mut first_frame = true;

        loop {
            let next = if first_frame {
                match timeout(self.config.handshake_timeout, read.next()).await {
                    Ok(m) => m,
                    Err(_) => {
                        warn!("[Stream] {}: no frame within {:?}", self.target.cast_name, self.config.handshake_timeout);
                        let _ = write.close().await;
                        return Ok(SessionEnd::Closed);
                    }
                }
            } else {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        let _ = write.close().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                    _ = &mut expiring, if renew_at.is_some() => {
                        let _ = write.close().await;
                        return Ok(SessionEnd::Expiring);
                    }
                    _ = keepalive.tick(), if state.is_authenticated() => {
                        write.send(Message::Text("{}".into())).await?;
                        continue;
                    }
                    m = read.next() => m,
                }
            };
            first_frame = false;

            let msg = match next {
                Some(Ok(m)) => m,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(SessionEnd::Closed),
            };

            match msg {
                Message::Text(text) => {
                    let reaction = state.on_text(text.as_str());
                    for reply in reaction.replies {
                        write.send(Message::Text(reply.into())).await?;
                    }
                    if reaction.authenticated {
                        info!("[Stream] {}: authenticated; subscribed to {} channels", self.target.cast_name, CHANNELS.len());
                        self.retry.record_success(&key);
                        keepalive.reset();
                    }
                    for event in reaction.events {
                        if self.events_tx.send(event).await.is_err() {
                            warn!("[Stream] {}: event receiver dropped", self.target.cast_name);
                            let _ = write.close().await;
                            return Ok(SessionEnd::Shutdown);
                        }
                    }
                    if let Some(end) = reaction.end {
                        let _ = write.close().await;
                        return Ok(end);
                    }
                }
                Message::Close(frame) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(1005);
                    info!("[Stream] {}: server closed (code {})", self.target.cast_name, code);
                    return Ok(if i64::from(code) == AUTH_ERROR_CODE {
                        SessionEnd::AuthRejected
                    } else {
                        SessionEnd::Closed
                    });
                }
                Message::Ping(payload) => {
                    write.send(Message::Pong(payload)).await?;
                }
                _ => {}
            }
        }
    }
}

/// Time until the proactive reconnect, or `None` when the credential is
/// already inside [`CACHE_MARGIN_SECS`].
fn renewal_delay(cred: &Credential, now: i64) -> Option<Duration> {
    let secs = cred.expires_at - CACHE_MARGIN_SECS - now;
    (secs > 0).then(|| Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(&StreamTarget { cast_name: "alice".into(), model_id: "42".into() })
    }

    #[test]
    fn renewal_waits_for_the_margin() {
        let mut cred = Credential::empty();
        cred.jwt = "t".into();
        cred.expires_at = 10_000;
        assert_eq!(renewal_delay(&cred, 10_000 - 400), Some(Duration::from_secs(100)));
        assert_eq!(renewal_delay(&cred, 10_000 - 300), None);
        assert_eq!(renewal_delay(&cred, 10_000 - 100), None);
    }

    #[test]
    fn heartbeat_is_echoed() {
        let r = state().on_text("{}");
        assert_eq!(r.replies, vec!["{}".to_string()]);
        assert!(r.end.is_none());
    }

    #[test]
    fn connect_ack_subscribes_model_channels() {
        let mut s = state();
        let r = s.on_text(r#"{"id":1,"connect":{"client":"abc","version":"3"}}"#);
        assert!(r.authenticated && s.is_authenticated());
        assert_eq!(r.replies.len(), CHANNELS.len());
        let first: Value = serde_json::from_str(&r.replies[0]).unwrap();
        assert_eq!(first["subscribe"]["channel"], "newChatMessage@42");
        assert_eq!(first["id"], 2);
    }

    #[test]
    fn auth_error_ends_session() {
        let r = state().on_text(r#"{"id":1,"error":{"code":3501,"message":"invalid token"}}"#);
        assert_eq!(r.end, Some(SessionEnd::AuthRejected));
    }

    #[test]
    fn subscription_error_after_auth_is_not_fatal() {
        let mut s = state();
        s.on_text(r#"{"id":1,"connect":{}}"#);
        let r = s.on_text(r#"{"id":3,"error":{"code":103,"message":"permission denied"}}"#);
        assert!(r.end.is_none());
    }

    #[test]
    fn multi_object_frame_yields_events_and_heartbeat() {
        let text = r#"{"push":{"channel":"newChatMessage@42","pub":{"data":{"message":{}}}}}{}"#;
        let r = state().on_text(text);
        assert_eq!(r.events.len(), 1);
        assert_eq!(r.events[0].event, "newChatMessage");
        assert_eq!(r.events[0].cast_name, "alice");
        assert_eq!(r.replies, vec!["{}".to_string()]);
    }
}
