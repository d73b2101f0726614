// livespot-core/src/outreach/api.rs

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use livespot_common::models::PlatformSession;

use crate::auth::sources::BROWSER_USER_AGENT;
use crate::extract::{first_text, FieldRule};
use crate::Error;

const API_BASE: &str = "https://ja.stripchat.com/api/front";
const LOOKUP_BASE: &str = "https://stripchat.com/api/front/v2/models/username";
const SEND_ORIGIN: &str = "https://ja.stripchat.com";
const DEFAULT_FRONT_VERSION: &str = "11.5.57";

/// Error bodies are cut to this many characters before they reach the queue.
const ERROR_BODY_LIMIT: usize = 500;

const CSRF_RULES: &[FieldRule] = &[
    FieldRule::new("csrfToken", &["csrfToken"]),
    FieldRule::new("config.csrfToken", &["config", "csrfToken"]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// The platform's direct-message surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutreachApi: Send + Sync {
    /// Username → platform user id. `Ok(None)` when the platform does not know the name.
    async fn resolve_user_id(&self, session: &PlatformSession, user_name: &str) -> Result<Option<String>, Error>;

    /// 401/403 come back as [`Error::SessionExpired`].
    async fn send_message(
        &self,
        session: &PlatformSession,
        target_user_id: &str,
        target_user_name: &str,
        message: &str,
    ) -> Result<SendReceipt, Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsrfInfo {
    pub token: String,
    pub timestamp: String,
    pub notify_timestamp: String,
}

impl CsrfInfo {
    /// The notify timestamp runs 36 hours ahead of `now`.
    pub fn at(token: String, now: DateTime<Utc>) -> Self {
        Self {
            token,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            notify_timestamp: (now + chrono::Duration::hours(36)).to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// 16 hex characters, unique per send.
pub fn new_uniq() -> String {
    format!("{:016x}", rand::rng().random::<u64>())
}

pub fn message_body(message: &str, csrf: &CsrfInfo, uniq: &str) -> Value {
    json!({
        "body": message,
        "csrfToken": csrf.token,
        "csrfTimestamp": csrf.timestamp,
        "csrfNotifyTimestamp": csrf.notify_timestamp,
        "uniq": uniq,
    })
}

/// Maps a send response onto a receipt or an error.
pub fn interpret_send_response(status: StatusCode, body: &Value) -> Result<SendReceipt, Error> {
    let detail: String = body.to_string().chars().take(ERROR_BODY_LIMIT).collect();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::SessionExpired(format!("HTTP {}: {}", status.as_u16(), detail)));
    }
    match body.get("message") {
        Some(msg) if status.is_success() && msg.is_object() => Ok(SendReceipt {
            message_id: first_text(msg, &[FieldRule::new("id", &["id"])]),
        }),
        _ => Err(Error::Platform(format!("send failed (HTTP {}): {}", status.as_u16(), detail))),
    }
}

/// Reqwest-backed client for the platform's conversation endpoints.
pub struct StripchatOutreachApi {
    client: reqwest::Client,
}

impl StripchatOutreachApi {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { client })
    }

    /// The session's stored token, else a fresh one from `/v2/config`.
    async fn csrf(&self, session: &PlatformSession) -> Result<CsrfInfo, Error> {
        if let Some(token) = session.csrf_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(CsrfInfo::at(token.clone(), Utc::now()));
        }
        let resp = self
            .client
            .get(format!("{}/v2/config", API_BASE))
            .header("Accept", "application/json")
            .header("Cookie", session.cookie_header())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Platform(format!("csrf fetch HTTP {}", resp.status().as_u16())));
        }
        let body: Value = resp.json().await?;
        first_text(&body, CSRF_RULES)
            .map(|token| CsrfInfo::at(token, Utc::now()))
            .ok_or_else(|| Error::Platform("csrf token not in config response".into()))
    }
}

#[async_trait]
impl OutreachApi for StripchatOutreachApi {
    async fn resolve_user_id(&self, session: &PlatformSession, user_name: &str) -> Result<Option<String>, Error> {
        let url = format!("{}/{}", LOOKUP_BASE, urlencoding::encode(user_name));
        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("Cookie", session.cookie_header())
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::Platform(format!("user lookup HTTP {}", resp.status().as_u16())));
        }
        let body: Value = resp.json().await?;
        let id = first_text(&body, &[FieldRule::new("user.id", &["user", "id"])]);
        debug!("[Outreach] resolved {} -> {:?}", user_name, id);
        Ok(id)
    }

    async fn send_message(
        &self,
        session: &PlatformSession,
        target_user_id: &str,
        target_user_name: &str,
        message: &str,
    ) -> Result<SendReceipt, Error> {
        let csrf = self.csrf(session).await?;
        let body = message_body(message, &csrf, &new_uniq());
        let url = format!(
            "{}/users/{}/conversations/{}/messages",
            API_BASE, session.platform_user_id, target_user_id
        );
        let referer_name = if target_user_name.is_empty() { target_user_id } else { target_user_name };

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Cookie", session.cookie_header())
            .header("Origin", SEND_ORIGIN)
            .header("Referer", format!("{}/user/{}", SEND_ORIGIN, referer_name))
            .header("front-version", DEFAULT_FRONT_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let parsed = resp.json::<Value>().await.unwrap_or_else(|e| {
            warn!("[Outreach] unreadable send response (HTTP {}): {}", status.as_u16(), e);
            Value::Object(Default::default())
        });
        interpret_send_response(status, &parsed)
    }
}
