// livespot-core/src/platforms/stripchat/rest.rs

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::sources::BROWSER_USER_AGENT;
use crate::extract::{as_int, first_text, lookup, FieldRule};
use crate::Error;

const STATUS_URL_BASE: &str = "https://ja.stripchat.com/api/front/v2/models/username";
const FRONT_URL_BASE: &str = "https://stripchat.com/api/front/v2/models/username";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastStatus {
    Public,
    Private,
    P2p,
    Off,
    /// A status string we do not treat as live (e.g. `idle`, `groupShow`).
    Other(String),
    /// The poll itself failed; no information.
    Unknown,
}

impl CastStatus {
    pub fn from_platform(s: &str) -> Self {
        match s {
            "public" => CastStatus::Public,
            "private" => CastStatus::Private,
            "p2p" => CastStatus::P2p,
            "off" | "" => CastStatus::Off,
            other => CastStatus::Other(other.to_string()),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, CastStatus::Public | CastStatus::Private | CastStatus::P2p)
    }
}

#[derive(Debug, Clone)]
pub struct StatusResult {
    pub status: CastStatus,
    pub viewer_count: i64,
    pub model_id: Option<String>,
}

impl StatusResult {
    fn unknown() -> Self {
        Self { status: CastStatus::Unknown, viewer_count: 0, model_id: None }
    }
}

const VIEWER_COUNT_RULES: &[FieldRule] = &[
    FieldRule::new("user.viewersCount", &["user", "viewersCount"]),
    FieldRule::new("user.viewers", &["user", "viewers"]),
];

/// Parses a `/cam` response body.
pub fn status_from_body(body: &Value) -> StatusResult {
    let status = lookup(body, &["user", "status"])
        .and_then(|v| v.as_str())
        .map(CastStatus::from_platform)
        .unwrap_or(CastStatus::Off);
    let viewer_count = VIEWER_COUNT_RULES
        .iter()
        .find_map(|r| lookup(body, r.path).and_then(as_int))
        .unwrap_or(0);
    let model_id = first_text(body, &[FieldRule::new("user.id", &["user", "id"])]);
    StatusResult { status, viewer_count, model_id }
}

/// Unauthenticated REST polls against the platform front API.
#[derive(Clone)]
pub struct PlatformRest {
    client: reqwest::Client,
}

impl PlatformRest {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client })
    }

    /// Never fails: network or HTTP problems come back as [`CastStatus::Unknown`].
    pub async fn poll_status(&self, cast_name: &str, cf_clearance: Option<&str>) -> StatusResult {
        let url = format!("{}/{}/cam", STATUS_URL_BASE, urlencoding::encode(cast_name));
        let mut req = self.client.get(&url).header("Accept", "application/json");
        if let Some(cf) = cf_clearance.filter(|c| !c.is_empty()) {
            req = req.header("Cookie", format!("cf_clearance={}", cf));
        }
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("[Rest] {}: status poll failed: {}", cast_name, e);
                return StatusResult::unknown();
            }
        };
        match resp.status() {
            StatusCode::NOT_FOUND => {
                return StatusResult { status: CastStatus::Off, viewer_count: 0, model_id: None };
            }
            StatusCode::FORBIDDEN => {
                warn!("[Rest] {}: status poll blocked (403)", cast_name);
                return StatusResult::unknown();
            }
            s if !s.is_success() => {
                warn!("[Rest] {}: status poll HTTP {}", cast_name, s);
                return StatusResult::unknown();
            }
            _ => {}
        }
        match resp.json::<Value>().await {
            Ok(body) => status_from_body(&body),
            Err(e) => {
                warn!("[Rest] {}: status body unreadable: {}", cast_name, e);
                StatusResult::unknown()
            }
        }
    }

    /// Raw viewer-list body; callers hand it to the viewer parser.
    pub async fn fetch_viewers(
        &self,
        cast_name: &str,
        bearer: Option<&str>,
        cookie: Option<&str>,
    ) -> Result<Value, Error> {
        let url = format!("{}/{}/members", FRONT_URL_BASE, urlencoding::encode(cast_name));
        let mut req = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = bearer.filter(|t| !t.is_empty()) {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(c) = cookie.filter(|c| !c.is_empty()) {
            req = req.header("Cookie", c);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::SessionExpired(format!("viewer list HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(Error::Platform(format!("viewer list HTTP {}", status)));
        }
        let body = resp.json::<Value>().await?;
        debug!("[Rest] {}: viewer list fetched", cast_name);
        Ok(body)
    }

    /// Looks up a model's numeric id by user name.
    pub async fn resolve_model_id(&self, cast_name: &str) -> Result<Option<String>, Error> {
        let url = format!("{}/{}", FRONT_URL_BASE, urlencoding::encode(cast_name));
        let resp = self.client.get(&url).header("Accept", "application/json").send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::Platform(format!("model lookup HTTP {}", resp.status())));
        }
        let body = resp.json::<Value>().await?;
        Ok(first_text(&body, &[FieldRule::new("user.id", &["user", "id"])]))
    }
}
