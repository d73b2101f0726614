// File: livespot-common/src/models/credential.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Where a credential came from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    PageHtml,
    RestApi,
    Browser,
    Env,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::PageHtml => write!(f, "page_html"),
            AuthMethod::RestApi => write!(f, "rest_api"),
            AuthMethod::Browser => write!(f, "browser"),
            AuthMethod::Env => write!(f, "env"),
        }
    }
}

impl FromStr for AuthMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "page_html" => Ok(AuthMethod::PageHtml),
            "rest_api" => Ok(AuthMethod::RestApi),
            "browser" | "playwright" => Ok(AuthMethod::Browser),
            "env" => Ok(AuthMethod::Env),
            _ => Err(format!("Unknown auth method: {}", s)),
        }
    }
}

/// Short-lived material needed to open the stream connection.
///
/// Serialized in camelCase; this is also the on-disk record layout.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub jwt: String,
    pub cf_clearance: String,
    pub ws_url: String,
    pub user_id: String,
    /// Absolute expiry, unix seconds. Zero for the empty credential.
    pub expires_at: i64,
    pub method: Option<AuthMethod>,
    pub acquired_at: DateTime<Utc>,
    #[serde(default)]
    pub refresh_count: u64,
}

impl Credential {
    /// The "no valid credential" value handed out when every source failed.
    pub fn empty() -> Self {
        Self {
            jwt: String::new(),
            cf_clearance: String::new(),
            ws_url: String::new(),
            user_id: String::new(),
            expires_at: 0,
            method: None,
            acquired_at: Utc::now(),
            refresh_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jwt.is_empty()
    }

    pub fn expires_at_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires_at, 0).single()
    }

    /// Seconds until expiry, never negative.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now.timestamp()).max(0)
    }

    /// True while `now` is more than `margin_secs` before expiry.
    pub fn is_valid_with_margin(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        !self.is_empty() && now.timestamp() < self.expires_at - margin_secs
    }
}
