// File: livespot-common/src/models/outreach.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue row lifecycle:
/// `queued -> sending -> success | error`, plus the terminal pre-send
/// rejections `blocked_test_mode` and `blocked_no_campaign`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutreachStatus {
    Queued,
    Sending,
    Success,
    Error,
    BlockedTestMode,
    BlockedNoCampaign,
}

impl OutreachStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutreachStatus::Queued | OutreachStatus::Sending)
    }
}

impl fmt::Display for OutreachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutreachStatus::Queued => "queued",
            OutreachStatus::Sending => "sending",
            OutreachStatus::Success => "success",
            OutreachStatus::Error => "error",
            OutreachStatus::BlockedTestMode => "blocked_test_mode",
            OutreachStatus::BlockedNoCampaign => "blocked_no_campaign",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for OutreachStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(OutreachStatus::Queued),
            "sending" => Ok(OutreachStatus::Sending),
            "success" => Ok(OutreachStatus::Success),
            "error" => Ok(OutreachStatus::Error),
            "blocked_test_mode" => Ok(OutreachStatus::BlockedTestMode),
            "blocked_no_campaign" => Ok(OutreachStatus::BlockedNoCampaign),
            _ => Err(format!("Unknown outreach status: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutreachRecord {
    pub id: i64,
    pub account_id: String,
    pub user_name: String,
    pub message: String,
    pub cast_name: String,
    pub status: OutreachStatus,
    pub campaign: Option<String>,
    pub target_user_id: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub sent_via: Option<String>,
}

/// Insert shape for a fresh queue row; status is always `queued`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewOutreachRecord {
    pub account_id: String,
    pub cast_name: String,
    pub user_name: String,
    pub message: String,
    pub campaign: String,
    pub template_name: Option<String>,
}

/// A logged-in platform session used to send outreach as a cast.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlatformSession {
    pub account_id: String,
    pub platform_user_id: String,
    pub session_cookie: String,
    pub csrf_token: Option<String>,
    /// Full cookie jar as `name -> value`; preferred over `session_cookie` when non-empty.
    pub cookies: std::collections::BTreeMap<String, String>,
}

impl PlatformSession {
    pub fn cookie_header(&self) -> String {
        if self.cookies.is_empty() {
            format!("stripchat_com_sessionId={}", self.session_cookie)
        } else {
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}
