// File: livespot-common/src/models/event.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    Tip,
    System,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Chat => write!(f, "chat"),
            MessageKind::Tip => write!(f, "tip"),
            MessageKind::System => write!(f, "system"),
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(MessageKind::Chat),
            "tip" => Ok(MessageKind::Tip),
            "system" => Ok(MessageKind::System),
            _ => Err(format!("Unknown message kind: {}", s)),
        }
    }
}

/// A chat frame after parsing, before validation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatEvent {
    pub user_name: String,
    pub message: String,
    pub tokens: i64,
    pub kind: MessageKind,
    /// Raw timestamp as the platform sent it; validated by the normalizer.
    pub message_time: String,
    pub user_league: Option<String>,
    pub user_level: Option<i64>,
    pub is_model: bool,
    pub is_king: bool,
    pub is_knight: bool,
    pub user_id: Option<String>,
    pub is_fan_club: bool,
}

/// Internal transaction kinds a tip record can map to.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TipKind {
    Tip,
    Gift,
    Private,
    Spy,
    Ticket,
    Group,
    Striptease,
    Cam2Cam,
    /// Source types outside the lookup table are kept verbatim.
    Other(String),
}

impl fmt::Display for TipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TipKind::Tip => write!(f, "tip"),
            TipKind::Gift => write!(f, "gift"),
            TipKind::Private => write!(f, "private"),
            TipKind::Spy => write!(f, "spy"),
            TipKind::Ticket => write!(f, "ticket"),
            TipKind::Group => write!(f, "group"),
            TipKind::Striptease => write!(f, "striptease"),
            TipKind::Cam2Cam => write!(f, "cam2cam"),
            TipKind::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TipEvent {
    pub user_name: String,
    pub tokens: i64,
    pub kind: TipKind,
    pub cast_name: Option<String>,
    pub date: Option<String>,
    pub source_detail: Option<String>,
}

/// One entry of a viewer-list snapshot, as parsed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ViewerEntry {
    pub user_name: String,
    pub user_id: Option<String>,
    pub league: Option<String>,
    pub level: Option<i64>,
    pub is_fan_club: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub account_id: String,
    pub cast_name: String,
    pub message_time: DateTime<Utc>,
    pub kind: MessageKind,
    pub user_name: String,
    pub message: String,
    pub tokens: i64,
    pub is_vip: bool,
    pub session_id: Option<Uuid>,
    pub user_league: Option<String>,
    pub user_level: Option<i64>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NormalizedViewer {
    pub user_name: String,
    pub user_id: String,
    pub league: String,
    pub level: i64,
    pub is_fan_club: bool,
    pub is_new: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NormalizedSession {
    pub session_id: Uuid,
    pub account_id: Uuid,
    pub cast_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
