// File: livespot-common/src/models/profile.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cross-cast accumulator for one viewer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserProfile {
    pub user_name: String,
    pub user_id: Option<String>,
    pub league: Option<String>,
    pub level: i64,
    pub is_fan_club: bool,
    pub casts: Vec<String>,
    pub visits: u64,
    pub last_seen: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_name: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            user_id: None,
            league: None,
            level: 0,
            is_fan_club: false,
            casts: Vec::new(),
            visits: 0,
            last_seen: Utc::now(),
        }
    }
}

/// One `spy_user_profiles` row: a user's history at one cast.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SpyProfileRow {
    pub user_name: String,
    pub cast_name: String,
    pub total_tokens: i64,
    pub message_count: i64,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RegisteredCast {
    pub account_id: String,
    pub cast_name: String,
    pub platform_user_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SegmentMember {
    pub segment_id: String,
    pub user_name: String,
    pub total_coins: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionTipTotal {
    pub user_name: String,
    pub tokens: i64,
}
