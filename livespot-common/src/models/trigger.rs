// File: livespot-common/src/models/trigger.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_TRIGGER_PRIORITY: i32 = 100;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    FirstVisit,
    VipNoTip,
    ChurnRisk,
    SegmentUpgrade,
    CompetitorOutflow,
    PostSession,
    CrossPromotion,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerType::FirstVisit => "first_visit",
            TriggerType::VipNoTip => "vip_no_tip",
            TriggerType::ChurnRisk => "churn_risk",
            TriggerType::SegmentUpgrade => "segment_upgrade",
            TriggerType::CompetitorOutflow => "competitor_outflow",
            TriggerType::PostSession => "post_session",
            TriggerType::CrossPromotion => "cross_promotion",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TriggerType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_visit" => Ok(TriggerType::FirstVisit),
            "vip_no_tip" => Ok(TriggerType::VipNoTip),
            "churn_risk" => Ok(TriggerType::ChurnRisk),
            "segment_upgrade" => Ok(TriggerType::SegmentUpgrade),
            "competitor_outflow" => Ok(TriggerType::CompetitorOutflow),
            "post_session" => Ok(TriggerType::PostSession),
            "cross_promotion" => Ok(TriggerType::CrossPromotion),
            _ => Err(format!("Unknown trigger type: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    DirectDm,
    EnrollScenario,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::DirectDm => write!(f, "direct_dm"),
            ActionType::EnrollScenario => write!(f, "enroll_scenario"),
        }
    }
}

impl FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct_dm" => Ok(ActionType::DirectDm),
            "enroll_scenario" => Ok(ActionType::EnrollScenario),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Outcome recorded in the trigger log for each target.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    DmQueued,
    ScenarioEnrolled,
    SkippedCooldown,
    SkippedDuplicate,
    SkippedSegment,
    SkippedDailyLimit,
    Error,
}

impl ActionTaken {
    /// Outcomes that count toward cooldowns and daily limits.
    pub fn is_fired(&self) -> bool {
        matches!(self, ActionTaken::DmQueued | ActionTaken::ScenarioEnrolled)
    }
}

impl fmt::Display for ActionTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionTaken::DmQueued => "dm_queued",
            ActionTaken::ScenarioEnrolled => "scenario_enrolled",
            ActionTaken::SkippedCooldown => "skipped_cooldown",
            ActionTaken::SkippedDuplicate => "skipped_duplicate",
            ActionTaken::SkippedSegment => "skipped_segment",
            ActionTaken::SkippedDailyLimit => "skipped_daily_limit",
            ActionTaken::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A configured trigger. Edited by the admin surface, read-only here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Trigger {
    pub id: Uuid,
    pub account_id: String,
    pub name: String,
    pub trigger_type: TriggerType,
    /// When set, the trigger only applies to this cast.
    pub cast_name: Option<String>,
    pub condition_config: Value,
    pub action_type: ActionType,
    pub message_template: Option<String>,
    pub scenario_id: Option<Uuid>,
    pub target_segments: Vec<String>,
    pub cooldown_hours: i64,
    pub daily_limit: i64,
    pub enabled: bool,
    pub priority: i32,
}

impl Trigger {
    pub fn condition_i64(&self, key: &str, default: i64) -> i64 {
        match self.condition_config.get(key).and_then(|v| v.as_i64()) {
            Some(v) if v > 0 => v,
            _ => default,
        }
    }

    pub fn condition_strings(&self, key: &str) -> Vec<String> {
        self.condition_config
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Campaign tag stamped on outreach queued by this trigger.
    pub fn campaign_tag(&self) -> String {
        let id = self.id.to_string();
        format!("trigger_{}_{}", self.trigger_type, &id[..8])
    }
}

/// The resolved target of a firing trigger.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TriggerContext {
    pub account_id: String,
    pub cast_name: String,
    pub user_name: String,
    pub total_tokens: Option<i64>,
    pub session_tokens: Option<i64>,
    pub segment: Option<String>,
    pub previous_segment: Option<String>,
    pub days_since_last_visit: Option<i64>,
}

impl TriggerContext {
    pub fn new(account_id: &str, cast_name: &str, user_name: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            cast_name: cast_name.to_string(),
            user_name: user_name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TriggerLogEntry {
    pub trigger_id: Uuid,
    pub account_id: String,
    pub cast_name: String,
    pub user_name: String,
    pub action_taken: ActionTaken,
    pub outreach_id: Option<i64>,
    pub enrollment_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub metadata: Value,
    pub triggered_at: DateTime<Utc>,
}
