//! Per-trigger firing constraints, read from the trigger log.
//!
//! Query failures fail safe: a cooldown or limit that cannot be checked is
//! treated as active, so the trigger does not fire.

use chrono::{DateTime, Utc};
use tracing::error;
use uuid::Uuid;

use livespot_common::traits::TriggerRepository;
use crate::utils::time::{hours_ago, jst_day_start};

pub async fn is_in_cooldown(
    repo: &dyn TriggerRepository,
    trigger_id: Uuid,
    user_name: &str,
    cooldown_hours: i64,
) -> bool {
    is_in_cooldown_at(repo, trigger_id, user_name, cooldown_hours, Utc::now()).await
}

pub async fn is_in_cooldown_at(
    repo: &dyn TriggerRepository,
    trigger_id: Uuid,
    user_name: &str,
    cooldown_hours: i64,
    now: DateTime<Utc>,
) -> bool {
    let since = hours_ago(now, cooldown_hours.max(0));
    match repo.has_fired_for_user_since(trigger_id, user_name, since).await {
        Ok(fired) => fired,
        Err(e) => {
            error!("[Trigger] cooldown check failed for {}: {}", trigger_id, e);
            true
        }
    }
}

/// Firings counted since the start of the current JST day.
pub async fn is_daily_limit_reached(repo: &dyn TriggerRepository, trigger_id: Uuid, daily_limit: i64) -> bool {
    match repo.count_fired_since(trigger_id, jst_day_start(Utc::now())).await {
        Ok(count) => count >= daily_limit,
        Err(e) => {
            error!("[Trigger] daily limit check failed for {}: {}", trigger_id, e);
            true
        }
    }
}

/// An empty allow-list or an unknown segment is allowed.
pub fn is_segment_allowed(target_segments: &[String], segment: Option<&str>) -> bool {
    match segment {
        _ if target_segments.is_empty() => true,
        None => true,
        Some(s) => target_segments.iter().any(|t| t == s),
    }
}
