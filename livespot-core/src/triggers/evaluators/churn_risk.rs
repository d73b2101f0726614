use chrono::{Duration, Utc};
use tracing::info;

use livespot_common::models::{Trigger, TriggerContext};
use livespot_common::traits::ProfileRepository;
use crate::utils::time::days_since;
use crate::Error;
use super::EvaluationResult;

pub const DEFAULT_ABSENCE_DAYS: i64 = 14;
pub const DEFAULT_MIN_TOTAL_TOKENS: i64 = 300;

/// Established spenders at own casts who have not been seen for `absence_days`.
pub async fn evaluate(
    trigger: &Trigger,
    account_id: &str,
    profiles: &dyn ProfileRepository,
    cap: usize,
) -> Result<EvaluationResult, Error> {
    let absence_days = trigger.condition_i64("absence_days", DEFAULT_ABSENCE_DAYS);
    let min_total = trigger.condition_i64("min_total_tokens", DEFAULT_MIN_TOTAL_TOKENS);
    let now = Utc::now();
    let cutoff = now - Duration::days(absence_days);

    let rows = profiles
        .dormant_own_profiles(account_id, None, min_total, cutoff, cap as i64)
        .await?;

    let targets: Vec<TriggerContext> = rows
        .into_iter()
        .map(|row| {
            let cast = trigger.cast_name.clone().unwrap_or_else(|| row.cast_name.clone());
            TriggerContext {
                total_tokens: Some(row.total_tokens),
                days_since_last_visit: row.last_seen.map(|seen| days_since(seen, now)),
                ..TriggerContext::new(account_id, &cast, &row.user_name)
            }
        })
        .collect();

    if !targets.is_empty() {
        info!(
            "[Trigger] churn_risk: {} dormant users (>{}d, >={} tk)",
            targets.len(),
            absence_days,
            min_total
        );
    }
    Ok(EvaluationResult::capped(targets, cap))
}
