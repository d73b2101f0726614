use std::collections::{BTreeMap, HashMap};

use tracing::info;

use livespot_common::models::{Trigger, TriggerContext};
use livespot_common::traits::{CastRepository, ProfileRepository};
use crate::Error;
use super::EvaluationResult;

pub const DEFAULT_MIN_VISITS_OTHER_CAST: i64 = 3;
pub const DEFAULT_MAX_VISITS_TARGET_CAST: i64 = 0;
/// Only the first few active casts (by name) are considered.
pub const MAX_CASTS: usize = 5;

/// For a regular at one own cast, proposes another own cast they rarely visit.
/// At most one promotion per user per run.
pub async fn evaluate(
    trigger: &Trigger,
    account_id: &str,
    casts: &dyn CastRepository,
    profiles: &dyn ProfileRepository,
    cap: usize,
) -> Result<EvaluationResult, Error> {
    let min_other = trigger.condition_i64("min_visits_other_cast", DEFAULT_MIN_VISITS_OTHER_CAST);
    let max_target = trigger.condition_i64("max_visits_target_cast", DEFAULT_MAX_VISITS_TARGET_CAST);

    let mut cast_names: Vec<String> = casts
        .registered_casts(account_id)
        .await?
        .into_iter()
        .filter(|c| c.is_active)
        .map(|c| c.cast_name)
        .collect();
    cast_names.sort();
    cast_names.truncate(MAX_CASTS);
    if cast_names.len() < 2 {
        return Ok(EvaluationResult::skipped("need at least 2 casts"));
    }

    let rows = profiles.own_visits(account_id, &cast_names, min_other).await?;

    // BTreeMap keeps the output order stable across runs.
    let mut visits: BTreeMap<String, HashMap<String, i64>> = BTreeMap::new();
    for row in rows {
        visits.entry(row.user_name).or_default().insert(row.cast_name, row.message_count);
    }

    let mut targets = Vec::new();
    for (user, per_cast) in &visits {
        let promoted = cast_names.iter().find(|target| {
            let here = per_cast.get(*target).copied().unwrap_or(0);
            here <= max_target
                && per_cast
                    .iter()
                    .any(|(other, count)| other != *target && *count >= min_other)
        });
        if let Some(target) = promoted {
            targets.push(TriggerContext::new(account_id, target, user));
        }
    }

    let result = EvaluationResult::capped(targets, cap);
    if result.should_fire {
        info!("[Trigger] cross_promotion: {} opportunities", result.targets.len());
    }
    Ok(result)
}
