use std::collections::HashMap;

use chrono::{Duration, Utc};
use tracing::info;

use livespot_common::models::{SpyProfileRow, Trigger, TriggerContext};
use livespot_common::traits::ProfileRepository;
use crate::utils::time::days_since;
use crate::Error;
use super::EvaluationResult;

pub const DEFAULT_MIN_SPY_TOKENS: i64 = 500;
pub const DEFAULT_DAYS_SINCE_OWN_VISIT: i64 = 7;
pub const CANDIDATE_LIMIT: i64 = 200;

/// Users spending at other casts who never came to an own cast, or stopped coming.
///
/// Never-seen users need the trigger's cast scope as the cast to write as;
/// without one they are skipped. Dormant users are addressed from the own
/// cast where they spent the most.
pub async fn evaluate(
    trigger: &Trigger,
    account_id: &str,
    profiles: &dyn ProfileRepository,
    cap: usize,
) -> Result<EvaluationResult, Error> {
    let min_spy = trigger.condition_i64("min_spy_tokens", DEFAULT_MIN_SPY_TOKENS);
    let dormant_days = trigger.condition_i64("days_since_own_visit", DEFAULT_DAYS_SINCE_OWN_VISIT);
    let now = Utc::now();
    let cutoff = now - Duration::days(dormant_days);

    let spenders = profiles.competitor_spenders(account_id, min_spy, CANDIDATE_LIMIT).await?;
    if spenders.is_empty() {
        return Ok(EvaluationResult::none());
    }
    let names: Vec<String> = spenders.iter().map(|s| s.user_name.clone()).collect();
    let own_rows = profiles.own_profiles_for_users(account_id, None, &names, 0).await?;

    let mut best_own: HashMap<String, SpyProfileRow> = HashMap::new();
    for row in own_rows {
        let better = best_own
            .get(&row.user_name)
            .map_or(true, |existing| row.total_tokens > existing.total_tokens);
        if better {
            best_own.insert(row.user_name.clone(), row);
        }
    }

    let mut targets = Vec::new();
    for spender in &spenders {
        match best_own.get(&spender.user_name) {
            None => {
                let Some(cast) = trigger.cast_name.as_deref() else { continue };
                targets.push(TriggerContext {
                    total_tokens: Some(spender.total_tokens),
                    ..TriggerContext::new(account_id, cast, &spender.user_name)
                });
            }
            Some(own) => {
                // Without a last visit there is nothing to call dormant.
                let dormant = own.last_seen.is_some_and(|seen| seen < cutoff);
                if dormant {
                    targets.push(TriggerContext {
                        total_tokens: Some(own.total_tokens),
                        days_since_last_visit: own.last_seen.map(|seen| days_since(seen, now)),
                        ..TriggerContext::new(account_id, &own.cast_name, &spender.user_name)
                    });
                }
            }
        }
    }

    let result = EvaluationResult::capped(targets, cap);
    if result.should_fire {
        info!("[Trigger] competitor_outflow: {} users active elsewhere but not here", result.targets.len());
    }
    Ok(result)
}
