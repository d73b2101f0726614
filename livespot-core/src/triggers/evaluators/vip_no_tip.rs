use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use livespot_common::models::{Trigger, TriggerContext};
use livespot_common::traits::ProfileRepository;
use crate::Error;
use super::EvaluationResult;

pub const DEFAULT_MIN_TOTAL_TOKENS: i64 = 1000;

/// Viewers of a finished session who did not tip there but are big spenders overall.
pub async fn evaluate(
    trigger: &Trigger,
    account_id: &str,
    cast_name: &str,
    session_id: Option<Uuid>,
    profiles: &dyn ProfileRepository,
    cap: usize,
) -> Result<EvaluationResult, Error> {
    let Some(session_id) = session_id else {
        return Ok(EvaluationResult::skipped("no session_id"));
    };
    let min_total = trigger.condition_i64("min_total_tokens", DEFAULT_MIN_TOTAL_TOKENS);

    let viewers = profiles.session_viewers(account_id, cast_name, session_id).await?;
    if viewers.is_empty() {
        return Ok(EvaluationResult::skipped("no viewers"));
    }
    let tippers: HashSet<String> = profiles
        .session_tippers(account_id, cast_name, session_id)
        .await?
        .into_iter()
        .collect();

    let silent: Vec<String> = viewers.into_iter().filter(|v| !tippers.contains(v)).collect();
    if silent.is_empty() {
        return Ok(EvaluationResult::none());
    }

    let rows = profiles
        .own_profiles_for_users(account_id, Some(cast_name), &silent, min_total)
        .await?;
    let targets: Vec<TriggerContext> = rows
        .into_iter()
        .map(|row| TriggerContext {
            total_tokens: Some(row.total_tokens),
            ..TriggerContext::new(account_id, cast_name, &row.user_name)
        })
        .collect();

    if !targets.is_empty() {
        info!("[Trigger] vip_no_tip: {} silent VIPs at {} ({})", targets.len(), cast_name, session_id);
    }
    Ok(EvaluationResult::capped(targets, cap))
}
