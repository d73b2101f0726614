use std::collections::BTreeMap;

use tracing::{debug, info};
use uuid::Uuid;

use livespot_common::models::{Trigger, TriggerContext};
use livespot_common::traits::ProfileRepository;
use crate::Error;
use super::EvaluationResult;

pub const DEFAULT_MIN_SESSION_TOKENS: i64 = 50;
pub const DEFAULT_DELAY_MINUTES: i64 = 30;

/// Users whose tips in the finished session reach `min_session_tokens`.
///
/// Uses the pre-aggregated totals when available and sums raw tip rows otherwise.
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
    let min_tokens = trigger.condition_i64("min_session_tokens", DEFAULT_MIN_SESSION_TOKENS);

    let totals: Vec<(String, i64)> = match profiles.session_token_totals(account_id, cast_name, session_id).await {
        Ok(rows) => rows.into_iter().map(|r| (r.user_name, r.tokens)).collect(),
        Err(e) => {
            debug!("[Trigger] aggregated session totals unavailable ({}); summing tips", e);
            let mut sums: BTreeMap<String, i64> = BTreeMap::new();
            for tip in profiles.session_tip_events(account_id, cast_name, session_id).await? {
                *sums.entry(tip.user_name).or_default() += tip.tokens;
            }
            sums.into_iter().collect()
        }
    };

    let targets: Vec<TriggerContext> = totals
        .into_iter()
        .filter(|(_, tokens)| *tokens >= min_tokens)
        .map(|(user, tokens)| TriggerContext {
            session_tokens: Some(tokens),
            ..TriggerContext::new(account_id, cast_name, &user)
        })
        .collect();

    if !targets.is_empty() {
        info!("[Trigger] post_session: {} tippers at {} ({})", targets.len(), cast_name, session_id);
    }
    Ok(EvaluationResult::capped(targets, cap))
}

pub fn delay_minutes(trigger: &Trigger) -> i64 {
    trigger.condition_i64("delay_minutes", DEFAULT_DELAY_MINUTES)
}
