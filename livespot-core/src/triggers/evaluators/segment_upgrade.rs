use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use livespot_common::models::{Trigger, TriggerContext};
use livespot_common::traits::{CastRepository, ProfileRepository};
use crate::store::KeyedStore;
use crate::Error;
use super::EvaluationResult;

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTransition {
    pub cast_name: String,
    pub user_name: String,
    pub from: String,
    pub to: String,
    pub total_coins: i64,
}

impl SegmentTransition {
    /// `"S5->S4"` form used in `track_upgrades`.
    pub fn label(&self) -> String {
        format!("{}->{}", self.from, self.to)
    }
}

/// Diffs user segments against the previous run's snapshot, per account.
pub struct SegmentUpgradeEvaluator {
    /// account id → `"cast:user"` → segment id
    snapshots: Arc<dyn KeyedStore<String, HashMap<String, String>>>,
}

impl SegmentUpgradeEvaluator {
    pub fn new(snapshots: Arc<dyn KeyedStore<String, HashMap<String, String>>>) -> Self {
        Self { snapshots }
    }

    async fn current(
        &self,
        account_id: &str,
        casts: &dyn CastRepository,
        profiles: &dyn ProfileRepository,
    ) -> Result<Vec<(String, String, String, i64)>, Error> {
        let mut out = Vec::new();
        for cast in casts.registered_casts(account_id).await? {
            if !cast.is_active {
                continue;
            }
            match profiles.user_segments(account_id, &cast.cast_name).await {
                Ok(members) => out.extend(
                    members
                        .into_iter()
                        .map(|m| (cast.cast_name.clone(), m.user_name, m.segment_id, m.total_coins)),
                ),
                Err(e) => warn!("[Trigger] segments for {} unavailable: {}", cast.cast_name, e),
            }
        }
        Ok(out)
    }

    /// Returns `None` on the first run for an account (snapshot only), else the
    /// transitions since the previous run. The snapshot is replaced either way.
    pub async fn scan(
        &self,
        account_id: &str,
        casts: &dyn CastRepository,
        profiles: &dyn ProfileRepository,
    ) -> Result<Option<Vec<SegmentTransition>>, Error> {
        let rows = self.current(account_id, casts, profiles).await?;
        let fresh: HashMap<String, String> = rows
            .iter()
            .map(|(cast, user, seg, _)| (format!("{}:{}", cast, user), seg.clone()))
            .collect();

        let Some(previous) = self.snapshots.insert(account_id.to_string(), fresh) else {
            info!("[Trigger] segment snapshot initialised for {}: {} users", account_id, rows.len());
            return Ok(None);
        };

        let transitions = rows
            .into_iter()
            .filter_map(|(cast, user, seg, coins)| {
                let before = previous.get(&format!("{}:{}", cast, user))?;
                (before != &seg).then(|| SegmentTransition {
                    cast_name: cast,
                    user_name: user,
                    from: before.clone(),
                    to: seg,
                    total_coins: coins,
                })
            })
            .collect();
        Ok(Some(transitions))
    }

    /// Targets for the transitions this trigger tracks.
    pub fn targets_for(
        trigger: &Trigger,
        account_id: &str,
        transitions: &[SegmentTransition],
        cap: usize,
    ) -> EvaluationResult {
        let tracked: HashSet<String> = trigger.condition_strings("track_upgrades").into_iter().collect();
        if tracked.is_empty() {
            return EvaluationResult::skipped("no track_upgrades configured");
        }
        let targets = transitions
            .iter()
            .filter(|t| tracked.contains(&t.label()))
            .filter(|t| trigger.cast_name.as_deref().map_or(true, |c| c == t.cast_name))
            .map(|t| TriggerContext {
                segment: Some(t.to.clone()),
                previous_segment: Some(t.from.clone()),
                total_tokens: Some(t.total_coins),
                ..TriggerContext::new(account_id, &t.cast_name, &t.user_name)
            })
            .collect();
        EvaluationResult::capped(targets, cap)
    }
}
