use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info};

use livespot_common::models::{Trigger, TriggerContext};
use livespot_common::traits::ProfileRepository;
use crate::store::KeyedStore;
use crate::Error;
use super::EvaluationResult;

/// Tracks which viewers each (account, cast) has already seen.
pub struct FirstVisitEvaluator {
    known: Arc<dyn KeyedStore<String, HashSet<String>>>,
}

fn cast_key(account_id: &str, cast_name: &str) -> String {
    format!("{}:{}", account_id, cast_name)
}

impl FirstVisitEvaluator {
    pub fn new(known: Arc<dyn KeyedStore<String, HashSet<String>>>) -> Self {
        Self { known }
    }

    pub fn is_initialized(&self, account_id: &str, cast_name: &str) -> bool {
        self.known.contains(&cast_key(account_id, cast_name))
    }

    pub fn known_count(&self, account_id: &str, cast_name: &str) -> usize {
        self.known.get(&cast_key(account_id, cast_name)).map(|s| s.len()).unwrap_or(0)
    }

    /// Replaces the known set with the cast's stored viewer history.
    /// A failed load leaves an empty set so polling can continue.
    pub async fn initialize(&self, account_id: &str, cast_name: &str, profiles: &dyn ProfileRepository) {
        let set: HashSet<String> = match profiles.known_viewers(account_id, cast_name).await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                error!("[Trigger] loading known viewers for {} failed: {}", cast_name, e);
                HashSet::new()
            }
        };
        debug!("[Trigger] {} starts with {} known viewers", cast_name, set.len());
        self.known.insert(cast_key(account_id, cast_name), set);
    }

    /// Returns viewers not seen before and records them immediately, so the
    /// same poll cannot report them twice.
    pub async fn detect_new(
        &self,
        account_id: &str,
        cast_name: &str,
        viewers: &[String],
        profiles: &dyn ProfileRepository,
    ) -> Vec<String> {
        if !self.is_initialized(account_id, cast_name) {
            self.initialize(account_id, cast_name, profiles).await;
        }
        let mut fresh = Vec::new();
        self.known.upsert(cast_key(account_id, cast_name), HashSet::new(), &mut |set: &mut HashSet<String>| {
            for name in viewers {
                if set.insert(name.clone()) {
                    fresh.push(name.clone());
                }
            }
        });
        if !fresh.is_empty() {
            info!("[Trigger] first_visit: {} new viewers at {}", fresh.len(), cast_name);
        }
        fresh
    }

    pub fn targets(account_id: &str, cast_name: &str, new_viewers: &[String], cap: usize) -> EvaluationResult {
        let targets = new_viewers
            .iter()
            .map(|u| TriggerContext::new(account_id, cast_name, u))
            .collect();
        EvaluationResult::capped(targets, cap)
    }

    pub async fn evaluate(
        &self,
        _trigger: &Trigger,
        account_id: &str,
        cast_name: &str,
        viewers: &[String],
        profiles: &dyn ProfileRepository,
        cap: usize,
    ) -> Result<EvaluationResult, Error> {
        let fresh = self.detect_new(account_id, cast_name, viewers, profiles).await;
        Ok(Self::targets(account_id, cast_name, &fresh, cap))
    }
}
