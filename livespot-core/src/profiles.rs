//! Cross-cast viewer profiles accumulated from viewer-list polls.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use livespot_common::models::{NormalizedViewer, UserProfile};
use livespot_common::traits::CastRepository;
use crate::store::KeyedStore;
use crate::Error;

pub struct ProfileAccumulator {
    profiles: Arc<dyn KeyedStore<String, UserProfile>>,
}

impl ProfileAccumulator {
    pub fn new(profiles: Arc<dyn KeyedStore<String, UserProfile>>) -> Self {
        Self { profiles }
    }

    /// Merges one sighting. League: newest non-empty wins. Level: max. Fan club: sticky.
    pub fn observe(&self, cast_name: &str, viewer: &NormalizedViewer) {
        let mut fresh = UserProfile::new(&viewer.user_name);
        fresh.user_id = Some(viewer.user_id.clone()).filter(|s| !s.is_empty());
        self.profiles.upsert(viewer.user_name.clone(), fresh, &mut |p: &mut UserProfile| {
            if !viewer.league.is_empty() {
                p.league = Some(viewer.league.clone());
            }
            if p.user_id.is_none() && !viewer.user_id.is_empty() {
                p.user_id = Some(viewer.user_id.clone());
            }
            p.level = p.level.max(viewer.level);
            p.is_fan_club |= viewer.is_fan_club;
            p.visits += 1;
            if !p.casts.iter().any(|c| c == cast_name) {
                p.casts.push(cast_name.to_string());
            }
            p.last_seen = Utc::now();
        });
    }

    pub fn observe_all(&self, cast_name: &str, viewers: &[NormalizedViewer]) {
        for v in viewers {
            self.observe(cast_name, v);
        }
    }

    pub fn get(&self, user_name: &str) -> Option<UserProfile> {
        self.profiles.get(&user_name.to_string())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Raises `paid_users` levels where a higher one was observed. Returns rows updated.
    pub async fn flush(&self, account_id: &str, casts: &dyn CastRepository) -> Result<usize, Error> {
        let names: Vec<String> = self
            .profiles
            .keys()
            .into_iter()
            .filter(|n| self.profiles.get(n).map(|p| p.level > 0).unwrap_or(false))
            .collect();
        if names.is_empty() {
            return Ok(0);
        }

        let recorded = casts.user_levels(account_id, &names).await?;
        let mut updated = 0;
        for (name, current) in recorded {
            let Some(profile) = self.profiles.get(&name) else { continue };
            if profile.level > current {
                match casts.raise_user_level(account_id, &name, profile.level).await {
                    Ok(()) => updated += 1,
                    Err(e) => warn!("[Profiles] level update for {} failed: {}", name, e),
                }
            }
        }
        if updated > 0 {
            info!("[Profiles] raised {} paid-user levels", updated);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn viewer(name: &str, league: &str, level: i64, fan: bool) -> NormalizedViewer {
        NormalizedViewer {
            user_name: name.into(),
            user_id: String::new(),
            league: league.into(),
            level,
            is_fan_club: fan,
            is_new: false,
        }
    }

    #[test]
    fn merges_sightings_across_casts() {
        let acc = ProfileAccumulator::new(MemoryStore::shared());
        acc.observe("alice", &viewer("bob", "silver", 10, true));
        acc.observe("carol", &viewer("bob", "", 7, false));
        acc.observe("alice", &viewer("bob", "gold", 12, false));

        let p = acc.get("bob").unwrap();
        assert_eq!(p.league.as_deref(), Some("gold"));
        assert_eq!(p.level, 12);
        assert!(p.is_fan_club);
        assert_eq!(p.visits, 3);
        assert_eq!(p.casts, vec!["alice".to_string(), "carol".to_string()]);
    }

    #[test]
    fn empty_league_keeps_previous() {
        let acc = ProfileAccumulator::new(MemoryStore::shared());
        acc.observe("alice", &viewer("bob", "silver", 1, false));
        acc.observe("alice", &viewer("bob", "", 1, false));
        assert_eq!(acc.get("bob").unwrap().league.as_deref(), Some("silver"));
    }
}
