// livespot-core/src/normalizer/viewer.rs

use std::collections::HashSet;

use livespot_common::models::{NormalizedViewer, ViewerEntry};
use super::is_rejected_user_name;

/// Deduplicates by lowercase name (first occurrence wins) and flags names
/// missing from `known` as new. Without a known set nobody is new.
pub fn normalize_viewers(raw: &[ViewerEntry], known: Option<&HashSet<String>>) -> Vec<NormalizedViewer> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for entry in raw {
        let user_name = entry.user_name.trim();
        if is_rejected_user_name(user_name) {
            continue;
        }
        if !seen.insert(user_name.to_lowercase()) {
            continue;
        }
        out.push(NormalizedViewer {
            user_name: user_name.to_string(),
            user_id: entry.user_id.clone().unwrap_or_default(),
            league: entry.league.as_deref().unwrap_or_default().to_lowercase(),
            level: entry.level.unwrap_or(0).max(0),
            is_fan_club: entry.is_fan_club,
            is_new: known.map(|k| !k.contains(user_name)).unwrap_or(false),
        });
    }
    out
}

/// Turns normalized viewers back into parser-shaped entries, e.g. to re-normalize.
pub fn to_entries(viewers: &[NormalizedViewer]) -> Vec<ViewerEntry> {
    viewers
        .iter()
        .map(|v| ViewerEntry {
            user_name: v.user_name.clone(),
            user_id: Some(v.user_id.clone()).filter(|s| !s.is_empty()),
            league: Some(v.league.clone()).filter(|s| !s.is_empty()),
            level: Some(v.level),
            is_fan_club: v.is_fan_club,
        })
        .collect()
}
