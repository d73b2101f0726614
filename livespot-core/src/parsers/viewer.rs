// livespot-core/src/parsers/viewer.rs
//
// `/api/front/v2/models/username/{name}/members` responses. Two entry shapes:
//   v2:     { user: { id, username, userRanking: { league, level } }, fanClubTier }
//   legacy: { username, id, league, level, isFanClubMember }

use serde_json::Value;
use tracing::debug;

use livespot_common::models::ViewerEntry;
use crate::extract::{self, FieldRule};

const ENVELOPES: &[FieldRule] = &[
    FieldRule::new("members", &["members"]),
    FieldRule::new("users", &["users"]),
    FieldRule::new("data", &["data"]),
];

const NESTED_NAME: &[FieldRule] = &[
    FieldRule::new("user.username", &["user", "username"]),
    FieldRule::new("user.userName", &["user", "userName"]),
];

const FLAT_NAME: &[FieldRule] = &[
    FieldRule::new("username", &["username"]),
    FieldRule::new("userName", &["userName"]),
    FieldRule::new("user_name", &["user_name"]),
];
const FLAT_ID: &[FieldRule] = &[
    FieldRule::new("id", &["id"]),
    FieldRule::new("userId", &["userId"]),
    FieldRule::new("user_id", &["user_id"]),
];
const FLAT_LEAGUE: &[FieldRule] = &[
    FieldRule::new("league", &["league"]),
    FieldRule::new("badge", &["badge"]),
];
const FLAT_FAN_CLUB: &[FieldRule] = &[
    FieldRule::new("isFanClubMember", &["isFanClubMember"]),
    FieldRule::new("fanClub", &["fanClub"]),
    FieldRule::new("is_fan_club", &["is_fan_club"]),
];

fn members(response: &Value) -> Option<&Vec<Value>> {
    if let Some(list) = response.as_array() {
        return Some(list);
    }
    ENVELOPES
        .iter()
        .find_map(|r| extract::lookup(response, r.path).and_then(|v| v.as_array()))
}

pub fn parse_viewer_list(response: &Value) -> Vec<ViewerEntry> {
    let Some(list) = members(response) else {
        debug!("[Parse] viewer response has no member list");
        return Vec::new();
    };

    list.iter()
        .filter(|m| m.is_object())
        .filter_map(parse_entry)
        .collect()
}

fn parse_entry(entry: &Value) -> Option<ViewerEntry> {
    let parsed = match entry.get("user").filter(|u| u.is_object()) {
        Some(user) => ViewerEntry {
            user_name: extract::first_text(entry, NESTED_NAME).unwrap_or_default(),
            user_id: user.get("id").and_then(extract::as_text),
            league: extract::lookup(user, &["userRanking", "league"]).and_then(extract::as_text),
            level: extract::lookup(user, &["userRanking", "level"]).and_then(extract::as_int),
            is_fan_club: !matches!(entry.get("fanClubTier"), None | Some(Value::Null)),
        },
        None => ViewerEntry {
            user_name: extract::first_text(entry, FLAT_NAME).unwrap_or_default(),
            user_id: extract::first_text(entry, FLAT_ID),
            league: extract::first_text(entry, FLAT_LEAGUE),
            level: entry.get("level").and_then(extract::as_int),
            is_fan_club: extract::any_true(entry, FLAT_FAN_CLUB),
        },
    };

    if parsed.user_name.is_empty() || parsed.user_name == "unknown" {
        return None;
    }
    Some(parsed)
}
