// livespot-core/src/parsers/tip.rs

use serde_json::Value;
use tracing::debug;

use livespot_common::models::{TipEvent, TipKind};
use crate::extract::{self, FieldRule};

const USER_NAME: &[FieldRule] = &[
    FieldRule::new("userName", &["userName"]),
    FieldRule::new("user_name", &["user_name"]),
    FieldRule::new("username", &["username"]),
];
const TOKENS: &[FieldRule] = &[
    FieldRule::new("tokens", &["tokens"]),
    FieldRule::new("amount", &["amount"]),
];
const TYPE: &[FieldRule] = &[
    FieldRule::new("type", &["type"]),
    FieldRule::new("source", &["source"]),
];
const CAST_NAME: &[FieldRule] = &[
    FieldRule::new("castName", &["castName"]),
    FieldRule::new("cast_name", &["cast_name"]),
];
const DATE: &[FieldRule] = &[
    FieldRule::new("date", &["date"]),
    FieldRule::new("createdAt", &["createdAt"]),
    FieldRule::new("created_at", &["created_at"]),
];
const DETAIL: &[FieldRule] = &[
    FieldRule::new("description", &["description"]),
    FieldRule::new("sourceDetail", &["sourceDetail"]),
];

/// Platform transaction type → internal kind. Unlisted types pass through verbatim.
pub fn tip_kind(raw: &str) -> TipKind {
    match raw {
        "tip" => TipKind::Tip,
        "gift" => TipKind::Gift,
        "private" => TipKind::Private,
        "spy" => TipKind::Spy,
        "ticket" => TipKind::Ticket,
        "group" => TipKind::Group,
        "striptease" => TipKind::Striptease,
        "cam2cam" => TipKind::Cam2Cam,
        other => TipKind::Other(other.to_string()),
    }
}

pub fn parse_tip(raw: &Value) -> Option<TipEvent> {
    if !raw.is_object() {
        return None;
    }
    let user_name = extract::first_text(raw, USER_NAME);
    let tokens = extract::first_int(raw, TOKENS).unwrap_or(0);
    let Some(user_name) = user_name.filter(|_| tokens > 0) else {
        debug!("[Parse] tip record without user or positive amount dropped");
        return None;
    };

    let raw_type = extract::first_text(raw, TYPE).unwrap_or_else(|| "unknown".to_string());

    Some(TipEvent {
        user_name,
        tokens,
        kind: tip_kind(&raw_type),
        cast_name: extract::first_text(raw, CAST_NAME),
        date: extract::first_text(raw, DATE),
        source_detail: extract::first_text(raw, DETAIL),
    })
}
