// livespot-core/src/parsers/chat.rs
//
// `newChatMessage` push data:
//   message.userData.username           sender
//   message.details.body                text
//   message.details.amount              tip amount (tips only)
//   message.type                        "text" | "tip"
//   message.createdAt                   ISO timestamp
//   message.userData.userRanking        { league, level }
//   message.additionalData              { isKing, isKnight }

use serde_json::Value;
use tracing::debug;

use livespot_common::models::{ChatEvent, MessageKind};
use crate::extract::{self, FieldRule};

const USER_NAME: &[FieldRule] = &[
    FieldRule::new("userData.username", &["message", "userData", "username"]),
    FieldRule::new("userData.screenName", &["message", "userData", "screenName"]),
    FieldRule::new("flat username", &["username"]),
];

const BODY: &[FieldRule] = &[
    FieldRule::new("details.body", &["message", "details", "body"]),
    FieldRule::new("details.text", &["message", "details", "text"]),
    FieldRule::new("message.text", &["message", "text"]),
];

const TOKENS: &[FieldRule] = &[
    FieldRule::new("details.amount", &["message", "details", "amount"]),
    FieldRule::new("flat tokens", &["tokens"]),
];

const FAN_CLUB_MONTHS: &[FieldRule] = &[FieldRule::new(
    "details.fanClubNumberMonthsOfSubscribed",
    &["message", "details", "fanClubNumberMonthsOfSubscribed"],
)];

pub fn parse_chat(data: &Value) -> Option<ChatEvent> {
    let message = data.get("message").filter(|m| m.is_object())?;

    let Some((user_name, rule)) = extract::first_text_with_rule(data, USER_NAME) else {
        debug!("[Parse] chat frame without user name dropped");
        return None;
    };
    debug!("[Parse] chat sender from {}", rule);

    let body = extract::first_text(data, BODY).unwrap_or_default();
    let tokens = extract::first_int(data, TOKENS).unwrap_or(0);

    let raw_type = message.get("type").and_then(extract::as_text).unwrap_or_default();
    let kind = if raw_type == "tip" || tokens > 0 {
        MessageKind::Tip
    } else {
        MessageKind::Chat
    };

    let user_data = message.get("userData");
    let ranking = user_data.and_then(|u| u.get("userRanking"));
    let fan_club_months = extract::first_int(data, FAN_CLUB_MONTHS).unwrap_or(0);

    Some(ChatEvent {
        user_name,
        message: body,
        tokens,
        kind,
        message_time: message.get("createdAt").and_then(extract::as_text).unwrap_or_default(),
        user_league: ranking.and_then(|r| r.get("league")).and_then(extract::as_text),
        user_level: ranking.and_then(|r| r.get("level")).and_then(extract::as_int),
        is_model: flag(user_data, "isModel"),
        is_king: flag(message.get("additionalData"), "isKing"),
        is_knight: flag(message.get("additionalData"), "isKnight"),
        user_id: user_data.and_then(|u| u.get("id")).and_then(extract::as_text),
        is_fan_club: fan_club_months > 0 || flag(user_data, "isFanClubMember"),
    })
}

fn flag(obj: Option<&Value>, key: &str) -> bool {
    matches!(obj.and_then(|o| o.get(key)), Some(Value::Bool(true)))
}
