// livespot-core/src/normalizer/message.rs

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use livespot_common::models::{ChatEvent, MessageKind, NormalizedMessage};
use super::is_rejected_user_name;

/// Unvalidated message row. Fields are loose JSON because producers differ.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub account_id: Value,
    #[serde(default)]
    pub cast_name: Value,
    #[serde(default)]
    pub message_time: Value,
    #[serde(default, alias = "msg_type")]
    pub kind: Value,
    #[serde(default)]
    pub user_name: Value,
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub tokens: Value,
    #[serde(default)]
    pub is_vip: Value,
    #[serde(default)]
    pub session_id: Value,
    #[serde(default)]
    pub user_league: Value,
    #[serde(default)]
    pub user_level: Value,
    #[serde(default)]
    pub metadata: Value,
}

impl RawMessage {
    pub fn from_chat(
        account_id: &str,
        cast_name: &str,
        chat: &ChatEvent,
        is_vip: bool,
        session_id: Option<Uuid>,
    ) -> Self {
        let mut metadata = Map::new();
        if chat.is_model {
            metadata.insert("is_model".into(), Value::Bool(true));
        }
        if chat.is_king {
            metadata.insert("is_king".into(), Value::Bool(true));
        }
        if chat.is_knight {
            metadata.insert("is_knight".into(), Value::Bool(true));
        }
        if chat.is_fan_club {
            metadata.insert("is_fan_club".into(), Value::Bool(true));
        }
        if let Some(id) = &chat.user_id {
            metadata.insert("user_id".into(), Value::String(id.clone()));
        }

        Self {
            account_id: Value::from(account_id),
            cast_name: Value::from(cast_name),
            message_time: Value::from(chat.message_time.clone()),
            kind: Value::from(chat.kind.to_string()),
            user_name: Value::from(chat.user_name.clone()),
            message: Value::from(chat.message.clone()),
            tokens: Value::from(chat.tokens),
            is_vip: Value::Bool(is_vip),
            session_id: session_id.map(|s| Value::from(s.to_string())).unwrap_or(Value::Null),
            user_league: chat.user_league.clone().map(Value::from).unwrap_or(Value::Null),
            user_level: chat.user_level.map(Value::from).unwrap_or(Value::Null),
            metadata: Value::Object(metadata),
        }
    }
}

fn as_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_non_negative_int(v: &Value) -> i64 {
    let n = match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        Value::String(s) => leading_int(s.trim()),
        _ => None,
    };
    n.unwrap_or(0).max(0)
}

/// `"12abc"` → 12, `"-3"` → -3, `"abc"` → None.
fn leading_int(s: &str) -> Option<i64> {
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// ISO-8601 timestamps in the shapes producers actually send.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    let s = v.as_str()?.trim();
    if s.len() < 10 {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn normalize_message(raw: &RawMessage) -> Option<NormalizedMessage> {
    let user_name = as_string(&raw.user_name).trim().to_string();
    if is_rejected_user_name(&user_name) {
        debug!("[Normalize] message with reserved user name {:?} dropped", user_name);
        return None;
    }
    let account_id = as_string(&raw.account_id).trim().to_string();
    let cast_name = as_string(&raw.cast_name).trim().to_string();
    if account_id.is_empty() || cast_name.is_empty() {
        debug!("[Normalize] message from {} without account/cast dropped", user_name);
        return None;
    }

    let kind = as_string(&raw.kind)
        .parse::<MessageKind>()
        .unwrap_or(MessageKind::Chat);
    let tokens = as_non_negative_int(&raw.tokens);
    let kind = if tokens > 0 && kind == MessageKind::Chat {
        MessageKind::Tip
    } else {
        kind
    };

    let message_time = parse_timestamp(&raw.message_time).unwrap_or_else(Utc::now);
    let user_league = Some(as_string(&raw.user_league)).filter(|s| !s.is_empty());
    let user_level = (!raw.user_level.is_null()).then(|| as_non_negative_int(&raw.user_level));
    let session_id = raw.session_id.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok());
    let metadata = match &raw.metadata {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    Some(NormalizedMessage {
        account_id,
        cast_name,
        message_time,
        kind,
        user_name,
        message: as_string(&raw.message).trim().to_string(),
        tokens,
        is_vip: raw.is_vip == Value::Bool(true),
        session_id,
        user_league,
        user_level,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawMessage {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn chat_with_tokens_becomes_tip() {
        let m = normalize_message(&raw(json!({
            "account_id": "acc", "cast_name": "alice", "user_name": "bob",
            "msg_type": "chat", "tokens": 25, "message_time": "2025-03-01T10:00:00Z"
        })))
        .unwrap();
        assert_eq!(m.kind, MessageKind::Tip);
        assert_eq!(m.tokens, 25);
    }

    #[test]
    fn system_with_tokens_stays_system() {
        let m = normalize_message(&raw(json!({
            "account_id": "acc", "cast_name": "alice", "user_name": "bob",
            "kind": "system", "tokens": 5
        })))
        .unwrap();
        assert_eq!(m.kind, MessageKind::System);
    }

    #[test]
    fn reserved_names_rejected_case_insensitively() {
        for name in ["unknown", "UNDEFINED", "Null", "", "  "] {
            let r = raw(json!({ "account_id": "a", "cast_name": "c", "user_name": name }));
            assert!(normalize_message(&r).is_none(), "{name:?} should be rejected");
        }
        assert!(normalize_message(&raw(json!({ "account_id": "a", "cast_name": "c" }))).is_none());
    }

    #[test]
    fn missing_account_or_cast_rejected() {
        assert!(normalize_message(&raw(json!({ "cast_name": "c", "user_name": "bob" }))).is_none());
        assert!(normalize_message(&raw(json!({ "account_id": "a", "cast_name": " ", "user_name": "bob" }))).is_none());
    }

    #[test]
    fn coerces_loose_fields() {
        let before = Utc::now();
        let m = normalize_message(&raw(json!({
            "account_id": "a", "cast_name": "c", "user_name": " bob ",
            "kind": "whisper", "tokens": -4, "message_time": "not a date",
            "message": "  hi  ", "is_vip": "true", "user_level": "7",
            "session_id": "garbage", "metadata": [1, 2]
        })))
        .unwrap();
        assert_eq!(m.user_name, "bob");
        assert_eq!(m.kind, MessageKind::Chat);
        assert_eq!(m.tokens, 0);
        assert!(m.message_time >= before);
        assert_eq!(m.message, "hi");
        assert!(!m.is_vip);
        assert_eq!(m.user_level, Some(7));
        assert!(m.session_id.is_none());
        assert!(m.metadata.is_empty());
    }

    #[test]
    fn floors_fractional_tokens() {
        let m = normalize_message(&raw(json!({
            "account_id": "a", "cast_name": "c", "user_name": "bob", "tokens": 9.9
        })))
        .unwrap();
        assert_eq!(m.tokens, 9);
    }

    #[test]
    fn accepts_naive_and_date_only_timestamps() {
        let ts = parse_timestamp(&json!("2025-03-01 10:00:00")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-03-01T10:00:00+00:00");
        assert!(parse_timestamp(&json!("2025-03-01")).is_some());
        assert!(parse_timestamp(&json!("2025")).is_none());
        assert!(parse_timestamp(&json!(12345)).is_none());
    }

    #[test]
    fn from_chat_round_trips_core_fields() {
        let chat = ChatEvent {
            user_name: "bob".into(),
            message: "yo".into(),
            tokens: 0,
            kind: MessageKind::Chat,
            message_time: "2025-03-01T10:00:00Z".into(),
            user_league: Some("gold".into()),
            user_level: Some(12),
            is_model: false,
            is_king: true,
            is_knight: false,
            user_id: Some("99".into()),
            is_fan_club: false,
        };
        let sid = Uuid::new_v4();
        let m = normalize_message(&RawMessage::from_chat("acc", "alice", &chat, true, Some(sid))).unwrap();
        assert_eq!(m.session_id, Some(sid));
        assert!(m.is_vip);
        assert_eq!(m.user_league.as_deref(), Some("gold"));
        assert_eq!(m.metadata.get("is_king"), Some(&Value::Bool(true)));
    }
}
