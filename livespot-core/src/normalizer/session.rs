// livespot-core/src/normalizer/session.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use livespot_common::models::NormalizedSession;
use super::message::parse_timestamp;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSession {
    #[serde(default)]
    pub session_id: Value,
    #[serde(default)]
    pub account_id: Value,
    #[serde(default)]
    pub cast_name: Value,
    #[serde(default)]
    pub started_at: Value,
    #[serde(default)]
    pub ended_at: Value,
}

/// Hyphenated 36-character form only.
fn parse_uuid(v: &Value) -> Option<Uuid> {
    let s = v.as_str()?.trim();
    if s.len() != 36 {
        return None;
    }
    Uuid::parse_str(s).ok()
}

pub fn normalize_session(raw: &RawSession) -> Option<NormalizedSession> {
    let Some(account_id) = parse_uuid(&raw.account_id) else {
        debug!("[Normalize] session with invalid account id dropped");
        return None;
    };
    let cast_name = raw.cast_name.as_str().map(str::trim).unwrap_or_default();
    if cast_name.is_empty() {
        return None;
    }
    let Some(session_id) = parse_uuid(&raw.session_id) else {
        debug!("[Normalize] session for {} with invalid session id dropped", cast_name);
        return None;
    };
    let started_at = parse_timestamp(&raw.started_at)?;

    let ended_at = match &raw.ended_at {
        Value::Null => None,
        v => {
            let ended = parse_timestamp(v)?;
            if ended < started_at {
                debug!("[Normalize] session {} ends before it starts; dropped", session_id);
                return None;
            }
            Some(ended)
        }
    };

    Some(NormalizedSession {
        session_id,
        account_id,
        cast_name: cast_name.to_string(),
        started_at,
        ended_at,
    })
}
