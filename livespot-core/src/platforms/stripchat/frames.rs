// livespot-core/src/platforms/stripchat/frames.rs

use serde_json::{json, Value};

/// Close/error code for an invalid token or a missing clearance cookie.
pub const AUTH_ERROR_CODE: i64 = 3501;

/// Request id used for the connect command.
pub const CONNECT_ID: u64 = 1;

/// Channels subscribed per model once the connection is authenticated.
pub const CHANNELS: &[&str] = &["newChatMessage", "newModelEvent", "clearChatMessages", "userUpdated"];

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A bare `{}`; must be echoed back.
    Heartbeat,
    ConnectAck { id: u64 },
    Reply { id: u64 },
    Error { id: Option<u64>, code: i64, message: String },
    Push { channel: String, event: String, data: Value },
    Other(Value),
}

impl Frame {
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Frame::Error { code, .. } if *code == AUTH_ERROR_CODE)
    }
}

pub fn classify(value: &Value) -> Frame {
    let Some(obj) = value.as_object() else {
        return Frame::Other(value.clone());
    };
    if obj.is_empty() {
        return Frame::Heartbeat;
    }
    let id = obj.get("id").and_then(|v| v.as_u64());

    if let Some(err) = obj.get("error") {
        return Frame::Error {
            id,
            code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string(),
        };
    }
    if let Some(push) = obj.get("push") {
        let channel = push.get("channel").and_then(|c| c.as_str()).unwrap_or_default().to_string();
        let event = channel.split('@').next().unwrap_or_default().to_string();
        let data = push
            .get("pub")
            .and_then(|p| p.get("data"))
            .cloned()
            .unwrap_or(Value::Null);
        return Frame::Push { channel, event, data };
    }
    match id {
        Some(id) if obj.contains_key("connect") => Frame::ConnectAck { id },
        Some(id) => Frame::Reply { id },
        None => Frame::Other(value.clone()),
    }
}

/// Splits back-to-back JSON objects in one text frame by brace depth.
///
/// Braces inside string literals (including escaped quotes) are ignored.
/// Anything outside a top-level object is dropped.
pub fn split_frames(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        out.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

pub fn connect_request(token: &str, name: &str, id: u64) -> String {
    json!({ "connect": { "token": token, "name": name }, "id": id }).to_string()
}

pub fn subscribe_request(channel: &str, id: u64) -> String {
    json!({ "subscribe": { "channel": channel }, "id": id }).to_string()
}
