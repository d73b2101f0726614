//! Ordered field-extraction rules over loosely shaped JSON.
//!
//! Platform payloads move fields around between versions (nested `user`
//! objects, flat legacy keys, alternative envelopes). Each field is described
//! by a list of named [`FieldRule`]s tried in priority order; the first rule
//! that yields a usable value wins.

use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub path: &'static [&'static str],
}

impl FieldRule {
    pub const fn new(name: &'static str, path: &'static [&'static str]) -> Self {
        Self { name, path }
    }
}

pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// Strings as-is, numbers rendered; empty strings do not count.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integers, floats (floored) and numeric strings.
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn first_text(value: &Value, rules: &[FieldRule]) -> Option<String> {
    rules.iter().find_map(|r| lookup(value, r.path).and_then(as_text))
}

/// Like [`first_text`], also reporting which rule matched.
pub fn first_text_with_rule(value: &Value, rules: &[FieldRule]) -> Option<(String, &'static str)> {
    rules
        .iter()
        .find_map(|r| lookup(value, r.path).and_then(as_text).map(|s| (s, r.name)))
}

/// First rule yielding a non-zero number. A zero falls through to the next rule.
pub fn first_int(value: &Value, rules: &[FieldRule]) -> Option<i64> {
    let mut zero_seen = false;
    for r in rules {
        match lookup(value, r.path).and_then(as_int) {
            Some(0) => zero_seen = true,
            Some(n) => return Some(n),
            None => {}
        }
    }
    zero_seen.then_some(0)
}

/// True if any rule points at a literal `true`.
pub fn any_true(value: &Value, rules: &[FieldRule]) -> bool {
    rules
        .iter()
        .any(|r| matches!(lookup(value, r.path), Some(Value::Bool(true))))
}

/// Depth-limited search for the first non-empty string under any of `keys`.
pub fn find_key_nested(value: &Value, keys: &[&str], max_depth: usize) -> Option<String> {
    if max_depth == 0 {
        return None;
    }
    match value {
        Value::Object(map) => {
            for key in keys {
                if let Some(Value::String(s)) = map.get(*key) {
                    if !s.is_empty() {
                        return Some(s.clone());
                    }
                }
            }
            map.values().find_map(|v| find_key_nested(v, keys, max_depth - 1))
        }
        Value::Array(items) => items.iter().find_map(|v| find_key_nested(v, keys, max_depth - 1)),
        _ => None,
    }
}

/// `eyJ...` with three dot-separated parts and a non-trivial payload.
pub fn looks_like_jwt(s: &str) -> bool {
    if !s.starts_with("eyJ") {
        return false;
    }
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3 && parts[1].len() > 10
}

pub fn find_jwt_like(value: &Value, max_depth: usize) -> Option<String> {
    match value {
        Value::String(s) if looks_like_jwt(s) => Some(s.clone()),
        _ if max_depth == 0 => None,
        Value::Object(map) => map.values().find_map(|v| find_jwt_like(v, max_depth - 1)),
        Value::Array(items) => items.iter().find_map(|v| find_jwt_like(v, max_depth - 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NAME: &[FieldRule] = &[
        FieldRule::new("userData.username", &["userData", "username"]),
        FieldRule::new("username", &["username"]),
    ];

    #[test]
    fn earlier_rules_win() {
        let v = json!({"userData": {"username": "nested"}, "username": "flat"});
        assert_eq!(first_text_with_rule(&v, NAME), Some(("nested".into(), "userData.username")));
    }

    #[test]
    fn empty_strings_fall_through() {
        let v = json!({"userData": {"username": ""}, "username": "flat"});
        assert_eq!(first_text(&v, NAME).as_deref(), Some("flat"));
    }

    #[test]
    fn ints_accept_strings_and_floats() {
        assert_eq!(as_int(&json!("42")), Some(42));
        assert_eq!(as_int(&json!(3.9)), Some(3));
        assert_eq!(as_int(&json!(true)), None);
    }

    #[test]
    fn nested_search_respects_depth() {
        let v = json!({"a": {"b": {"c": {"wsToken": "deep"}}}});
        assert_eq!(find_key_nested(&v, &["wsToken"], 4).as_deref(), Some("deep"));
        assert_eq!(find_key_nested(&v, &["wsToken"], 3), None);
    }

    #[test]
    fn jwt_scan_ignores_short_payloads() {
        assert!(!looks_like_jwt("eyJhbGc.short.sig"));
        assert!(looks_like_jwt("eyJhbGc.eyJzdWIiOiIxMjM0NTY3ODkwIn0.sig"));
        let v = json!({"x": [{"t": "eyJhbGc.eyJzdWIiOiIxMjM0NTY3ODkwIn0.sig"}]});
        assert!(find_jwt_like(&v, 4).is_some());
    }
}
