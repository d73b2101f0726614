// livespot-core/src/auth/sources/page.rs

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use livespot_common::models::{AuthMethod, Credential};
use crate::auth::jwt::{expiry_or_default, DEFAULT_TTL_SECS};
use crate::extract::{find_jwt_like, find_key_nested, first_text, first_text_with_rule, FieldRule};
use crate::Error;
use super::{build_credential, cf_clearance_from, set_cookie_values, CredentialSource};

static STATE_ANCHORED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\.__PRELOADED_STATE__\s*=\s*(\{.+?\});\s*</script>").expect("valid regex")
});
static STATE_LOOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\.__PRELOADED_STATE__\s*=\s*(\{.+?\});").expect("valid regex")
});

const TOKEN_RULES: &[FieldRule] = &[
    FieldRule::new("config.centrifugoToken", &["config", "centrifugoToken"]),
    FieldRule::new("configV3.centrifugoToken", &["configV3", "centrifugoToken"]),
    FieldRule::new("user.centrifugoToken", &["user", "centrifugoToken"]),
    FieldRule::new("user.token", &["user", "token"]),
    FieldRule::new("centrifugoToken", &["centrifugoToken"]),
];

const WS_URL_RULES: &[FieldRule] = &[
    FieldRule::new("config.webSocketUrl", &["config", "webSocketUrl"]),
    FieldRule::new("configV3.webSocketUrl", &["configV3", "webSocketUrl"]),
];

const USER_ID_RULES: &[FieldRule] = &[
    FieldRule::new("user.user.id", &["user", "user", "id"]),
    FieldRule::new("user.id", &["user", "id"]),
];

/// Scrapes the model page's embedded state for a connection token.
pub struct PageScrapeSource {
    client: reqwest::Client,
    default_ws_url: String,
}

impl PageScrapeSource {
    pub fn new(client: reqwest::Client, default_ws_url: &str) -> Self {
        Self {
            client,
            default_ws_url: default_ws_url.to_string(),
        }
    }
}

#[async_trait]
impl CredentialSource for PageScrapeSource {
    fn method(&self) -> AuthMethod {
        AuthMethod::PageHtml
    }

    async fn acquire(&self, model: &str) -> Result<Credential, Error> {
        let url = format!("https://stripchat.com/{}", urlencoding::encode(model));
        let resp = self
            .client
            .get(&url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "ja,en-US;q=0.9,en;q=0.8")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Auth(format!("page fetch returned {}", resp.status())));
        }
        let cookies = set_cookie_values(resp.headers());
        let html = resp.text().await?;
        credential_from_page(&html, &cookies, &self.default_ws_url)
    }
}

pub fn extract_preloaded_state(html: &str) -> Option<Value> {
    let caps = STATE_ANCHORED.captures(html).or_else(|| STATE_LOOSE.captures(html))?;
    serde_json::from_str(caps.get(1)?.as_str()).ok()
}

/// Token lookup used by both page and REST sources once the JSON is in hand.
pub(crate) fn find_token(state: &Value, rules: &[FieldRule], allow_jwt_scan: bool) -> Option<String> {
    if let Some((token, rule)) = first_text_with_rule(state, rules) {
        debug!("[Auth] token found at {}", rule);
        return Some(token);
    }
    if let Some(token) = find_key_nested(state, &["centrifugoToken", "wsToken"], 5) {
        debug!("[Auth] token found by nested search");
        return Some(token);
    }
    if allow_jwt_scan {
        return find_jwt_like(state, 4);
    }
    None
}

pub fn credential_from_page(html: &str, set_cookies: &[String], default_ws_url: &str) -> Result<Credential, Error> {
    let state = extract_preloaded_state(html)
        .ok_or_else(|| Error::Auth("__PRELOADED_STATE__ not found in page".into()))?;

    let jwt = find_token(&state, TOKEN_RULES, true)
        .ok_or_else(|| Error::Auth("no connection token in page state".into()))?;

    let ws_url = first_text(&state, WS_URL_RULES)
        .or_else(|| find_key_nested(&state, &["webSocketUrl", "wsUrl"], 5))
        .unwrap_or_else(|| default_ws_url.to_string());
    let user_id = first_text(&state, USER_ID_RULES).unwrap_or_default();
    let cf_clearance = cf_clearance_from(set_cookies).unwrap_or_default();
    let expires_at = expiry_or_default(&jwt, DEFAULT_TTL_SECS);

    info!("[Auth] page scrape yielded token (user_id={})", if user_id.is_empty() { "?" } else { &user_id });
    Ok(build_credential(jwt, cf_clearance, ws_url, user_id, expires_at, AuthMethod::PageHtml))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WS: &str = "wss://default/connection/websocket";

    #[test]
    fn reads_token_ws_url_and_user() {
        let html = r#"<html><script>window.__PRELOADED_STATE__ = {"config":{"centrifugoToken":"tok1","webSocketUrl":"wss://custom"},"user":{"user":{"id":77}}};</script></html>"#;
        let cookies = vec!["cf_clearance=abc123; Path=/; HttpOnly".to_string()];
        let c = credential_from_page(html, &cookies, WS).unwrap();
        assert_eq!(c.jwt, "tok1");
        assert_eq!(c.ws_url, "wss://custom");
        assert_eq!(c.user_id, "77");
        assert_eq!(c.cf_clearance, "abc123");
        assert_eq!(c.method, Some(AuthMethod::PageHtml));
    }

    #[test]
    fn falls_back_to_nested_token_and_default_url() {
        let html = r#"<script>window.__PRELOADED_STATE__ = {"a":{"b":{"wsToken":"deep"}}};
        </script>"#;
        let c = credential_from_page(html, &[], WS).unwrap();
        assert_eq!(c.jwt, "deep");
        assert_eq!(c.ws_url, WS);
        assert!(c.cf_clearance.is_empty());
    }

    #[test]
    fn missing_state_is_an_auth_error() {
        assert!(matches!(credential_from_page("<html></html>", &[], WS), Err(Error::Auth(_))));
    }
}
