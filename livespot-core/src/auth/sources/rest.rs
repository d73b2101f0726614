// livespot-core/src/auth/sources/rest.rs

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use livespot_common::models::{AuthMethod, Credential};
use crate::auth::jwt::{expiry_or_default, DEFAULT_TTL_SECS};
use crate::extract::{find_key_nested, first_text, FieldRule};
use crate::Error;
use super::page::find_token;
use super::{build_credential, cf_clearance_from, set_cookie_values, CredentialSource};

const CONFIG_URL: &str = "https://stripchat.com/api/front/v2/config";

const TOKEN_RULES: &[FieldRule] = &[
    FieldRule::new("centrifugoToken", &["centrifugoToken"]),
    FieldRule::new("data.centrifugoToken", &["data", "centrifugoToken"]),
    FieldRule::new("config.centrifugoToken", &["config", "centrifugoToken"]),
];

const WS_URL_RULES: &[FieldRule] = &[
    FieldRule::new("config.webSocketUrl", &["config", "webSocketUrl"]),
    FieldRule::new("webSocketUrl", &["webSocketUrl"]),
];

/// Probes the public front-end configuration endpoint.
pub struct RestConfigSource {
    client: reqwest::Client,
    default_ws_url: String,
}

impl RestConfigSource {
    pub fn new(client: reqwest::Client, default_ws_url: &str) -> Self {
        Self {
            client,
            default_ws_url: default_ws_url.to_string(),
        }
    }
}

#[async_trait]
impl CredentialSource for RestConfigSource {
    fn method(&self) -> AuthMethod {
        AuthMethod::RestApi
    }

    async fn acquire(&self, _model: &str) -> Result<Credential, Error> {
        let resp = self
            .client
            .get(CONFIG_URL)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Auth(format!("config endpoint returned {}", resp.status())));
        }
        let cookies = set_cookie_values(resp.headers());
        let body: Value = resp.json().await?;
        credential_from_config(&body, &cookies, &self.default_ws_url)
    }
}

pub fn credential_from_config(body: &Value, set_cookies: &[String], default_ws_url: &str) -> Result<Credential, Error> {
    let jwt = find_token(body, TOKEN_RULES, false)
        .ok_or_else(|| Error::Auth("no connection token in config response".into()))?;
    let ws_url = first_text(body, WS_URL_RULES)
        .or_else(|| find_key_nested(body, &["webSocketUrl", "wsUrl"], 5))
        .unwrap_or_else(|| default_ws_url.to_string());
    let expires_at = expiry_or_default(&jwt, DEFAULT_TTL_SECS);
    info!("[Auth] config endpoint yielded token");
    Ok(build_credential(
        jwt,
        cf_clearance_from(set_cookies).unwrap_or_default(),
        ws_url,
        String::new(),
        expires_at,
        AuthMethod::RestApi,
    ))
}
