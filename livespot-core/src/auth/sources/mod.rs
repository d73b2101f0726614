//! Credential sources, tried in order by the broker until one succeeds.

pub mod browser;
pub mod page;
pub mod rest;
pub mod static_env;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use livespot_common::models::{AuthMethod, Credential};
use crate::config::AuthConfig;
use crate::Error;

pub use browser::BrowserCaptureSource;
pub use page::PageScrapeSource;
pub use rest::RestConfigSource;
pub use static_env::StaticSource;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// One way of obtaining stream credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    fn method(&self) -> AuthMethod;

    /// `model` is the cast whose page or session the source should use.
    async fn acquire(&self, model: &str) -> Result<Credential, Error>;
}

/// The standard chain: page scrape, REST config, browser capture, static env.
pub fn default_sources(config: &AuthConfig) -> Result<Vec<Arc<dyn CredentialSource>>, Error> {
    let client = reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(Duration::from_secs(20))
        .build()?;

    Ok(vec![
        Arc::new(PageScrapeSource::new(client.clone(), &config.ws_url)),
        Arc::new(RestConfigSource::new(client, &config.ws_url)),
        Arc::new(BrowserCaptureSource::new(
            config.capture_command.clone(),
            config.capture_timeout,
            &config.ws_url,
        )),
        Arc::new(StaticSource::new(
            config.static_jwt.clone(),
            config.static_cf_clearance.clone(),
            &config.ws_url,
        )),
    ])
}

pub(crate) fn build_credential(
    jwt: String,
    cf_clearance: String,
    ws_url: String,
    user_id: String,
    expires_at: i64,
    method: AuthMethod,
) -> Credential {
    Credential {
        jwt,
        cf_clearance,
        ws_url,
        user_id,
        expires_at,
        method: Some(method),
        acquired_at: Utc::now(),
        refresh_count: 0,
    }
}

/// Pulls `cf_clearance` out of a list of `Set-Cookie` header values.
pub(crate) fn cf_clearance_from(set_cookies: &[String]) -> Option<String> {
    set_cookies.iter().find_map(|c| {
        c.split(';')
            .next()
            .and_then(|pair| pair.trim().strip_prefix("cf_clearance="))
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    })
}

pub(crate) fn set_cookie_values(headers: &reqwest::header::HeaderMap) -> Vec<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
        .collect()
}
