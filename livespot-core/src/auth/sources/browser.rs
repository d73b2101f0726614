// livespot-core/src/auth/sources/browser.rs

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use livespot_common::models::{AuthMethod, Credential};
use crate::auth::jwt::decode_exp;
use crate::Error;
use super::{build_credential, CredentialSource};

/// Captured tokens are treated as good for 55 minutes unless the JWT says otherwise.
const CAPTURE_TTL_SECS: i64 = 55 * 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureOutput {
    jwt: String,
    #[serde(default)]
    cf_clearance: String,
    #[serde(default)]
    ws_url: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Runs an external headless-browser capture program and reads its JSON result.
///
/// The program receives the model name as its last argument and must print
/// `{"jwt": ..., "cfClearance": ..., "wsUrl": ..., "userId": ...}` on stdout.
pub struct BrowserCaptureSource {
    command: Option<String>,
    timeout: Duration,
    default_ws_url: String,
}

impl BrowserCaptureSource {
    pub fn new(command: Option<String>, timeout: Duration, default_ws_url: &str) -> Self {
        Self {
            command,
            timeout,
            default_ws_url: default_ws_url.to_string(),
        }
    }
}

#[async_trait]
impl CredentialSource for BrowserCaptureSource {
    fn method(&self) -> AuthMethod {
        AuthMethod::Browser
    }

    async fn acquire(&self, model: &str) -> Result<Credential, Error> {
        let command = self
            .command
            .as_deref()
            .ok_or_else(|| Error::Auth("no browser capture command configured".into()))?;
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Auth("empty browser capture command".into()))?;

        info!("[Auth] launching browser capture for {} (timeout {:?})", model, self.timeout);
        let child = Command::new(program)
            .args(parts)
            .arg(model)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = timeout(self.timeout, child).await??;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("[Auth] browser capture exited with {}: {}", output.status, stderr.trim());
            return Err(Error::Auth(format!("browser capture failed: {}", output.status)));
        }
        credential_from_capture(&String::from_utf8_lossy(&output.stdout), &self.default_ws_url)
    }
}

/// Parses the last JSON line the capture program printed.
pub fn credential_from_capture(stdout: &str, default_ws_url: &str) -> Result<Credential, Error> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| Error::Auth("browser capture printed no JSON".into()))?;
    let out: CaptureOutput = serde_json::from_str(line)?;
    if out.jwt.is_empty() {
        return Err(Error::Auth("browser capture returned an empty token".into()));
    }
    let expires_at = decode_exp(&out.jwt).unwrap_or_else(|| Utc::now().timestamp() + CAPTURE_TTL_SECS);
    Ok(build_credential(
        out.jwt,
        out.cf_clearance,
        out.ws_url.filter(|u| !u.is_empty()).unwrap_or_else(|| default_ws_url.to_string()),
        out.user_id.unwrap_or_default(),
        expires_at,
        AuthMethod::Browser,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_json_line() {
        let out = "launching chromium\n{\"jwt\":\"tok\",\"cfClearance\":\"cf\",\"userId\":\"9\"}\n";
        let c = credential_from_capture(out, "wss://d").unwrap();
        assert_eq!(c.jwt, "tok");
        assert_eq!(c.cf_clearance, "cf");
        assert_eq!(c.ws_url, "wss://d");
        let ttl = c.expires_at - Utc::now().timestamp();
        assert!(ttl > CAPTURE_TTL_SECS - 5 && ttl <= CAPTURE_TTL_SECS);
    }

    #[tokio::test]
    async fn unconfigured_command_fails_fast() {
        let src = BrowserCaptureSource::new(None, Duration::from_secs(1), "wss://d");
        assert!(matches!(src.acquire("m").await, Err(Error::Auth(_))));
    }
}
