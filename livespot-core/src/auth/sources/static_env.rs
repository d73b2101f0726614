// livespot-core/src/auth/sources/static_env.rs

use async_trait::async_trait;
use chrono::Utc;

use livespot_common::models::{AuthMethod, Credential};
use crate::Error;
use super::{build_credential, CredentialSource};

/// Last resort: a token supplied through the environment, assumed good for an hour.
pub struct StaticSource {
    jwt: Option<String>,
    cf_clearance: Option<String>,
    ws_url: String,
}

impl StaticSource {
    pub fn new(jwt: Option<String>, cf_clearance: Option<String>, ws_url: &str) -> Self {
        Self {
            jwt,
            cf_clearance,
            ws_url: ws_url.to_string(),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticSource {
    fn method(&self) -> AuthMethod {
        AuthMethod::Env
    }

    async fn acquire(&self, _model: &str) -> Result<Credential, Error> {
        let jwt = self
            .jwt
            .clone()
            .filter(|j| !j.is_empty())
            .ok_or_else(|| Error::Auth("STRIPCHAT_JWT not set".into()))?;
        Ok(build_credential(
            jwt,
            self.cf_clearance.clone().unwrap_or_default(),
            self.ws_url.clone(),
            String::new(),
            Utc::now().timestamp() + 3600,
            AuthMethod::Env,
        ))
    }
}
