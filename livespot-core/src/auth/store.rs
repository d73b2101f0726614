// livespot-core/src/auth/store.rs

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};

use livespot_common::models::Credential;
use crate::Error;

/// Disk record of the live credential, restored on restart.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join("current.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes to a sibling temp file and renames over the record.
    pub async fn save(&self, credential: &Credential) -> Result<(), Error> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(credential)?;
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("[Auth] credential persisted to {}", self.path.display());
        Ok(())
    }

    /// The persisted credential, unless it is missing, unreadable or already expired.
    pub async fn restore(&self) -> Option<Credential> {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(_) => return None,
        };
        let cred: Credential = match serde_json::from_slice(&bytes) {
            Ok(c) => c,
            Err(e) => {
                warn!("[Auth] ignoring unreadable credential record: {}", e);
                return None;
            }
        };
        if cred.is_empty() || cred.expires_at <= Utc::now().timestamp() {
            info!("[Auth] persisted credential already expired; ignoring");
            return None;
        }
        Some(cred)
    }

    pub async fn clear(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livespot_common::models::AuthMethod;

    fn cred(expires_at: i64) -> Credential {
        Credential {
            jwt: "eyJ.a.b".into(),
            cf_clearance: "cf".into(),
            ws_url: "wss://example".into(),
            user_id: "42".into(),
            expires_at,
            method: Some(AuthMethod::RestApi),
            acquired_at: Utc::now(),
            refresh_count: 3,
        }
    }

    #[tokio::test]
    async fn round_trips_and_clears() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path().join(".auth"));
        let c = cred(Utc::now().timestamp() + 600);

        store.save(&c).await?;
        assert_eq!(store.restore().await, Some(c));

        store.clear().await?;
        assert!(store.restore().await.is_none());
        store.clear().await?;
        Ok(())
    }

    #[tokio::test]
    async fn expired_record_is_ignored() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path());
        store.save(&cred(Utc::now().timestamp() - 1)).await?;
        assert!(store.restore().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn record_uses_camel_case_fields() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path());
        store.save(&cred(Utc::now().timestamp() + 600)).await?;
        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(store.path())?)?;
        assert!(raw.get("cfClearance").is_some());
        assert!(raw.get("expiresAt").is_some());
        assert_eq!(raw.get("refreshCount").and_then(|v| v.as_u64()), Some(3));
        Ok(())
    }
}
