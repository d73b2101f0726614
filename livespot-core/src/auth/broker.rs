//! Owns the process's one live stream credential.
//!
//! `cached` (valid until `expires_at - CACHE_MARGIN_SECS`) -> `refreshing`
//! (single flight: concurrent callers wait on the same refresh) -> `cached`.
//! A refresh walks the [`CredentialSource`] list in order; if every source
//! fails the caller gets [`Credential::empty`] instead of an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use livespot_common::models::{AuthMethod, Credential};
use crate::auth::sources::CredentialSource;
use crate::auth::store::CredentialStore;

pub const CACHE_MARGIN_SECS: i64 = 300;

pub struct CredentialBroker {
    sources: Vec<Arc<dyn CredentialSource>>,
    store: Option<CredentialStore>,
    default_model: String,
    current: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
    /// Bumped after every completed refresh attempt, success or not.
    generation: AtomicU64,
    refresh_count: AtomicU64,
}

impl CredentialBroker {
    pub fn new(
        sources: Vec<Arc<dyn CredentialSource>>,
        store: Option<CredentialStore>,
        default_model: &str,
    ) -> Self {
        Self {
            sources,
            store,
            default_model: default_model.to_string(),
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            refresh_count: AtomicU64::new(0),
        }
    }

    /// Loads the persisted record, if still valid. Returns whether one was restored.
    pub async fn restore(&self) -> bool {
        let Some(store) = &self.store else { return false };
        match store.restore().await {
            Some(cred) => {
                info!(
                    "[Auth] restored {} credential, {}s remaining",
                    cred.method.map(|m| m.to_string()).unwrap_or_default(),
                    cred.remaining_seconds(Utc::now())
                );
                self.refresh_count.store(cred.refresh_count, Ordering::SeqCst);
                *self.current.write() = Some(cred);
                true
            }
            None => false,
        }
    }

    /// A usable credential, refreshing first if the cached one is inside the margin.
    ///
    /// `scope` overrides the model whose page/session the sources use.
    pub async fn get_credential(&self, scope: Option<&str>) -> Credential {
        if let Some(cred) = self.cached_valid() {
            return cred;
        }
        self.refresh_single_flight(scope, false).await
    }

    /// Refreshes even if the cached credential is still valid.
    pub async fn force_refresh(&self, scope: Option<&str>) -> Credential {
        self.refresh_single_flight(scope, true).await
    }

    /// Drops the cached credential and its disk record.
    pub async fn invalidate(&self) {
        *self.current.write() = None;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear().await {
                warn!("[Auth] failed to delete credential record: {}", e);
            }
        }
        info!("[Auth] credential invalidated");
    }

    pub fn has_valid(&self) -> bool {
        self.cached_valid().is_some()
    }

    /// Current credential regardless of validity, for status reporting.
    pub fn snapshot(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    fn cached_valid(&self) -> Option<Credential> {
        self.current
            .read()
            .as_ref()
            .filter(|c| c.is_valid_with_margin(Utc::now(), CACHE_MARGIN_SECS))
            .cloned()
    }

    async fn refresh_single_flight(&self, scope: Option<&str>, force: bool) -> Credential {
        let seen = self.generation.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;

        // Someone else finished a refresh while we waited: share its outcome.
        if self.generation.load(Ordering::SeqCst) != seen {
            return self.cached_valid().unwrap_or_else(Credential::empty);
        }
        if !force {
            if let Some(cred) = self.cached_valid() {
                return cred;
            }
        }

        let result = self.run_sources(scope.unwrap_or(&self.default_model)).await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Walks the sources in order. A credential already inside the margin is
    /// kept only as a fallback while later sources get their turn.
    async fn run_sources(&self, model: &str) -> Credential {
        let mut short_lived: Option<(Credential, AuthMethod)> = None;
        for source in &self.sources {
            let method = source.method();
            match source.acquire(model).await {
                Ok(cred) if cred.is_empty() => warn!("[Auth] {} returned an empty token", method),
                Ok(cred) if !cred.is_valid_with_margin(Utc::now(), CACHE_MARGIN_SECS) => {
                    warn!(
                        "[Auth] {} returned a credential with only {}s left; trying the next source",
                        method,
                        cred.remaining_seconds(Utc::now())
                    );
                    if short_lived.as_ref().is_none_or(|(c, _)| cred.expires_at > c.expires_at) {
                        short_lived = Some((cred, method));
                    }
                }
                Ok(cred) => return self.adopt(cred, method).await,
                Err(e) => warn!("[Auth] {} failed: {}", method, e),
            }
        }
        match short_lived {
            Some((cred, method)) if cred.remaining_seconds(Utc::now()) > 0 => {
                warn!("[Auth] no source beat the refresh margin; using the short-lived credential");
                self.adopt(cred, method).await
            }
            _ => {
                error!("[Auth] all credential sources failed; running without a valid credential");
                Credential::empty()
            }
        }
    }

    async fn adopt(&self, mut cred: Credential, method: AuthMethod) -> Credential {
        cred.refresh_count = self.refresh_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "[Auth] acquired credential via {} (expires in {}s)",
            method,
            cred.remaining_seconds(Utc::now())
        );
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&cred).await {
                warn!("[Auth] failed to persist credential: {}", e);
            }
        }
        *self.current.write() = Some(cred.clone());
        cred
    }
}
