// livespot-core/src/tasks/credential_refresh.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::auth::broker::CredentialBroker;
use crate::eventbus::{EventBus, LiveEvent};
use crate::retry::RetryTracker;

pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// Remaining lifetime under which the daemon refreshes ahead of time.
pub const REFRESH_MARGIN_SECS: i64 = 30 * 60;
pub const RETRY_KEY: &str = "auth:refresh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Still more than the margin left.
    Fresh { remaining_secs: i64 },
    Refreshed { remaining_secs: i64 },
    Failed,
}

/// Refreshes the broker's credential when it is missing or inside `margin_secs`.
pub async fn refresh_if_expiring(
    broker: &CredentialBroker,
    retry: &RetryTracker,
    bus: &EventBus,
    margin_secs: i64,
) -> RefreshOutcome {
    let now = Utc::now();
    if let Some(cred) = broker.snapshot().filter(|c| !c.is_empty()) {
        let remaining = cred.remaining_seconds(now);
        if remaining > margin_secs {
            debug!("[Auth] credential valid for {}s more", remaining);
            return RefreshOutcome::Fresh { remaining_secs: remaining };
        }
        info!("[Auth] credential expires in {}s; refreshing", remaining);
    } else {
        info!("[Auth] no credential held; refreshing");
    }

    let cred = broker.force_refresh(None).await;
    if cred.is_empty() {
        retry.record_failure(RETRY_KEY);
        error!("[Auth] background refresh failed ({} consecutive)", retry.failure_count(RETRY_KEY));
        return RefreshOutcome::Failed;
    }

    retry.record_success(RETRY_KEY);
    retry.reset_by_prefix("stream:");
    bus.publish(LiveEvent::CredentialRefreshed { method: cred.method }).await;
    RefreshOutcome::Refreshed {
        remaining_secs: cred.remaining_seconds(Utc::now()),
    }
}

/// Spawns the daemon that keeps the stream credential ahead of its expiry.
pub fn spawn_credential_refresh_task(
    broker: Arc<CredentialBroker>,
    retry: RetryTracker,
    bus: EventBus,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("[Auth] refresh daemon started (every {:?})", CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = sleep(CHECK_INTERVAL) => {
                    refresh_if_expiring(&broker, &retry, &bus, REFRESH_MARGIN_SECS).await;
                }
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[Auth] refresh daemon stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use livespot_common::models::{AuthMethod, Credential};
    use crate::auth::sources::{CredentialSource, MockCredentialSource};
    use crate::Error;

    fn cred(ttl: i64) -> Credential {
        Credential {
            jwt: "jwt".into(),
            cf_clearance: "cf".into(),
            ws_url: "wss://x".into(),
            user_id: "1".into(),
            expires_at: Utc::now().timestamp() + ttl,
            method: Some(AuthMethod::RestApi),
            acquired_at: Utc::now(),
            refresh_count: 0,
        }
    }

    fn broker_with_ttl(ttl: i64) -> CredentialBroker {
        let mut m = MockCredentialSource::new();
        m.expect_method().return_const(AuthMethod::RestApi);
        m.expect_acquire().returning(move |_| Ok(cred(ttl)));
        let sources: Vec<Arc<dyn CredentialSource>> = vec![Arc::new(m)];
        CredentialBroker::new(sources, None, "model")
    }

    #[tokio::test]
    async fn leaves_a_fresh_credential_alone() {
        let broker = broker_with_ttl(3600);
        broker.get_credential(None).await;
        let before = broker.refresh_count();
        let outcome = refresh_if_expiring(&broker, &RetryTracker::default(), &EventBus::new(), REFRESH_MARGIN_SECS).await;
        assert!(matches!(outcome, RefreshOutcome::Fresh { .. }));
        assert_eq!(broker.refresh_count(), before);
    }

    #[tokio::test]
    async fn refreshes_inside_margin_and_clears_stream_backoff() {
        let broker = broker_with_ttl(600);
        broker.get_credential(None).await;
        let retry = RetryTracker::default();
        retry.record_failure("stream:alice");
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(4)).await;

        let outcome = refresh_if_expiring(&broker, &retry, &bus, REFRESH_MARGIN_SECS).await;
        assert!(matches!(outcome, RefreshOutcome::Refreshed { .. }));
        assert_eq!(retry.failure_count("stream:alice"), 0);
        assert!(matches!(rx.try_recv(), Ok(LiveEvent::CredentialRefreshed { method: Some(AuthMethod::RestApi) })));
    }

    #[tokio::test]
    async fn failure_is_counted() {
        let mut m = MockCredentialSource::new();
        m.expect_method().return_const(AuthMethod::Env);
        m.expect_acquire().returning(|_| Err(Error::Auth("nope".into())));
        let sources: Vec<Arc<dyn CredentialSource>> = vec![Arc::new(m)];
        let broker = CredentialBroker::new(sources, None, "model");
        let retry = RetryTracker::default();

        let outcome = refresh_if_expiring(&broker, &retry, &EventBus::new(), REFRESH_MARGIN_SECS).await;
        assert_eq!(outcome, RefreshOutcome::Failed);
        assert_eq!(retry.failure_count(RETRY_KEY), 1);
    }
}
