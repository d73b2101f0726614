// livespot-core/src/tasks/profile_flush.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use livespot_common::traits::CastRepository;
use crate::profiles::ProfileAccumulator;

pub const PROFILE_FLUSH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Periodically pushes observed viewer levels into `paid_users`, and once more on shutdown.
pub fn spawn_profile_flush_task(
    profiles: Arc<ProfileAccumulator>,
    casts: Arc<dyn CastRepository>,
    account_id: String,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let stop = tokio::select! {
                _ = sleep(PROFILE_FLUSH_INTERVAL) => false,
                res = shutdown_rx.changed() => res.is_err() || *shutdown_rx.borrow(),
            };
            match profiles.flush(&account_id, casts.as_ref()).await {
                Ok(0) => {}
                Ok(n) => info!("[Profiles] raised {} user levels", n),
                Err(e) => error!("[Profiles] flush failed: {}", e),
            }
            if stop {
                break;
            }
        }
    })
}
