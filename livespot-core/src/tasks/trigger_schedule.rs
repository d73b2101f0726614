// livespot-core/src/tasks/trigger_schedule.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::triggers::{TriggerEngine, CACHE_TTL};

pub const SCHEDULED_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const POST_SESSION_INTERVAL: Duration = Duration::from_secs(60);
/// Delay before the first history-based pass, so ingestion settles first.
pub const FIRST_SCHEDULED_DELAY: Duration = Duration::from_secs(5 * 60);

/// Spawns the periodic trigger work: hourly history-based evaluation, the
/// post-session drain and the trigger cache reload.
pub fn spawn_trigger_scheduler(engine: Arc<TriggerEngine>, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = engine.refresh_triggers(true).await {
            error!("[Trigger] initial trigger load failed: {}", e);
        }

        let start = Instant::now();
        let mut scheduled = interval_at(start + FIRST_SCHEDULED_DELAY, SCHEDULED_INTERVAL);
        scheduled.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut post_session = interval_at(start + POST_SESSION_INTERVAL, POST_SESSION_INTERVAL);
        post_session.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reload = interval_at(start + CACHE_TTL, CACHE_TTL);
        reload.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("[Trigger] scheduler started");
        loop {
            tokio::select! {
                _ = scheduled.tick() => engine.evaluate_scheduled().await,
                _ = post_session.tick() => {
                    engine.process_post_session_queue().await;
                }
                _ = reload.tick() => {
                    if let Err(e) = engine.refresh_triggers(true).await {
                        error!("[Trigger] trigger reload failed: {}", e);
                    }
                }
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[Trigger] scheduler stopped");
    })
}
