// livespot-core/src/tasks/outreach_worker.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::outreach::{BatchSummary, OutreachProcessor};

/// One poll: process a batch and log what happened.
pub async fn run_once(processor: &OutreachProcessor) -> Option<BatchSummary> {
    match processor.process_batch().await {
        Ok(summary) => {
            if !summary.is_idle() {
                info!(
                    "[Outreach] batch: {} fetched, {} sent, {} errors, {} blocked, {} requeued",
                    summary.fetched, summary.sent, summary.errors, summary.blocked, summary.requeued
                );
            }
            for (account, halt) in &summary.halted {
                warn!("[Outreach] account {} paused: {:?}", account, halt);
            }
            Some(summary)
        }
        Err(e) => {
            error!("[Outreach] batch failed: {}", e);
            None
        }
    }
}

/// Polls the outreach queue every `poll_interval` until shutdown.
pub fn spawn_outreach_worker(
    processor: Arc<OutreachProcessor>,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let gate = processor.gate();
        if gate.test_mode() {
            let names: Vec<&str> = gate.whitelist().map(String::as_str).collect();
            warn!("[Outreach] TEST MODE: sending only to [{}]", names.join(", "));
        } else {
            warn!("[Outreach] LIVE MODE: sending to every queued target");
        }
        info!("[Outreach] worker polling every {:?}", poll_interval);

        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_once(&processor).await;
                }
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[Outreach] worker stopped");
    })
}
