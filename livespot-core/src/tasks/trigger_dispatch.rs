// livespot-core/src/tasks/trigger_dispatch.rs

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::eventbus::{EventBus, LiveEvent};
use crate::triggers::TriggerEngine;

/// Routes one bus event to the matching trigger-engine hook.
pub async fn dispatch(engine: &TriggerEngine, event: &LiveEvent) {
    match event {
        LiveEvent::ViewerSnapshot { account_id, cast_name, viewers } => {
            engine.on_viewer_list_update(account_id, cast_name, viewers).await;
            engine.increment_warmup();
        }
        LiveEvent::SessionStarted { account_id, cast_name, session_id } => {
            info!("[Trigger] {} went live (session {})", cast_name, session_id);
            engine.on_session_start(account_id, cast_name).await;
        }
        LiveEvent::SessionEnded { account_id, cast_name, session_id } => {
            info!("[Trigger] {} went offline", cast_name);
            engine.on_session_end(account_id, cast_name, *session_id).await;
        }
        LiveEvent::Message(_) | LiveEvent::CredentialRefreshed { .. } => {}
    }
}

/// Subscribes to the bus and feeds the trigger engine until shutdown.
/// The subscription exists before this returns, so no early event is missed.
pub async fn spawn_trigger_dispatcher(engine: Arc<TriggerEngine>, bus: EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe(Some(512)).await;
    tokio::spawn(async move {
        let mut shutdown_rx = bus.shutdown_rx.clone();
        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(event) = maybe else { break };
                    debug!("[Trigger] event {}", event.event_type());
                    dispatch(&engine, &event).await;
                }
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[Trigger] dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use livespot_common::models::NormalizedViewer;
    use crate::config::EvaluatorCaps;
    use crate::store::MemoryStore;
    use crate::test_utils::MemoryRepos;
    use crate::triggers::{TriggerRepos, TriggerState};

    fn engine() -> TriggerEngine {
        let repos = Arc::new(MemoryRepos::new());
        TriggerEngine::new(
            TriggerRepos {
                triggers: repos.clone(),
                outreach: repos.clone(),
                profiles: repos.clone(),
                casts: repos,
            },
            TriggerState {
                known_viewers: MemoryStore::shared(),
                segment_snapshots: MemoryStore::shared(),
            },
            EvaluatorCaps::default(),
        )
    }

    fn snapshot() -> LiveEvent {
        LiveEvent::ViewerSnapshot {
            account_id: "acct".into(),
            cast_name: "alice".into(),
            viewers: vec![NormalizedViewer {
                user_name: "fan".into(),
                user_id: "1".into(),
                league: String::new(),
                level: 0,
                is_fan_club: false,
                is_new: true,
            }],
        }
    }

    #[tokio::test]
    async fn viewer_polls_count_toward_warmup() {
        let engine = engine();
        dispatch(&engine, &snapshot()).await;
        assert!(!engine.is_warm());
        dispatch(&engine, &snapshot()).await;
        assert!(engine.is_warm());
    }

    #[tokio::test]
    async fn session_start_ends_warmup() {
        let engine = engine();
        dispatch(
            &engine,
            &LiveEvent::SessionStarted {
                account_id: "acct".into(),
                cast_name: "alice".into(),
                session_id: Uuid::new_v4(),
            },
        )
        .await;
        assert!(engine.is_warm());
    }
}
