// livespot-core/src/tasks/cast_monitors.rs

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use livespot_common::traits::{EventRepository, ProfileRepository};
use crate::auth::broker::CredentialBroker;
use crate::config::PollConfig;
use crate::eventbus::EventBus;
use crate::ingest::{BatchWriter, CastMonitor, MonitorDeps};
use crate::platforms::stripchat::client::StreamClientConfig;
use crate::platforms::stripchat::rest::PlatformRest;
use crate::profiles::ProfileAccumulator;
use crate::retry::RetryTracker;

/// A cast to watch, as given on the command line: `name` or `name:model_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastTarget {
    pub cast_name: String,
    pub model_id: Option<String>,
}

impl CastTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, model) = match raw.split_once(':') {
            Some((n, m)) => (n.trim(), Some(m.trim()).filter(|m| !m.is_empty())),
            None => (raw.trim(), None),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            cast_name: name.to_string(),
            model_id: model.map(str::to_string),
        })
    }
}

/// Everything the monitors of one account share.
pub struct IngestContext {
    pub account_id: String,
    pub events: Arc<dyn EventRepository>,
    pub profile_repo: Arc<dyn ProfileRepository>,
    pub writer: Arc<BatchWriter>,
    pub profiles: Arc<ProfileAccumulator>,
    pub bus: EventBus,
    pub rest: PlatformRest,
    pub broker: Arc<CredentialBroker>,
    pub retry: RetryTracker,
    pub poll: PollConfig,
    pub stream_config: StreamClientConfig,
}

/// Spawns the batch flusher plus one monitor task per cast.
pub fn spawn_cast_monitors(ctx: &IngestContext, targets: &[CastTarget]) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(targets.len() + 1);
    handles.push(tokio::spawn(ctx.writer.clone().run(ctx.bus.shutdown_rx.clone())));

    for target in targets {
        let monitor = Arc::new(CastMonitor::new(
            ctx.account_id.clone(),
            target.cast_name.clone(),
            target.model_id.clone(),
            ctx.events.clone(),
            ctx.writer.clone(),
            ctx.profiles.clone(),
            ctx.bus.clone(),
        ));
        let deps = MonitorDeps {
            rest: ctx.rest.clone(),
            broker: ctx.broker.clone(),
            retry: ctx.retry.clone(),
            poll: ctx.poll.clone(),
            stream_config: ctx.stream_config.clone(),
            profile_repo: ctx.profile_repo.clone(),
        };
        info!("[Stream] watching {}", target.cast_name);
        handles.push(tokio::spawn(monitor.run(deps, ctx.bus.shutdown_rx.clone())));
    }
    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cast_arguments() {
        assert_eq!(
            CastTarget::parse("alice:12345"),
            Some(CastTarget { cast_name: "alice".into(), model_id: Some("12345".into()) })
        );
        assert_eq!(
            CastTarget::parse(" bob "),
            Some(CastTarget { cast_name: "bob".into(), model_id: None })
        );
        assert_eq!(CastTarget::parse("carol:"), Some(CastTarget { cast_name: "carol".into(), model_id: None }));
        assert_eq!(CastTarget::parse(":1"), None);
    }
}
