//! livespot-server/src/server.rs
//!
//! Wires the context into the long-lived tasks and waits for Ctrl-C.

use std::sync::Arc;

use anyhow::{bail, Context as _};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use livespot_common::traits::CastRepository;
use livespot_core::auth::server::AuthServerState;
use livespot_core::auth::start_auth_server;
use livespot_core::ingest::BatchWriter;
use livespot_core::outreach::{OutreachProcessor, StripchatOutreachApi};
use livespot_core::platforms::stripchat::client::StreamClientConfig;
use livespot_core::platforms::stripchat::rest::PlatformRest;
use livespot_core::profiles::ProfileAccumulator;
use livespot_core::store::MemoryStore;
use livespot_core::tasks::cast_monitors::{spawn_cast_monitors, CastTarget, IngestContext};
use livespot_core::tasks::credential_refresh::spawn_credential_refresh_task;
use livespot_core::tasks::outreach_worker::spawn_outreach_worker;
use livespot_core::tasks::profile_flush::spawn_profile_flush_task;
use livespot_core::tasks::trigger_dispatch::spawn_trigger_dispatcher;
use livespot_core::tasks::trigger_schedule::spawn_trigger_scheduler;
use livespot_core::triggers::{TriggerEngine, TriggerRepos, TriggerState};

use crate::context::{Repositories, ServerContext};
use crate::Args;

pub async fn run_server(args: Args) -> anyhow::Result<()> {
    let ctx = ServerContext::new(&args).await?;
    let bus = ctx.event_bus.clone();

    let auth_server = start_auth_server(
        AuthServerState { broker: ctx.broker.clone(), retry: ctx.retry.clone() },
        args.auth_port,
    )
    .await?;

    let mut handles: Vec<JoinHandle<()>> = vec![spawn_credential_refresh_task(
        ctx.broker.clone(),
        ctx.retry.clone(),
        bus.clone(),
        bus.shutdown_rx.clone(),
    )];

    if let Some(repos) = &ctx.repos {
        handles.extend(start_pipeline(&args, &ctx, repos).await?);
    } else {
        info!("auth-only mode: serving credentials on {}", auth_server.addr);
    }

    let bus_for_ctrlc = bus.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down...");
        bus_for_ctrlc.shutdown();
    });

    let mut shutdown_rx = bus.shutdown_rx.clone();
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    auth_server.shutdown();
    for h in handles {
        if let Err(e) = h.await {
            warn!("task ended abnormally: {}", e);
        }
    }
    info!("Shutdown complete.");
    Ok(())
}

/// Starts ingestion, triggers and outreach for one account.
async fn start_pipeline(args: &Args, ctx: &ServerContext, repos: &Repositories) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let account_id = args
        .account_id
        .clone()
        .or_else(|| std::env::var("ACCOUNT_ID").ok())
        .filter(|a| !a.trim().is_empty())
        .context("no account: pass --account-id or set ACCOUNT_ID")?;
    let bus = ctx.event_bus.clone();
    let mut handles = Vec::new();

    // Casts to watch: explicit arguments win over the registry.
    let mut targets: Vec<CastTarget> = args.casts.iter().filter_map(|c| CastTarget::parse(c)).collect();
    if targets.is_empty() {
        targets = repos
            .casts
            .registered_casts(&account_id)
            .await?
            .into_iter()
            .map(|c| CastTarget { cast_name: c.cast_name, model_id: None })
            .collect();
    }
    if targets.is_empty() {
        warn!("no casts to watch for account {}", account_id);
    }

    // Triggers subscribe before ingestion starts publishing.
    if !args.no_triggers {
        let engine = Arc::new(TriggerEngine::new(
            TriggerRepos {
                triggers: repos.triggers.clone(),
                outreach: repos.outreach.clone(),
                profiles: repos.profiles.clone(),
                casts: repos.casts.clone(),
            },
            TriggerState {
                known_viewers: MemoryStore::shared(),
                segment_snapshots: MemoryStore::shared(),
            },
            ctx.config.caps.clone(),
        ));
        handles.push(spawn_trigger_dispatcher(engine.clone(), bus.clone()).await);
        handles.push(spawn_trigger_scheduler(engine, bus.shutdown_rx.clone()));
    }

    let profiles = Arc::new(ProfileAccumulator::new(MemoryStore::shared()));
    let ingest = IngestContext {
        account_id: account_id.clone(),
        events: repos.events.clone(),
        profile_repo: repos.profiles.clone(),
        writer: Arc::new(BatchWriter::new(repos.events.clone())),
        profiles: profiles.clone(),
        bus: bus.clone(),
        rest: PlatformRest::new()?,
        broker: ctx.broker.clone(),
        retry: ctx.retry.clone(),
        poll: ctx.config.poll.clone(),
        stream_config: StreamClientConfig::default(),
    };
    handles.extend(spawn_cast_monitors(&ingest, &targets));
    handles.push(spawn_profile_flush_task(
        profiles,
        repos.casts.clone(),
        account_id.clone(),
        bus.shutdown_rx.clone(),
    ));

    if !args.no_outreach {
        let outreach = &ctx.config.outreach;
        if outreach.batch_size <= 0 || outreach.daily_limit <= 0 {
            bail!("DM_BATCH_SIZE and DM_DAILY_LIMIT must be positive");
        }
        let processor = Arc::new(OutreachProcessor::new(
            repos.outreach.clone(),
            repos.casts.clone(),
            Arc::new(StripchatOutreachApi::new()?),
            outreach,
        ));
        match processor.queue_count(&account_id).await {
            Ok(n) => info!("[Outreach] {} queued for {}", n, account_id),
            Err(e) => warn!("[Outreach] queue depth unavailable: {}", e),
        }
        handles.push(spawn_outreach_worker(processor, outreach.poll_interval, bus.shutdown_rx.clone()));
    }

    info!(
        "pipeline started for {}: {} casts, triggers {}, outreach {}",
        account_id,
        targets.len(),
        if args.no_triggers { "off" } else { "on" },
        if args.no_outreach { "off" } else { "on" },
    );
    Ok(handles)
}
