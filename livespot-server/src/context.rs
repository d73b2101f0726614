//! livespot-server/src/context.rs
//!
//! The process-wide context: configuration, event bus, credential broker
//! and, unless running auth-only, the database and its repositories.

use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use livespot_common::traits::{CastRepository, EventRepository, OutreachRepository, ProfileRepository, TriggerRepository};
use livespot_core::auth::sources::default_sources;
use livespot_core::auth::{CredentialBroker, CredentialStore};
use livespot_core::config::AppConfig;
use livespot_core::eventbus::EventBus;
use livespot_core::repositories::{
    PostgresCastRepository, PostgresEventRepository, PostgresOutreachRepository, PostgresProfileRepository,
    PostgresTriggerRepository,
};
use livespot_core::retry::RetryTracker;
use livespot_core::Database;

use crate::Args;

pub struct Repositories {
    pub events: Arc<dyn EventRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub casts: Arc<dyn CastRepository>,
    pub outreach: Arc<dyn OutreachRepository>,
    pub triggers: Arc<dyn TriggerRepository>,
}

impl Repositories {
    fn postgres(db: &Database) -> Self {
        let pool = db.pool().clone();
        Self {
            events: Arc::new(PostgresEventRepository::new(pool.clone())),
            profiles: Arc::new(PostgresProfileRepository::new(pool.clone())),
            casts: Arc::new(PostgresCastRepository::new(pool.clone())),
            outreach: Arc::new(PostgresOutreachRepository::new(pool.clone())),
            triggers: Arc::new(PostgresTriggerRepository::new(pool)),
        }
    }
}

pub struct ServerContext {
    pub config: AppConfig,
    pub event_bus: EventBus,
    pub retry: RetryTracker,
    pub broker: Arc<CredentialBroker>,
    pub db: Option<Database>,
    pub repos: Option<Repositories>,
}

impl ServerContext {
    pub async fn new(args: &Args) -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let sources = default_sources(&config.auth)?;
        let store = CredentialStore::new(&config.auth.state_dir);
        let broker = Arc::new(CredentialBroker::new(sources, Some(store), &config.auth.model));
        if !broker.restore().await {
            info!("[Auth] no stored credential; acquiring one");
            broker.get_credential(None).await;
        }

        let (db, repos) = if args.auth_only {
            (None, None)
        } else {
            let url = args
                .db_url
                .clone()
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .context("no database URL: pass --db-url or set DATABASE_URL")?;
            let db = Database::new(&url).await?;
            db.migrate().await?;
            let repos = Repositories::postgres(&db);
            (Some(db), Some(repos))
        };

        Ok(Self {
            config,
            event_bus: EventBus::new(),
            retry: RetryTracker::default(),
            broker,
            db,
            repos,
        })
    }
}
