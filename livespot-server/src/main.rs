use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod context;
mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "livespot")]
#[command(author, version, about = "livespot - live-stream monitoring, triggers and outreach queue")]
pub struct Args {
    /// Postgres connection URL. Falls back to DATABASE_URL.
    #[arg(long)]
    db_url: Option<String>,

    /// Port of the local credential endpoint.
    #[arg(long, default_value_t = 3847)]
    auth_port: u16,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Account whose casts, triggers and queue this process serves. Falls back to ACCOUNT_ID.
    #[arg(long)]
    account_id: Option<String>,

    /// Cast to watch, as `name` or `name:model_id`. Repeatable.
    /// Without any, the account's registered casts are watched.
    #[arg(long = "cast")]
    casts: Vec<String>,

    /// Don't run the outreach sender.
    #[arg(long, default_value = "false")]
    no_outreach: bool,

    /// Don't run the trigger engine.
    #[arg(long, default_value = "false")]
    no_triggers: bool,

    /// Only keep the credential fresh and serve it; no database.
    #[arg(long, default_value = "false")]
    auth_only: bool,
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    tracing_log::LogTracer::init()?;
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level)?;
    server::run_server(args).await
}
