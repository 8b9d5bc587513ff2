use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use uptimer_service::config::Config;
use uptimer_service::database::{self, Database, DatabaseImpl};
use uptimer_service::monitoring::{CheckRunner, NetworkCheckRunner};
use uptimer_service::notify::{HttpTransport, WebhookTransport};
use uptimer_service::pool;
use uptimer_service::scheduler::{run_retention, Scheduler};

#[derive(Debug, Parser)]
#[command(name = "uptimer-service", version, about = "Uptime monitoring engine")]
struct Args {
    /// Path to the TOML config file; defaults to
    /// $XDG_CONFIG_HOME/uptimer/config.toml and is created when missing.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single scheduler tick and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();

    let args = Args::parse();
    let config = Config::from_config(args.config.as_ref())
        .map_err(|err| anyhow::anyhow!("failed to load config: {err:?}"))?;

    let pool = pool::build_pool(&config.database.path).await.context("opening database")?;
    {
        let conn = pool.get().await?;
        database::initialize_database(&conn).await.context("running migrations")?;
    }

    let db: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
    let checks: Arc<dyn CheckRunner> = Arc::new(NetworkCheckRunner::new());
    let transport: Arc<dyn WebhookTransport> = Arc::new(HttpTransport::new());
    let scheduler = Scheduler::new(db.clone(), checks, transport);

    if args.once {
        scheduler.run_tick(Utc::now().timestamp()).await?;
        scheduler.drain_background().await;
        return Ok(());
    }

    info!(
        tick_seconds = config.scheduler.tick_seconds,
        retention_seconds = config.scheduler.retention_seconds,
        database = %config.database.path,
        "starting scheduler"
    );

    let retention_db = db.clone();
    let retention_secs = config.scheduler.retention_seconds.max(60);
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(retention_secs));
        loop {
            timer.tick().await;
            if let Err(err) = run_retention(retention_db.as_ref(), Utc::now().timestamp()).await {
                error!(error = %err, "retention run failed");
            }
        }
    });

    let mut timer = tokio::time::interval(Duration::from_secs(config.scheduler.tick_seconds.max(1)));
    loop {
        timer.tick().await;
        if let Err(err) = scheduler.run_tick(Utc::now().timestamp()).await {
            error!(error = %err, "scheduler tick failed");
        }
    }
}
