use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use event_herald::config;
use event_herald::db;
use event_herald::dispatch;
use event_herald::fcm::{FcmClient, PushDelivery, ServiceAccountKey};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/herald.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let credentials = ServiceAccountKey::from_file(&cfg.fcm.credentials_path)?;
    let push: Arc<dyn PushDelivery> =
        Arc::new(FcmClient::new(cfg.fcm.project_id.clone(), credentials));

    let opts = dispatch::DispatchOptions::from_config(&cfg.app);
    let dispatcher = tokio::spawn(dispatch::run(pool.clone(), push, opts));

    info!("event-herald running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    dispatcher.abort();

    Ok(())
}
