use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use event_herald::config;
use event_herald::db;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Insert an event row and enqueue its creation trigger"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Event name. Omit to exercise the missing-name fallback.
    #[arg(long)]
    name: Option<String>,
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

    let event_id = db::insert_event(&pool, args.name.as_deref()).await?;
    info!(%event_id, name = args.name.as_deref().unwrap_or("<none>"), "event created");
    println!("{}", event_id);
    Ok(())
}
