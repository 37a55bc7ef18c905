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
    about = "Register or clear a user's device registration token"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// User id to upsert
    #[arg(long)]
    user: String,

    /// Optional display name
    #[arg(long)]
    display_name: Option<String>,

    /// Device registration token. Omit to clear the registration.
    #[arg(long)]
    token: Option<String>,
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

    db::upsert_user_token(
        &pool,
        &args.user,
        args.display_name.as_deref(),
        args.token.as_deref(),
    )
    .await?;

    if args.token.is_some() {
        info!(user = %args.user, "device token registered");
    } else {
        info!(user = %args.user, "device token cleared");
    }
    Ok(())
}
