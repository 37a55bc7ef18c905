use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

use event_herald::config;
use event_herald::fcm::{FcmClient, PushDelivery, ServiceAccountKey};
use event_herald::model::EventNotification;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Send a test event notification to one device token"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Device registration token to probe
    #[arg(long)]
    token: String,

    /// Name to embed in the test notification
    #[arg(long, default_value = "Connectivity Probe")]
    name: String,
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

    let credentials = ServiceAccountKey::from_file(&cfg.fcm.credentials_path)?;
    let client = FcmClient::new(cfg.fcm.project_id.clone(), credentials);

    let probe_id = format!("probe-{}", Uuid::new_v4());
    let notification = EventNotification::event_created(&probe_id, &args.name);

    let tokens = vec![args.token];
    let report = client.send_to_devices(&tokens, &notification).await?;
    println!(
        "sent: {} ok, {} failed",
        report.success_count, report.failure_count
    );
    for outcome in report.outcomes {
        match outcome.error {
            None => println!("  {} -> {}", outcome.token, outcome.message_id.unwrap_or_default()),
            Some(err) => println!("  {} -> ERROR: {}", outcome.token, err),
        }
    }
    Ok(())
}
