//! Trigger dispatch: the event-routing collaborator that invokes the
//! notifier once per created event, at least once, with no ordering across
//! events.

use crate::config;
use crate::db::{self, Pool};
use crate::fcm::PushDelivery;
use crate::notifier;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub poll_interval: Duration,
    pub lease_secs: i64,
    pub max_backoff_secs: i64,
    /// Number of worker loops, i.e. the cap on concurrently running trigger
    /// invocations.
    pub max_concurrent: usize,
}

impl DispatchOptions {
    pub fn from_config(app: &config::App) -> Self {
        Self {
            poll_interval: Duration::from_millis(app.poll_interval_ms),
            lease_secs: app.lease_seconds as i64,
            max_backoff_secs: app.max_backoff_seconds as i64,
            max_concurrent: app.max_concurrent_triggers,
        }
    }
}

/// Claim and run at most one due trigger. Returns `Ok(true)` if one was
/// claimed (whether or not the handler succeeded).
#[instrument(skip_all)]
pub async fn process_next_trigger(
    pool: &Pool,
    push: &dyn PushDelivery,
    lease_secs: i64,
    max_backoff_secs: i64,
) -> Result<bool> {
    let Some(trigger) = db::claim_due_trigger(pool, lease_secs).await? else {
        return Ok(false);
    };

    let outcome = match db::fetch_event(pool, &trigger.event_id).await {
        Ok(event) => notifier::notify_event_created(pool, push, &event).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(()) => {
            db::mark_trigger_notified(pool, &trigger.event_id).await?;
            info!(event_id = %trigger.event_id, "event trigger processed");
        }
        Err(err) => {
            warn!(
                ?err,
                event_id = %trigger.event_id,
                attempt = trigger.attempt,
                "event trigger failed; backoff"
            );
            db::backoff_trigger_with_cap(pool, &trigger.event_id, trigger.attempt, max_backoff_secs)
                .await?;
        }
    }
    Ok(true)
}

/// Run `max_concurrent` polling workers until the task is aborted. Workers
/// coordinate only through the atomic claim, so two events created close
/// together are handled in parallel.
pub async fn run(pool: Pool, push: Arc<dyn PushDelivery>, opts: DispatchOptions) {
    info!(workers = opts.max_concurrent, "starting trigger dispatcher");
    let mut handles = Vec::with_capacity(opts.max_concurrent);
    for worker in 0..opts.max_concurrent {
        let pool = pool.clone();
        let push = push.clone();
        let opts = opts.clone();
        handles.push(tokio::spawn(async move {
            loop {
                match process_next_trigger(
                    &pool,
                    push.as_ref(),
                    opts.lease_secs,
                    opts.max_backoff_secs,
                )
                .await
                {
                    Ok(processed) => {
                        if !processed {
                            tokio::time::sleep(opts.poll_interval).await;
                        }
                    }
                    Err(err) => {
                        error!(worker, ?err, "dispatch worker error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}
