//! The event-created fan-out handler.
//!
//! Runs once per trigger invocation: read every registered device token,
//! build the notification payload, and hand the whole recipient list to the
//! push-delivery client in one call. Strictly a reader — event and user rows
//! are never written here.

use crate::db::{self, Pool};
use crate::fcm::PushDelivery;
use crate::model::{EventNotification, EventRecord, FALLBACK_EVENT_NAME};
use anyhow::Result;
use tracing::{error, info, instrument};

/// Build the payload for an event, applying the name fallback.
pub fn build_notification(event: &EventRecord) -> EventNotification {
    let name = event
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_EVENT_NAME);
    EventNotification::event_created(&event.id, name)
}

/// Notify all registered devices that `event` was created.
///
/// Only the user-registry read can fail this invocation (the trigger
/// collaborator will redeliver it). An empty recipient list is a successful
/// no-op; a delivery-service failure is logged and swallowed.
#[instrument(skip_all, fields(event_id = %event.id))]
pub async fn notify_event_created(
    pool: &Pool,
    push: &dyn PushDelivery,
    event: &EventRecord,
) -> Result<()> {
    let users = db::list_users(pool).await?;

    // Non-empty tokens in returned order; duplicates are kept as-is.
    let tokens: Vec<String> = users
        .into_iter()
        .filter_map(|u| u.fcm_token)
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        info!("no device tokens registered; skipping push");
        return Ok(());
    }

    let notification = build_notification(event);
    match push.send_to_devices(&tokens, &notification).await {
        Ok(report) => {
            info!(
                success = report.success_count,
                failed = report.failure_count,
                recipients = tokens.len(),
                "event notification sent"
            );
        }
        Err(err) => {
            error!(?err, "failed to deliver event notification");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(id: &str, name: Option<&str>) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            name: name.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn notification_uses_event_name() {
        let n = build_notification(&event("ev1", Some("Beach Cleanup")));
        assert_eq!(n.body, "Check out the new event: Beach Cleanup");
        assert_eq!(n.data.get("eventName").map(String::as_str), Some("Beach Cleanup"));
    }

    #[test]
    fn missing_name_falls_back() {
        let n = build_notification(&event("ev2", None));
        assert_eq!(n.body, "Check out the new event: New Event");
        assert_eq!(n.data.get("eventName").map(String::as_str), Some("New Event"));
    }

    #[test]
    fn empty_name_falls_back() {
        let n = build_notification(&event("ev3", Some("")));
        assert_eq!(n.body, "Check out the new event: New Event");
    }
}
