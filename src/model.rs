use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Title used for every event-created notification.
pub const EVENT_CREATED_TITLE: &str = "🎉 New Event Created!";

/// Substituted when the triggering event has no usable name.
pub const FALLBACK_EVENT_NAME: &str = "New Event";

/// Value of the `type` key in the notification data map.
pub const EVENT_CREATED_TYPE: &str = "event_created";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub display_name: Option<String>,
    pub fcm_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral notification payload, built once per trigger invocation and
/// handed to the push-delivery client. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotification {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl EventNotification {
    /// Build the payload for a newly created event. `name` must already have
    /// the fallback applied.
    pub fn event_created(event_id: &str, name: &str) -> Self {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), EVENT_CREATED_TYPE.to_string());
        data.insert("eventId".to_string(), event_id.to_string());
        data.insert("eventName".to_string(), name.to_string());
        Self {
            title: EVENT_CREATED_TITLE.to_string(),
            body: format!("Check out the new event: {}", name),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_created_payload_shape() {
        let n = EventNotification::event_created("ev1", "Beach Cleanup");
        assert_eq!(n.title, "🎉 New Event Created!");
        assert_eq!(n.body, "Check out the new event: Beach Cleanup");
        assert_eq!(n.data.get("type").map(String::as_str), Some("event_created"));
        assert_eq!(n.data.get("eventId").map(String::as_str), Some("ev1"));
        assert_eq!(n.data.get("eventName").map(String::as_str), Some("Beach Cleanup"));
        assert_eq!(n.data.len(), 3);
    }
}
