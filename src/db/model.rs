//! Database view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

/// Trigger slice handed to the dispatch worker after a successful claim.
#[derive(Debug, Clone)]
pub struct DueTrigger {
    pub event_id: String,
    pub attempt: i32,
}
