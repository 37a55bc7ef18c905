//! event-herald: fans a push notification out to every registered device
//! when a new event row appears in the store.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod fcm;
pub mod model;
pub mod notifier;
