//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: view models returned to the dispatch worker.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `event_herald::db` — we re-export the
//! repository API and the worker view models for convenience.

pub mod model;
pub mod repo;

pub use model::DueTrigger;
pub use repo::*;
