//! Linkshelf: the bookmark synchronization core.
//!
//! Keeps a filtered, in-memory projection of a user's bookmarks consistent
//! with a remote store while other sessions edit concurrently and the live
//! update channel comes and goes.

pub mod app;
pub mod database;
pub mod gateway;
pub mod managers;
pub mod services;
pub mod types;
