//! shadow-tail - Near real-time tailing and indexing of agent rollout sessions.
//!
//! Rollout files are located and watched by [`watcher`], parsed
//! incrementally, turned into normalized events by [`extract`], and indexed
//! per session by [`store`], which persists resumable progress through
//! [`persist`].

pub mod config;
pub mod display;
pub mod extract;
pub mod persist;
pub mod store;
pub mod watcher;
