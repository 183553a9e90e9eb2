//! # Bulk Invite Server Library
//!
//! Core library for adding many users to a channel in one background job.
//! It provides a TTL-bounded lock keyed by channel, a write-through
//! expiring cache over a key/value backing store, and the job engine that
//! resolves users, applies membership changes and reports the outcome.
//!
//! ## Modules
//!
//! - [`common`] - Error taxonomy shared by all layers
//! - [`config`] - Engine tunables with defaults
//! - [`directory`] - Directory and notification capabilities the engine calls into
//! - [`engine`] - Job engine, membership resolver and result tallies
//! - [`kvstore`] - Backing store, expiring cache, cached store and lock store
//! - [`request`] - Submitted payload parsing and validation
//! - [`taskpool`] - Tracker for detached background jobs

pub mod common;
pub mod config;
pub mod directory;
pub mod engine;
pub mod kvstore;
pub mod request;
pub mod taskpool;
