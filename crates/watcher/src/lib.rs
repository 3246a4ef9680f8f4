//! Watch source backed by the Nomad HTTP API.
//!
//! Each of `/v1/allocations`, `/v1/evaluations`, `/v1/jobs` and `/v1/nodes`
//! is long-polled with blocking queries; items modified since the last seen
//! index become events. Allocations additionally yield one task-state event
//! per newly seen task event.

pub mod client;
pub mod config;
pub mod error;
pub mod tracker;
pub mod watch;

pub use client::{Endpoint, ListApi, Listing, NomadClient};
pub use config::NomadConfig;
pub use error::WatchError;
pub use watch::{spawn_watchers, WatchOptions};
