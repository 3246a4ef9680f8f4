//! Watcher error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("missing or invalid X-Nomad-Index header from {0}")]
    Index(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}
