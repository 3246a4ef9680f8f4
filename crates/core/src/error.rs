use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TickertapeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to close {}: {source}", path.display())]
    Close {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("sink is closed")]
    SinkClosed,

    #[error("sink failed earlier and accepts no more writes")]
    SinkFailed,
}

pub type Result<T> = std::result::Result<T, TickertapeError>;
