//! Error type shared by every bus-tracker module.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed route file {path}: {source}")]
    MalformedRoute {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("route '{0}' has no coordinates")]
    EmptyRoute(String),

    #[error("malformed position payload: {0}")]
    MalformedPosition(#[source] serde_json::Error),

    #[error("malformed viewer message: {0}")]
    MalformedViewerMessage(#[source] serde_json::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("viewer transport error: {0}")]
    Transport(String),

    #[error("write deadline of {0:?} exceeded")]
    WriteTimeout(std::time::Duration),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
