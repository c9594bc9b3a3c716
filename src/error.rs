use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Transport, HTTP status, or payload failures from any upstream source.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: ureq::Error,
    },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed response from {url}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing field `{field}` in {context}")]
    MissingField { field: &'static str, context: String },
    #[error("invalid start time `{value}`")]
    InvalidTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("unrecognised game status `{0}`")]
    UnknownStatus(String),
    #[error("upstream worker task failed")]
    Worker(#[from] tokio::task::JoinError),
}

impl UpstreamError {
    /// Map a ureq failure, keeping HTTP status failures distinct from transport ones.
    pub fn from_ureq(url: &str, error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) => UpstreamError::Status { url: url.to_string(), status },
            source => UpstreamError::Request { url: url.to_string(), source },
        }
    }
}

/// Failures of the state store backend itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file {path} could not be accessed")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is not a valid JSON object")]
    File {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode value for `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[cfg(feature = "redis-store")]
    #[error("redis command failed")]
    Redis(#[from] redis::RedisError),
}

/// A persisted value that no longer parses. Readers log it and fall back to an empty value.
#[derive(Debug, Error)]
#[error("persisted value for `{key}` is corrupt")]
pub struct StateCorruption {
    pub key: String,
    #[source]
    pub source: serde_json::Error,
}

/// A single failed delivery to one recipient.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed")]
    Transport {
        recipient: String,
        #[source]
        source: ureq::Error,
    },
    #[error("delivery to {recipient} rejected with status {status}")]
    Rejected { recipient: String, status: u16 },
}

impl NotifyError {
    pub fn from_ureq(recipient: &str, error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) => NotifyError::Rejected { recipient: recipient.to_string(), status },
            source => NotifyError::Transport { recipient: recipient.to_string(), source },
        }
    }
}

/// Errors surfaced by game initialization, polling, and discovery.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("no game scheduled on {date}")]
    ScheduleEmpty { date: NaiveDate },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("monitor worker task failed")]
    Worker(#[from] tokio::task::JoinError),
}
