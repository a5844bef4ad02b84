//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when reading or incrementing step counters.
    Db(String),
    /// A declared step's action failed.
    Step(String),
    /// Connection-level failure of the event stream.
    Transport(String),
    /// Structured error payload delivered by a `requestError` event.
    Request(serde_json::Value),
    /// JSON encoding or decoding failure.
    Serialization(String),
    /// A deferred value was dropped before it was settled.
    Unsettled(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Step(msg) => write!(f, "step: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Request(payload) => write!(f, "request error: {payload}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Unsettled(msg) => write!(f, "unsettled: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest_eventsource::Error> for AppError {
    fn from(err: reqwest_eventsource::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
