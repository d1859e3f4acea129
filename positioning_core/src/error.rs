//! Error types for the positioning engine.

use thiserror::Error;

/// Failure of a multilateration solve. State is never updated on any of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("need at least {required} anchors, got {got}")]
    TooFewAnchors { required: usize, got: usize },

    #[error("{positions} anchor positions but {distances} distances")]
    LengthMismatch { positions: usize, distances: usize },

    #[error("degenerate anchor geometry: {0}")]
    InvalidGeometry(&'static str),

    #[error("solver produced a non-finite position")]
    NonFinite,
}

/// Failure to load or validate an [`IpsConfig`](crate::config::IpsConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Failure to decode an inbound message. Callers drop the message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessageError {
    #[error("topic '{0}' is not routed to the tracker")]
    UnknownTopic(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("payload is missing field '{0}'")]
    MissingField(&'static str),

    #[error("distance {0} is not a finite non-negative number")]
    InvalidDistance(f64),
}
