//! Error types for the realtime protocol

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Unknown caller role: {0}")]
    UnknownRole(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
}
