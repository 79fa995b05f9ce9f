//! Realtime client error types

use helpdesk_shared::ProtocolError;

/// Error type for realtime client operations
///
/// Transport failures never surface here: they are recovered by the
/// reconnect policy and reported through lifecycle events instead.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("Connection is not open")]
    NotConnected,

    #[error("Connection did not open after {0} send retries")]
    SendRetriesExhausted(usize),

    #[error("Subscriptions are not available on this client")]
    SubscriptionsUnavailable,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Identity store error: {0}")]
    Identity(String),

    #[error("Type handlers are already registered")]
    HandlersAlreadyRegistered,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Returns true if retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RealtimeError::NotConnected => true,
            RealtimeError::SendRetriesExhausted(_) => true,

            RealtimeError::SubscriptionsUnavailable => false,
            RealtimeError::InvalidEndpoint(_) => false,
            RealtimeError::Identity(_) => false,
            RealtimeError::HandlersAlreadyRegistered => false,
            RealtimeError::Protocol(_) => false,
            RealtimeError::Json(_) => false,
        }
    }
}

/// Result type for realtime client operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;
