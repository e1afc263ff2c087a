use std::time::Duration;
use thiserror::Error;

/// Top-level error type for wagate.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No durable session record exists for the session id.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The underlying client rejected its initialize call.
    #[error("client initialization failed: {0}")]
    InitializationFailed(String),

    /// The underlying client reported an authentication failure.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The client did not become ready within the wait budget.
    #[error("initialization timeout after {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The client disconnected while a caller was waiting on it.
    #[error("client disconnected: {0}")]
    Disconnected(String),

    /// The underlying send was rejected.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The persistence layer could not be reached.
    #[error("data store unavailable: {0}")]
    DataStoreUnavailable(String),

    /// The media endpoint was called without an attachment.
    #[error("no image file provided")]
    NoFileProvided,

    /// Malformed or incomplete request input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Chat protocol error outside a send (pairing, QR rendering).
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether the error came out of the readiness wait rather than the send itself.
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            Self::InitializationFailed(_)
                | Self::AuthFailed(_)
                | Self::TimedOut(_)
                | Self::Disconnected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_in_seconds() {
        let err = GatewayError::TimedOut(Duration::from_secs(10));
        assert_eq!(err.to_string(), "initialization timeout after 10s");
    }

    #[test]
    fn test_is_initialization() {
        assert!(GatewayError::AuthFailed("bad".into()).is_initialization());
        assert!(GatewayError::TimedOut(Duration::from_secs(1)).is_initialization());
        assert!(!GatewayError::SendFailed("x".into()).is_initialization());
        assert!(!GatewayError::NotFound("s1".into()).is_initialization());
    }
}
