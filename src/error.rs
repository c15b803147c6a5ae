//! Client error types.
//!
//! [`RealtimeError`] is the central error type of the crate. Variants fall
//! into four categories, and only the transport category is retried
//! automatically by the connection manager:
//!
//! | Category  | Variants                                         | Recovery                      |
//! |-----------|--------------------------------------------------|-------------------------------|
//! | Transport | `Transport`, `WebSocket`, `Http`                 | bounded reconnect with backoff |
//! | Protocol  | `Rejected`, `MalformedFrame`                     | surfaced to the caller once   |
//! | Payload   | `Serialization`                                  | logged and dropped            |
//! | Terminal  | `ReconnectExhausted`, `Disconnected`, `Config`   | caller decides                |

/// Errors produced by the real-time client.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// The transport could not be opened or failed while in use.
    #[error("transport error: {0}")]
    Transport(String),

    /// WebSocket handshake or I/O failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP failure on the polling fallback.
    #[cfg(feature = "polling")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered the handshake with an ERROR frame.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// A frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Automatic reconnection gave up.
    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    /// The client was disconnected before the operation completed.
    #[error("client disconnected")]
    Disconnected,
}

impl RealtimeError {
    /// Returns `true` for transport-level failures, which the connection
    /// manager answers with a scheduled reconnect.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::WebSocket(_) => true,
            #[cfg(feature = "polling")]
            Self::Http(_) => true,
            _ => false,
        }
    }

    /// Shorthand for a [`RealtimeError::MalformedFrame`].
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_recoverable() {
        assert!(RealtimeError::Transport("reset".into()).is_recoverable());
        assert!(!RealtimeError::Rejected("bad token".into()).is_recoverable());
        assert!(!RealtimeError::Disconnected.is_recoverable());
        assert!(!RealtimeError::ReconnectExhausted(5).is_recoverable());
    }

    #[test]
    fn rejected_message_is_verbatim() {
        let err = RealtimeError::Rejected("Invalid JWT".into());
        assert_eq!(err.to_string(), "connection rejected: Invalid JWT");
    }
}
