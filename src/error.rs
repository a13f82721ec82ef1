//! Error types for the signaling router
//!
//! Defines connection-level errors, transport errors and the errors
//! that flow through the dispatch loop.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Connection-level errors
///
/// Any of these terminates the connection they occurred on.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The upgrade request did not carry a usable identity
    #[error("Handshake rejected: {0}")]
    Handshake(String),
}

/// Errors reported by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was already closed (send after close)
    #[error("Transport closed")]
    Closed,

    /// The underlying WebSocket failed
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Errors raised by handlers and carried through the dispatch loop
///
/// A handler returning `Err` and a handler panicking are treated the same:
/// both put the dispatch pass into the error state.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Plain error message
    #[error("{0}")]
    Message(String),

    /// The handler rejected the request with an explicit status
    #[error("{reason}")]
    Rejected { status: u16, reason: String },

    /// The handler panicked
    #[error("Handler panicked: {0}")]
    Panic(String),

    /// JSON error inside a handler
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other error source
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl RouteError {
    /// Create an error from a message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Create an error that replies with the given status
    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            reason: reason.into(),
        }
    }

    /// Wrap an arbitrary error
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(error))
    }

    /// Response status used when this error reaches the final handler
    pub fn status(&self) -> u16 {
        match self {
            Self::Rejected { status, .. } => *status,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_display() {
        let err = RouteError::msg("BUMP");
        assert_eq!(err.to_string(), "BUMP");
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn test_rejected_status() {
        let err = RouteError::rejected(403, "Forbidden");
        assert_eq!(err.status(), 403);
        assert_eq!(err.to_string(), "Forbidden");
    }

    #[test]
    fn test_other_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = RouteError::other(io);
        assert_eq!(err.to_string(), "disk gone");
    }
}
