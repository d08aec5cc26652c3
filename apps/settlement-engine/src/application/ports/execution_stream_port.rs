//! Execution Stream Port (Driven Port)
//!
//! A push channel of order updates for one exchange account.

use async_trait::async_trait;

use crate::domain::execution::{ExecutionReport, StatusReport};

/// Parsed stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fill.
    Execution(ExecutionReport),
    /// A status change without a fill (accepted, canceled, expired, rejected).
    Status(StatusReport),
    /// Frame of no interest (balance snapshots, pings).
    Ignored,
}

/// Stream error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// Could not establish a session.
    #[error("Stream connect failed: {message}")]
    Connect {
        /// Error details.
        message: String,
    },

    /// Established session failed.
    #[error("Stream transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// A frame could not be parsed.
    #[error("Stream frame decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// Session could not be released cleanly.
    #[error("Stream close error: {message}")]
    Close {
        /// Error details.
        message: String,
    },
}

impl StreamError {
    /// Stable code recorded in connector health.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "STREAM_CONNECT",
            Self::Transport { .. } => "STREAM_TRANSPORT",
            Self::Decode { .. } => "STREAM_DECODE",
            Self::Close { .. } => "STREAM_CLOSE",
        }
    }

    /// Whether the session is still usable after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// One live stream session.
#[async_trait]
pub trait StreamSession: Send {
    /// Next event; `None` once the server closed the session.
    async fn next_event(&mut self) -> Option<Result<StreamEvent, StreamError>>;

    /// Close the connection and release server-side resources.
    async fn close(self) -> Result<(), StreamError>;
}

/// Port that opens stream sessions.
#[async_trait]
pub trait ExecutionStreamPort: Send + Sync {
    /// Session type.
    type Session: StreamSession;

    /// Open a new session.
    async fn open(&self) -> Result<Self::Session, StreamError>;
}
