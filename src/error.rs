use thiserror::Error;

/// Categorizes errors for handler decision-making.
///
/// This is a lightweight, cloneable representation of the error type
/// that handlers can match on without inspecting the underlying source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// WebSocket protocol error
    WebSocket,
    /// Connection could not be established (bad URL, DNS, TCP, TLS)
    ConnectionFailed,
    /// No pong arrived within the configured deadline
    HeartbeatTimeout,
    /// Transport-specific error
    Transport,
}

/// Errors reported by the transport to [`LifecycleHandler::on_error`].
///
/// None of these are fatal to the lifecycle manager: they are surfaced to
/// the handler and the connection is recovered (or not) based on the close
/// notification that follows.
///
/// [`LifecycleHandler::on_error`]: crate::LifecycleHandler::on_error
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection could not be established
    #[error("Connection to {url} failed: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Heartbeat pong was not received in time
    #[error("Heartbeat timeout: no pong within {timeout_ms}ms")]
    HeartbeatTimeout { timeout_ms: u64 },

    /// Error raised by a custom transport
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WebSocket(_) => ErrorKind::WebSocket,
            Error::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            Error::HeartbeatTimeout { .. } => ErrorKind::HeartbeatTimeout,
            Error::Transport(_) => ErrorKind::Transport,
        }
    }

    pub(crate) fn connection_failed(url: &str, reason: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
