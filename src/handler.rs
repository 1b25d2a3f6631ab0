use crate::error::Error;
use crate::socket::WebSocket;
use crate::transport::Payload;
use std::fmt;

/// Close code for a normal, intentional closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the peer sent a close frame without a status
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code reported when the connection dropped without a close handshake
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code sent when the heartbeat deadline expires
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;

/// Observable state of the connection slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection; initial state and the state after any close
    #[default]
    Closed,
    /// An attempt is in flight
    Connecting,
    /// Connected and able to send
    Open,
}

impl ConnectionState {
    /// Check if the connection is currently open.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of a connection closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close status code
    pub code: u16,
    /// Close reason, empty if none was given
    pub reason: String,
    /// Whether both peers completed the closing handshake
    pub was_clean: bool,
}

impl CloseEvent {
    /// A closure acknowledged by both peers
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// An abrupt termination (code 1006)
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

/// Trait that users implement to observe the connection lifecycle.
///
/// All methods default to no-ops. Hooks run on the event driver task after
/// the manager has finished the transition, so they may freely call back into
/// the [`WebSocket`] (e.g. send a subscription from `on_open`, or reopen from
/// `on_fail`). A panicking hook is logged and otherwise ignored.
///
/// # Example
///
/// ```ignore
/// use ws_lifecycle::{LifecycleHandler, Payload, WebSocket};
///
/// struct Prices;
///
/// impl LifecycleHandler for Prices {
///     fn on_open(&self, ws: &WebSocket) {
///         ws.send(r#"{"type":"subscribe","channel":"prices"}"#);
///     }
///
///     fn on_message(&self, _ws: &WebSocket, payload: Payload) {
///         println!("{:?}", payload);
///     }
/// }
/// ```
pub trait LifecycleHandler: Send + Sync + 'static {
    /// Called when the connection opens.
    fn on_open(&self, _ws: &WebSocket) {}

    /// Called for every application message (heartbeat replies excluded).
    fn on_message(&self, _ws: &WebSocket, _payload: Payload) {}

    /// Called when the connection closes, before any reconnection is scheduled.
    fn on_close(&self, _ws: &WebSocket, _event: &CloseEvent) {}

    /// Called when the transport reports a fault. The connection state is not
    /// changed by the error itself.
    fn on_error(&self, _ws: &WebSocket, _error: &Error) {}

    /// Called once the reconnection budget is exhausted. No further attempts
    /// are made until [`WebSocket::open`] is called again.
    fn on_fail(&self, _ws: &WebSocket) {}
}

impl LifecycleHandler for () {}
