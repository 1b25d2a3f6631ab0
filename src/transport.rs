//! The seam between the lifecycle manager and the socket implementation.
//!
//! A [`Transport`] opens connections; each connection is represented by a
//! [`TransportHandle`] owned by the manager and reports back through the
//! [`EventSender`] it was given. Events are queued, never delivered
//! synchronously, so a transport may emit from any task at any time.

use crate::error::Error;
use crate::handler::CloseEvent;
use std::fmt;
use tokio::sync::mpsc;

/// Identifies one transport handle. Every connection attempt gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    /// Numeric value of the id
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Application data carried over the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the text content, if this is a text payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(data)
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Payload::Binary(data.to_vec())
    }
}

/// Notification emitted by a transport for one of its handles
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection is established
    Open,
    /// A data frame arrived
    Message(Payload),
    /// The connection is gone. Must be the last event for a handle.
    Close(CloseEvent),
    /// A fault occurred. Typically followed by `Close`.
    Error(Error),
}

/// Everything the manager's event loop reacts to
#[derive(Debug)]
pub(crate) enum Event {
    Transport {
        id: ConnectionId,
        event: TransportEvent,
    },
    ReconnectDue {
        token: u64,
    },
    PingDue {
        token: u64,
    },
    PongOverdue {
        token: u64,
    },
}

/// Channel through which a transport reports events for a single handle.
///
/// Sends never block. Events sent after the manager has gone away are
/// silently dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    pub(crate) fn new(id: ConnectionId, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { id, tx }
    }

    /// Id of the handle these events belong to
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Report an arbitrary event
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(Event::Transport { id: self.id, event });
    }

    /// Report that the connection is open
    pub fn open(&self) {
        self.emit(TransportEvent::Open);
    }

    /// Report an incoming data frame
    pub fn message(&self, payload: impl Into<Payload>) {
        self.emit(TransportEvent::Message(payload.into()));
    }

    /// Report that the connection closed
    pub fn close(&self, event: CloseEvent) {
        self.emit(TransportEvent::Close(event));
    }

    /// Report a transport fault
    pub fn error(&self, error: Error) {
        self.emit(TransportEvent::Error(error));
    }

    /// Whether the manager is still listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Opens connections on behalf of the lifecycle manager.
///
/// `connect` must not block and must not report events synchronously in a
/// way that waits for the manager; it is called while the manager is locked.
pub trait Transport: Send + 'static {
    /// Start connecting to `url` and return a handle for the attempt.
    fn connect(&mut self, url: &str, events: EventSender) -> Box<dyn TransportHandle>;
}

/// One live connection attempt, exclusively owned by the manager.
///
/// Dropping the handle abandons the connection.
pub trait TransportHandle: Send + 'static {
    /// Queue a payload for transmission
    fn send(&mut self, payload: Payload);

    /// Request a close handshake with the given code and reason
    fn close(&mut self, code: u16, reason: Option<&str>);
}
