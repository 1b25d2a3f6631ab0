//! In-memory transport and recording handler shared by the unit tests.

use crate::error::{Error, ErrorKind};
use crate::handler::{CloseEvent, LifecycleHandler};
use crate::socket::WebSocket;
use crate::transport::{EventSender, Payload, Transport, TransportHandle};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct MockConnection {
    url: String,
    events: EventSender,
    sent: Vec<Payload>,
    close_request: Option<(u16, Option<String>)>,
    dropped: bool,
}

/// Transport that never touches the network.
///
/// Every `connect` is recorded; tests drive the resulting handle by emitting
/// events through [`MockTransport::events`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    connections: Arc<Mutex<Vec<MockConnection>>>,
}

impl MockTransport {
    /// Number of connection attempts so far
    pub fn connections(&self) -> usize {
        self.connections.lock().len()
    }

    /// Index of the most recent attempt
    pub fn latest(&self) -> usize {
        self.connections().saturating_sub(1)
    }

    pub fn events(&self, index: usize) -> EventSender {
        self.connections.lock()[index].events.clone()
    }

    pub fn url(&self, index: usize) -> String {
        self.connections.lock()[index].url.clone()
    }

    pub fn sent(&self, index: usize) -> Vec<Payload> {
        self.connections.lock()[index].sent.clone()
    }

    pub fn close_request(&self, index: usize) -> Option<(u16, Option<String>)> {
        self.connections.lock()[index].close_request.clone()
    }

    pub fn is_dropped(&self, index: usize) -> bool {
        self.connections.lock()[index].dropped
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, url: &str, events: EventSender) -> Box<dyn TransportHandle> {
        let mut connections = self.connections.lock();
        connections.push(MockConnection {
            url: url.to_string(),
            events,
            sent: Vec::new(),
            close_request: None,
            dropped: false,
        });
        Box::new(MockHandle {
            index: connections.len() - 1,
            connections: self.connections.clone(),
        })
    }
}

struct MockHandle {
    index: usize,
    connections: Arc<Mutex<Vec<MockConnection>>>,
}

impl TransportHandle for MockHandle {
    fn send(&mut self, payload: Payload) {
        self.connections.lock()[self.index].sent.push(payload);
    }

    fn close(&mut self, code: u16, reason: Option<&str>) {
        let request = Some((code, reason.map(str::to_string)));
        self.connections.lock()[self.index].close_request = request;
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.connections.lock()[self.index].dropped = true;
    }
}

/// One recorded handler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Hook {
    Open,
    Message(Payload),
    Close(CloseEvent),
    Error(ErrorKind),
    Fail,
}

/// Handler that records every hook in order
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    hooks: Arc<Mutex<Vec<Hook>>>,
}

impl Recorder {
    pub fn hooks(&self) -> Vec<Hook> {
        self.hooks.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Hook) -> bool) -> usize {
        self.hooks.lock().iter().filter(|hook| matches(hook)).count()
    }

    pub fn clear(&self) {
        self.hooks.lock().clear();
    }

    fn push(&self, hook: Hook) {
        self.hooks.lock().push(hook);
    }
}

impl LifecycleHandler for Recorder {
    fn on_open(&self, _ws: &WebSocket) {
        self.push(Hook::Open);
    }

    fn on_message(&self, _ws: &WebSocket, payload: Payload) {
        self.push(Hook::Message(payload));
    }

    fn on_close(&self, _ws: &WebSocket, event: &CloseEvent) {
        self.push(Hook::Close(event.clone()));
    }

    fn on_error(&self, _ws: &WebSocket, error: &Error) {
        self.push(Hook::Error(error.kind()));
    }

    fn on_fail(&self, _ws: &WebSocket) {
        self.push(Hook::Fail);
    }
}

/// Let spawned tasks (driver, timers) run without advancing paused time.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
