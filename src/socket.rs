use crate::config::WebSocketConfig;
use crate::handler::{ConnectionState, LifecycleHandler, CLOSE_NORMAL};
use crate::manager::{ConnectionManager, Notification};
use crate::metrics::Metrics;
use crate::transport::{ConnectionId, Event, Payload, Transport};
use parking_lot::Mutex;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

/// A self-healing WebSocket connection.
///
/// Cheap to clone; all clones share the same connection slot. The connection
/// is not started until [`open`](WebSocket::open) is called. After an unclean
/// close it is re-established automatically according to the configured
/// [`AutoReconnect`](crate::AutoReconnect) policy, and kept alive with the
/// configured [`PingPong`](crate::PingPong) heartbeat.
///
/// # Example
///
/// ```ignore
/// use ws_lifecycle::{TungsteniteTransport, WebSocket, WebSocketConfig};
///
/// let config = WebSocketConfig::builder()
///     .service_name("prices")
///     .auto_reconnect(true)
///     .ping_pong(true)
///     .build()?;
///
/// let transport = TungsteniteTransport::new();
/// let ws = WebSocket::new("wss://example.com/feed", config, transport, MyHandler);
/// ws.open();
/// ```
#[derive(Clone)]
pub struct WebSocket {
    shared: Arc<Shared>,
}

struct Shared {
    service_name: String,
    manager: Mutex<ConnectionManager>,
    handler: Arc<dyn LifecycleHandler>,
    metrics: Arc<Metrics>,
    /// Runtime the socket was created on; connection tasks are spawned here
    runtime: Handle,
}

impl WebSocket {
    /// Create a connection in the CLOSED state.
    ///
    /// Must be called from within a Tokio runtime: the event driver task is
    /// spawned here and lives as long as any clone of the returned value.
    /// The other methods may be called from any thread.
    pub fn new<T, H>(
        url: impl Into<String>,
        config: WebSocketConfig,
        transport: T,
        handler: H,
    ) -> Self
    where
        T: Transport,
        H: LifecycleHandler,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(Metrics::new());
        let service_name = config.service_name.clone();

        let manager = ConnectionManager::new(
            url.into(),
            config,
            Box::new(transport),
            events_tx,
            metrics.clone(),
        );

        let shared = Arc::new(Shared {
            service_name,
            manager: Mutex::new(manager),
            handler: Arc::new(handler),
            metrics,
            runtime: Handle::current(),
        });

        shared
            .runtime
            .spawn(run_event_loop(Arc::downgrade(&shared), events_rx));

        Self { shared }
    }

    /// Close any existing connection and start a new attempt.
    ///
    /// Also the way to recover after [`LifecycleHandler::on_fail`].
    pub fn open(&self) {
        let _runtime = self.shared.runtime.enter();
        self.shared.manager.lock().open();
    }

    /// Close the connection with code 1000. Idempotent.
    ///
    /// Cancels any pending reconnect; the connection stays closed until
    /// [`open`](WebSocket::open) is called again.
    pub fn close(&self) {
        self.close_with(CLOSE_NORMAL, None);
    }

    /// Close the connection with a specific code and reason.
    pub fn close_with(&self, code: u16, reason: Option<&str>) {
        self.shared.manager.lock().close(code, reason);
    }

    /// Send a payload. Returns `false` (and sends nothing) unless the
    /// connection is open.
    pub fn send(&self, data: impl Into<Payload>) -> bool {
        self.shared.manager.lock().send(data.into())
    }

    /// Current connection state
    pub fn status(&self) -> ConnectionState {
        self.shared.manager.lock().state()
    }

    /// Check if the connection is currently open.
    pub fn is_open(&self) -> bool {
        self.status().is_open()
    }

    /// Subscribe to state changes
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.manager.lock().subscribe_state()
    }

    /// Id of the current transport handle, if any
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.shared.manager.lock().connection_id()
    }

    pub fn url(&self) -> String {
        self.shared.manager.lock().url().to_string()
    }

    /// Change the URL used by the next connection attempt.
    ///
    /// The current connection is left untouched; call
    /// [`open`](WebSocket::open) to switch immediately.
    pub fn set_url(&self, url: impl Into<String>) {
        self.shared.manager.lock().set_url(url.into());
    }

    /// Label used in log lines
    pub fn service_name(&self) -> &str {
        &self.shared.service_name
    }

    /// Reconnect attempts consumed since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.manager.lock().reconnect_attempts()
    }

    /// Whether an automatic reconnect is scheduled
    pub fn reconnect_pending(&self) -> bool {
        self.shared.manager.lock().is_reconnect_pending()
    }

    /// Get metrics for observability
    pub fn metrics(&self) -> Arc<Metrics> {
        self.shared.metrics.clone()
    }

    /// Invoke the handler hook for one notification, with panic protection.
    fn dispatch(&self, notification: Notification) {
        let hook = notification.hook_name();
        let handler = &self.shared.handler;

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| match notification {
            Notification::Open => handler.on_open(self),
            Notification::Message(payload) => handler.on_message(self, payload),
            Notification::Close(event) => handler.on_close(self, &event),
            Notification::Error(error) => handler.on_error(self, &error),
            Notification::Fail => handler.on_fail(self),
        }));

        if result.is_err() {
            error!(
                "[{}] Handler.{} panicked! Continuing.",
                self.shared.service_name, hook
            );
            self.shared.metrics.record_error();
        }
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("service_name", &self.shared.service_name)
            .field("status", &self.status())
            .finish()
    }
}

/// Feed events to the manager one at a time, then run the hooks they
/// produced with the manager unlocked.
///
/// Holds only a weak reference so the connection is torn down once the last
/// [`WebSocket`] clone is dropped.
async fn run_event_loop(shared: Weak<Shared>, mut events_rx: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events_rx.recv().await {
        let Some(inner) = shared.upgrade() else {
            break;
        };

        let notifications = inner.manager.lock().handle_event(event);
        if notifications.is_empty() {
            continue;
        }

        let ws = WebSocket { shared: inner };
        for notification in notifications {
            ws.dispatch(notification);
        }
    }
    debug!("WebSocket event loop stopped");
}
