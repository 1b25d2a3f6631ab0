//! # ws-lifecycle
//!
//! Lifecycle management for a single WebSocket connection: open, observe,
//! recover after unexpected loss, and keep alive across idle periods.
//!
//! ## Features
//!
//! - **Auto-reconnection** with exponential backoff, reset jitter and an attempt budget
//! - **Keepalive** via application-level ping/pong sentinels, with an optional pong deadline
//! - **Reentrant hooks** - handlers may send, close or reopen from any callback
//! - **Pluggable transport** with a `tokio-tungstenite` implementation included
//! - **Metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use ws_lifecycle::{LifecycleHandler, Payload, TungsteniteTransport, WebSocket, WebSocketConfig};
//!
//! struct MyHandler;
//!
//! impl LifecycleHandler for MyHandler {
//!     fn on_message(&self, _ws: &WebSocket, payload: Payload) {
//!         println!("{:?}", payload);
//!     }
//! }
//!
//! let config = WebSocketConfig::builder()
//!     .auto_reconnect(true)
//!     .ping_pong(true)
//!     .build()?;
//!
//! let transport = TungsteniteTransport::new();
//! let ws = WebSocket::new("wss://example.com/feed", config, transport, MyHandler);
//! ws.open();
//! ```

mod config;
mod connection;
mod error;
mod handler;
mod keepalive;
mod manager;
mod metrics;
mod reconnect;
mod socket;
#[cfg(test)]
mod testing;
mod timer;
mod transport;

pub use config::{
    AutoReconnect, ConfigError, KeepaliveConfig, PingPong, ReconnectConfig, WebSocketConfig,
    WebSocketConfigBuilder,
};
pub use connection::{TungsteniteHandle, TungsteniteTransport};
pub use error::{Error, ErrorKind};
pub use handler::{
    CloseEvent, ConnectionState, LifecycleHandler, CLOSE_ABNORMAL, CLOSE_HEARTBEAT_TIMEOUT,
    CLOSE_NORMAL, CLOSE_NO_STATUS,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use socket::WebSocket;
pub use transport::{ConnectionId, EventSender, Payload, Transport, TransportEvent, TransportHandle};

// Re-export http types for TungsteniteTransport::with_header
pub use http::{HeaderName, HeaderValue};

/// Result type for ws-lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;
