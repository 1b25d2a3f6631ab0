//! Example: a self-healing connection to an echo server
//!
//! Sends a greeting on every (re)connect and prints everything that comes
//! back. The echo server reflects the heartbeat, so ping and pong share one
//! sentinel.
//!
//! Run with: cargo run --example echo -- [url]

use tokio::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ws_lifecycle::{
    AutoReconnect, CloseEvent, Error, LifecycleHandler, Payload, TungsteniteTransport, WebSocket,
    WebSocketConfig,
};

/// Longest text echoed to the log, in characters
const PREVIEW_CHARS: usize = 100;

fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

struct EchoHandler;

impl LifecycleHandler for EchoHandler {
    fn on_open(&self, ws: &WebSocket) {
        info!("[{}] Connected, sending greeting", ws.service_name());
        ws.send("hello from ws-lifecycle");
    }

    fn on_message(&self, ws: &WebSocket, payload: Payload) {
        match payload {
            Payload::Text(text) => {
                info!("[{}] Received: {}", ws.service_name(), preview(&text))
            }
            Payload::Binary(data) => {
                info!("[{}] Received binary: {} bytes", ws.service_name(), data.len())
            }
        }
    }

    fn on_close(&self, ws: &WebSocket, event: &CloseEvent) {
        info!(
            "[{}] Closed (code {}, clean: {})",
            ws.service_name(),
            event.code,
            event.was_clean
        );
    }

    fn on_error(&self, ws: &WebSocket, error: &Error) {
        warn!("[{}] Error: {}", ws.service_name(), error);
    }

    fn on_fail(&self, ws: &WebSocket) {
        warn!("[{}] Giving up after {} attempts", ws.service_name(), ws.reconnect_attempts());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://echo.websocket.org".to_string());

    let config = WebSocketConfig::builder()
        .service_name("echo")
        .auto_reconnect(AutoReconnect::Custom {
            interval: Some(Duration::from_secs(1)),
            max_attempts: Some(5),
        })
        .ping_pong(Duration::from_secs(10))
        .heartbeat_messages("heartbeat", "heartbeat")
        .pong_timeout(Duration::from_secs(5))
        .build()?;

    let ws = WebSocket::new(url, config, TungsteniteTransport::new(), EchoHandler);
    let mut status = ws.status_receiver();
    ws.open();

    info!("Running... Press Ctrl+C to stop");
    let run = async {
        while status.changed().await.is_ok() {
            info!("[{}] Status: {}", ws.service_name(), *status.borrow_and_update());
        }
    };
    tokio::select! {
        _ = run => {}
        _ = tokio::time::sleep(Duration::from_secs(60)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    let snapshot = ws.metrics().snapshot();
    info!("Final metrics:");
    info!("  Connections: {}", snapshot.connections_total);
    info!("  Reconnections: {}", snapshot.reconnections_total);
    info!("  Messages received: {}", snapshot.messages_received_total);
    info!("  Pings sent: {}", snapshot.pings_sent_total);

    ws.close();
    info!("Connection closed");

    Ok(())
}
