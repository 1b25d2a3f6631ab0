use crate::error::Error;
use crate::handler::{CloseEvent, CLOSE_NORMAL, CLOSE_NO_STATUS};
use crate::transport::{EventSender, Payload, Transport, TransportHandle};
use futures_util::{SinkExt, StreamExt};
use http::{HeaderName, HeaderValue};
use std::net::SocketAddr;
use tokio::net::TcpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{
    client_async_tls_with_config, tungstenite::client::IntoClientRequest, tungstenite::Message,
    Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};
use url::Url;

/// How long to wait for the peer to answer our close frame
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands that can be sent to a connection
#[derive(Debug)]
pub enum ConnectionCommand {
    /// Send a message
    Send(Message),
    /// Start the closing handshake
    Close(Option<CloseFrame<'static>>),
}

/// [`Transport`] over `tokio-tungstenite`.
///
/// Every `connect` spawns a task that resolves the host, opens a TCP socket
/// with `TCP_NODELAY` and keepalive, negotiates TLS for `wss://` URLs and
/// performs the WebSocket handshake. Protocol-level ping/pong frames are
/// answered by tungstenite and never reported.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to every handshake request (e.g. authentication)
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl Transport for TungsteniteTransport {
    fn connect(&mut self, url: &str, events: EventSender) -> Box<dyn TransportHandle> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let connection = Connection {
            url: url.to_string(),
            headers: self.headers.clone(),
            events,
            command_rx,
        };
        tokio::spawn(connection.run());

        Box::new(TungsteniteHandle { command_tx })
    }
}

/// Handle to one spawned connection task.
///
/// Dropping it closes the connection with code 1000.
#[derive(Debug)]
pub struct TungsteniteHandle {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl TransportHandle for TungsteniteHandle {
    fn send(&mut self, payload: Payload) {
        let message = match payload {
            Payload::Text(text) => Message::Text(text),
            Payload::Binary(data) => Message::Binary(data),
        };
        let _ = self.command_tx.send(ConnectionCommand::Send(message));
    }

    fn close(&mut self, code: u16, reason: Option<&str>) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.unwrap_or_default().to_string().into(),
        };
        let _ = self.command_tx.send(ConnectionCommand::Close(Some(frame)));
    }
}

/// State owned by a spawned connection task
struct Connection {
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    events: EventSender,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
}

impl Connection {
    async fn run(mut self) {
        let id = self.events.connection_id().get();
        debug!(
            "[CONN-{}] Connecting to {} (headers={})",
            id,
            self.url,
            self.headers.len()
        );

        let url = self.url.clone();
        let headers = std::mem::take(&mut self.headers);
        let mut connect = Box::pin(async move { connect_with_options(&url, headers).await });

        let ws_stream = loop {
            tokio::select! {
                result = &mut connect => match result {
                    Ok(stream) => break stream,
                    Err(e) => {
                        warn!("[CONN-{}] Connection failed: {}", id, e);
                        self.fail(e);
                        return;
                    }
                },

                cmd = self.command_rx.recv() => match cmd {
                    Some(ConnectionCommand::Send(_)) => {
                        trace!("[CONN-{}] Dropping message sent before open", id);
                    }
                    Some(ConnectionCommand::Close(_)) | None => {
                        debug!("[CONN-{}] Closed before the handshake completed", id);
                        self.events.close(CloseEvent::abnormal("closed before open"));
                        return;
                    }
                },
            }
        };

        info!("[CONN-{}] Connected to {}", id, self.url);
        self.events.open();

        self.run_open(ws_stream).await;
    }

    async fn run_open(&mut self, ws_stream: WsStream) {
        let id = self.events.connection_id().get();
        let (mut write, mut read) = ws_stream.split();

        // Close frame received from the peer
        let mut peer_close: Option<CloseEvent> = None;
        // Set once we have sent our own close frame
        let mut close_deadline: Option<Instant> = None;
        let mut commands_open = true;
        let handshake_deadline = || Instant::now() + CLOSE_HANDSHAKE_TIMEOUT;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.events.message(Payload::Text(text)),
                        Some(Ok(Message::Binary(data))) => {
                            self.events.message(Payload::Binary(data))
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            trace!("[CONN-{}] Protocol ping/pong", id);
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("[CONN-{}] Received close frame: {:?}", id, frame);
                            peer_close = Some(match frame {
                                Some(frame) => CloseEvent::clean(
                                    u16::from(frame.code),
                                    frame.reason.to_string(),
                                ),
                                None => CloseEvent::clean(CLOSE_NO_STATUS, ""),
                            });
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            match peer_close.take() {
                                Some(event) => self.events.close(event),
                                None => {
                                    warn!("[CONN-{}] WebSocket error: {}", id, e);
                                    self.fail(Error::WebSocket(e));
                                }
                            }
                            return;
                        }
                        None => {
                            debug!("[CONN-{}] WebSocket stream ended", id);
                            self.events.close(
                                peer_close
                                    .take()
                                    .unwrap_or_else(|| CloseEvent::abnormal("stream ended")),
                            );
                            return;
                        }
                    }
                }

                cmd = self.command_rx.recv(), if commands_open => {
                    match cmd {
                        Some(ConnectionCommand::Send(message)) => {
                            if let Err(e) = write.send(message).await {
                                warn!("[CONN-{}] Failed to send message: {}", id, e);
                                self.fail(Error::WebSocket(e));
                                return;
                            }
                        }
                        Some(ConnectionCommand::Close(frame)) => {
                            debug!("[CONN-{}] Sending close frame: {:?}", id, frame);
                            let _ = write.send(Message::Close(frame)).await;
                            close_deadline.get_or_insert_with(handshake_deadline);
                        }
                        None => {
                            debug!("[CONN-{}] Handle dropped, closing", id);
                            commands_open = false;
                            let frame = CloseFrame {
                                code: CloseCode::from(CLOSE_NORMAL),
                                reason: "".into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            close_deadline.get_or_insert_with(handshake_deadline);
                        }
                    }
                }

                _ = sleep_until(close_deadline.unwrap_or_else(Instant::now)),
                    if close_deadline.is_some() =>
                {
                    warn!("[CONN-{}] Peer did not complete the close handshake", id);
                    self.events.close(CloseEvent::abnormal("close handshake timed out"));
                    return;
                }
            }
        }
    }

    /// Report a fault followed by an abnormal close
    fn fail(&self, error: Error) {
        let reason = error.to_string();
        self.events.error(error);
        self.events.close(CloseEvent::abnormal(reason));
    }
}

/// Type alias for WebSocket stream
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect to WebSocket with custom headers.
///
/// # Arguments
/// * `url` - WebSocket URL (wss:// or ws://)
/// * `headers` - Additional headers to include in the connection request (e.g., auth)
async fn connect_with_options(
    url: &str,
    headers: Vec<(HeaderName, HeaderValue)>,
) -> Result<WsStream, Error> {
    // Parse URL
    let parsed_url =
        Url::parse(url).map_err(|e| Error::connection_failed(url, format!("Invalid URL: {}", e)))?;

    let is_tls = match parsed_url.scheme() {
        "wss" => true,
        "ws" => false,
        other => {
            return Err(Error::connection_failed(
                url,
                format!("Unsupported scheme '{}'", other),
            ))
        }
    };

    let host = parsed_url
        .host_str()
        .ok_or_else(|| Error::connection_failed(url, "No host in URL"))?;
    let port = parsed_url.port().unwrap_or(if is_tls { 443 } else { 80 });

    // Build the WebSocket request
    let mut request = url
        .into_client_request()
        .map_err(|e| Error::connection_failed(url, format!("Invalid WebSocket request: {}", e)))?;

    for (name, value) in headers {
        request.headers_mut().insert(name, value);
    }

    let tcp_stream = connect_direct(url, host, port).await?;

    // Set TCP options for low latency
    set_tcp_options(&tcp_stream);

    // TLS connector (if needed)
    let connector = if is_tls {
        let tls = native_tls::TlsConnector::new()
            .map_err(|e| Error::connection_failed(url, format!("TLS error: {}", e)))?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    // WebSocket handshake
    let (ws_stream, _response) = client_async_tls_with_config(request, tcp_stream, None, connector)
        .await
        .map_err(Error::WebSocket)?;

    Ok(ws_stream)
}

/// Resolve `host` and open a TCP connection to the first address
async fn connect_direct(url: &str, host: &str, port: u16) -> Result<tokio::net::TcpStream, Error> {
    // IPv6 literals come back from the URL parser in brackets
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let dest_addr: SocketAddr = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::connection_failed(url, format!("DNS lookup failed: {}", e)))?
        .next()
        .ok_or_else(|| Error::connection_failed(url, format!("No addresses found for {}", host)))?;

    let socket = if dest_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| Error::connection_failed(url, format!("Failed to create socket: {}", e)))?;

    socket.connect(dest_addr).await.map_err(|e| {
        Error::connection_failed(url, format!("TCP connect to {} failed: {}", dest_addr, e))
    })
}

/// Set TCP options for low latency
fn set_tcp_options(stream: &tokio::net::TcpStream) {
    let sock2 = socket2::SockRef::from(stream);

    // Enable TCP_NODELAY (disable Nagle's algorithm)
    let _ = sock2.set_nodelay(true);

    // Set keepalive to detect dead connections
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    let _ = sock2.set_tcp_keepalive(&keepalive);
}
