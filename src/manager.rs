use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::handler::{CloseEvent, ConnectionState, CLOSE_HEARTBEAT_TIMEOUT, CLOSE_NORMAL};
use crate::keepalive::{KeepaliveAction, KeepaliveMonitor};
use crate::metrics::Metrics;
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::transport::{
    ConnectionId, Event, EventSender, Payload, Transport, TransportEvent, TransportHandle,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

/// A handler invocation produced by a transition.
///
/// Collected while the manager is locked and dispatched after the lock is
/// released, so handlers can call back into the manager.
#[derive(Debug)]
pub(crate) enum Notification {
    Open,
    Message(Payload),
    Close(CloseEvent),
    Error(Error),
    Fail,
}

impl Notification {
    /// Handler method name, for diagnostics
    pub fn hook_name(&self) -> &'static str {
        match self {
            Notification::Open => "on_open",
            Notification::Message(_) => "on_message",
            Notification::Close(_) => "on_close",
            Notification::Error(_) => "on_error",
            Notification::Fail => "on_fail",
        }
    }
}

/// Sole owner of the transport handle.
///
/// Every transport notification and timer expiry arrives as an [`Event`] and
/// is applied by [`ConnectionManager::handle_event`] one at a time. Events
/// tagged with a connection id other than the current one are stale and
/// dropped, which keeps a discarded handle from touching the state of its
/// replacement.
pub(crate) struct ConnectionManager {
    service_name: String,
    url: String,
    transport: Box<dyn Transport>,
    handle: Option<Box<dyn TransportHandle>>,
    current: Option<ConnectionId>,
    /// Handles retired by an explicit close whose close notification is still
    /// forwarded to the handler
    retiring: Vec<ConnectionId>,
    next_id: u64,
    state_tx: watch::Sender<ConnectionState>,
    policy: ReconnectPolicy,
    keepalive: KeepaliveMonitor,
    events_tx: mpsc::UnboundedSender<Event>,
    metrics: Arc<Metrics>,
}

impl ConnectionManager {
    pub fn new(
        url: String,
        config: WebSocketConfig,
        transport: Box<dyn Transport>,
        events_tx: mpsc::UnboundedSender<Event>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        Self {
            service_name: config.service_name,
            url,
            transport,
            handle: None,
            current: None,
            retiring: Vec::new(),
            next_id: 0,
            state_tx,
            policy: ReconnectPolicy::new(config.reconnect),
            keepalive: KeepaliveMonitor::new(config.keepalive),
            events_tx,
            metrics,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Change the target URL. Takes effect on the next attempt.
    pub fn set_url(&mut self, url: String) {
        self.url = url;
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.policy.attempts_used()
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.policy.is_pending()
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            trace!("[{}] {} -> {}", self.service_name, previous, state);
        }
    }

    /// Tear down any existing connection and start a new attempt.
    pub fn open(&mut self) {
        self.close(CLOSE_NORMAL, None);
        self.initiate();
    }

    /// Create a fresh handle and move to CONNECTING.
    fn initiate(&mut self) {
        // A handle left behind by an unclean close is discarded, never reused
        self.handle = None;

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let events = EventSender::new(id, self.events_tx.clone());

        debug!("[{}] Connecting to {} ({})", self.service_name, self.url, id);
        let handle = self.transport.connect(&self.url, events);

        self.handle = Some(handle);
        self.current = Some(id);
        self.set_state(ConnectionState::Connecting);
    }

    /// Intentional teardown. Idempotent.
    ///
    /// Cancels the keepalive timer and any pending reconnect, and resets the
    /// backoff as if a session had ended normally.
    pub fn close(&mut self, code: u16, reason: Option<&str>) {
        self.keepalive.stop();
        if self.policy.cancel() {
            debug!("[{}] Cancelled pending reconnect", self.service_name);
        }
        self.policy.reset();

        if let Some(mut handle) = self.handle.take() {
            info!(
                "[{}] Closing connection (code {}, reason {:?})",
                self.service_name, code, reason
            );
            handle.close(code, reason);
            self.retiring.extend(self.current);
        }

        self.current = None;
        self.set_state(ConnectionState::Closed);
    }

    /// Forward a payload if the connection is open.
    pub fn send(&mut self, payload: Payload) -> bool {
        if !self.state().is_open() {
            debug!(
                "[{}] Send rejected: connection is {}",
                self.service_name,
                self.state()
            );
            self.metrics.record_send_rejected();
            return false;
        }

        match self.handle.as_mut() {
            Some(handle) => {
                handle.send(payload);
                self.metrics.record_message_sent();
                true
            }
            None => {
                self.metrics.record_send_rejected();
                false
            }
        }
    }

    /// Apply one event and return the handler calls it produced.
    pub fn handle_event(&mut self, event: Event) -> Vec<Notification> {
        match event {
            Event::Transport { id, event } => self.on_transport_event(id, event),
            Event::ReconnectDue { token } => {
                if self.policy.fire(token) {
                    info!(
                        "[{}] Reconnecting (attempt {}/{})",
                        self.service_name,
                        self.policy.attempts_used(),
                        self.policy.max_attempts()
                    );
                    self.metrics.record_reconnect_attempt();
                    self.initiate();
                }
                Vec::new()
            }
            Event::PingDue { token } => {
                self.on_ping_due(token);
                Vec::new()
            }
            Event::PongOverdue { token } => self.on_pong_overdue(token),
        }
    }

    fn on_transport_event(
        &mut self,
        id: ConnectionId,
        event: TransportEvent,
    ) -> Vec<Notification> {
        if self.current != Some(id) {
            if self.retiring.contains(&id) {
                if let TransportEvent::Close(close) = event {
                    self.retiring.retain(|retired| *retired != id);
                    debug!(
                        "[{}] Retired connection {} closed (code {})",
                        self.service_name, id, close.code
                    );
                    return vec![Notification::Close(close)];
                }
            }
            trace!("[{}] Ignoring event from stale connection {}", self.service_name, id);
            return Vec::new();
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(payload) => self.on_message(payload),
            TransportEvent::Close(close) => self.on_close(close),
            TransportEvent::Error(e) => {
                self.metrics.record_error();
                error!("[{}] WS error has occurred: {}", self.service_name, e);
                vec![Notification::Error(e)]
            }
        }
    }

    fn on_open(&mut self) -> Vec<Notification> {
        let is_reconnect = self.policy.attempts_used() > 0;

        self.set_state(ConnectionState::Open);
        self.policy.reset();
        self.metrics.record_connection(is_reconnect);
        self.keepalive.start(&self.events_tx);

        info!("[{}] WS Connected to {}", self.service_name, self.url);
        vec![Notification::Open]
    }

    fn on_message(&mut self, payload: Payload) -> Vec<Notification> {
        if self.keepalive.is_pong(&payload) {
            self.metrics.record_pong();
            self.keepalive.on_pong(&self.events_tx);
            trace!(
                "[{}] Received pong, next ping in {:?}",
                self.service_name,
                self.keepalive.time_until_next()
            );
            return Vec::new();
        }

        self.metrics.record_message_received();
        vec![Notification::Message(payload)]
    }

    fn on_close(&mut self, close: CloseEvent) -> Vec<Notification> {
        self.set_state(ConnectionState::Closed);
        self.handle = None;
        self.current = None;
        self.keepalive.stop();
        self.metrics.record_disconnect();

        if close.was_clean {
            info!("[{}] WS Closed (code {})", self.service_name, close.code);
            return vec![Notification::Close(close)];
        }

        warn!(
            "[{}] Connection lost (code {}, reason {:?})",
            self.service_name, close.code, close.reason
        );
        let mut notifications = vec![Notification::Close(close)];

        match self.policy.attempt_step(&self.events_tx) {
            ReconnectDecision::Disabled => {}
            ReconnectDecision::Scheduled { attempt, delay } => {
                debug!(
                    "[{}] Reconnecting in {:?} (attempt {}/{})",
                    self.service_name,
                    delay,
                    attempt,
                    self.policy.max_attempts()
                );
            }
            ReconnectDecision::Exhausted { attempts } => {
                error!(
                    "[{}] Max reconnection attempts ({}) reached",
                    self.service_name, attempts
                );
                self.metrics.record_reconnect_failure();
                notifications.push(Notification::Fail);
            }
        }

        notifications
    }

    fn on_ping_due(&mut self, token: u64) {
        let action = self.keepalive.on_ping_due(token, &self.events_tx);
        let KeepaliveAction::SendPing(ping) = action else {
            return;
        };

        let is_open = self.state().is_open();
        match self.handle.as_mut() {
            Some(handle) if is_open => {
                handle.send(ping);
                self.metrics.record_ping();
                debug!("[{}] Sent ping", self.service_name);
            }
            _ => {
                trace!("[{}] Skipping ping, connection not open", self.service_name);
                self.keepalive.stop();
            }
        }
    }

    fn on_pong_overdue(&mut self, token: u64) -> Vec<Notification> {
        let KeepaliveAction::PongOverdue(timeout) = self.keepalive.on_pong_overdue(token) else {
            return Vec::new();
        };
        if !self.state().is_open() {
            return Vec::new();
        }

        warn!(
            "[{}] Pong timeout after {:?}, dropping connection",
            self.service_name, timeout
        );
        self.metrics.record_heartbeat_timeout();

        // The retired handle's own close notification is not forwarded
        if let Some(mut handle) = self.handle.take() {
            handle.close(CLOSE_HEARTBEAT_TIMEOUT, Some("heartbeat timeout"));
        }

        let mut notifications = vec![Notification::Error(Error::HeartbeatTimeout {
            timeout_ms: timeout.as_millis() as u64,
        })];
        notifications.extend(self.on_close(CloseEvent::abnormal("heartbeat timeout")));
        notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutoReconnect, PingPong};
    use crate::handler::CLOSE_ABNORMAL;
    use crate::testing::MockTransport;
    use tokio::time::{Duration, Instant};

    struct Harness {
        manager: ConnectionManager,
        events_rx: mpsc::UnboundedReceiver<Event>,
        transport: MockTransport,
    }

    impl Harness {
        fn new(config: WebSocketConfig) -> Self {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let transport = MockTransport::default();
            let manager = ConnectionManager::new(
                "ws://test.invalid/feed".to_string(),
                config,
                Box::new(transport.clone()),
                events_tx,
                Arc::new(Metrics::new()),
            );
            Self {
                manager,
                events_rx,
                transport,
            }
        }

        /// Apply every event already queued.
        fn pump(&mut self) -> Vec<Notification> {
            let mut out = Vec::new();
            while let Ok(event) = self.events_rx.try_recv() {
                out.extend(self.manager.handle_event(event));
            }
            out
        }

        /// Wait for the next event (advancing paused time) and apply it.
        async fn next_event(&mut self) -> Vec<Notification> {
            let event = self.events_rx.recv().await.expect("event");
            self.manager.handle_event(event)
        }

        fn open_connected(&mut self) {
            self.manager.open();
            self.transport.events(self.transport.latest()).open();
            self.pump();
        }

        fn drop_unclean(&mut self) -> Vec<Notification> {
            self.transport
                .events(self.transport.latest())
                .close(CloseEvent::abnormal("reset"));
            self.pump()
        }
    }

    fn reconnecting(interval_ms: u64, max_attempts: u32) -> WebSocketConfig {
        WebSocketConfig::builder()
            .auto_reconnect(AutoReconnect::Custom {
                interval: Some(Duration::from_millis(interval_ms)),
                max_attempts: Some(max_attempts),
            })
            .build()
            .expect("valid config")
    }

    fn has_fail(notifications: &[Notification]) -> bool {
        notifications.iter().any(|n| matches!(n, Notification::Fail))
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_transitions() {
        let mut h = Harness::new(WebSocketConfig::default());
        assert_eq!(h.manager.state(), ConnectionState::Closed);

        h.manager.open();
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert_eq!(h.transport.connections(), 1);
        assert_eq!(h.transport.url(0), "ws://test.invalid/feed");

        h.transport.events(0).open();
        let notifications = h.pump();
        assert!(matches!(notifications.as_slice(), [Notification::Open]));
        assert_eq!(h.manager.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_replaces_existing_handle() {
        let mut h = Harness::new(WebSocketConfig::default());
        h.open_connected();

        h.manager.open();
        assert_eq!(h.transport.connections(), 2);
        assert_eq!(h.transport.close_request(0), Some((1000, None)));
        assert!(h.transport.is_dropped(0));
        assert_eq!(h.manager.state(), ConnectionState::Connecting);

        // Late events from the first handle do not touch the new one
        h.transport.events(0).message("late");
        assert!(h.pump().is_empty());
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_open() {
        let mut h = Harness::new(WebSocketConfig::default());
        assert!(!h.manager.send(Payload::from("x")));

        h.manager.open();
        assert!(!h.manager.send(Payload::from("x")));
        assert!(h.transport.sent(0).is_empty());

        h.transport.events(0).open();
        h.pump();
        assert!(h.manager.send(Payload::from("x")));
        assert!(h.manager.send(Payload::from(vec![1u8, 2, 3])));
        assert_eq!(
            h.transport.sent(0),
            vec![Payload::from("x"), Payload::from(vec![1u8, 2, 3])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let mut h = Harness::new(reconnecting(1000, 3));
        h.manager.close(CLOSE_NORMAL, None);
        h.manager.close(CLOSE_NORMAL, None);
        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert_eq!(h.transport.connections(), 0);

        h.open_connected();
        h.manager.close(4001, Some("bye"));
        h.manager.close(CLOSE_NORMAL, None);
        assert_eq!(h.transport.close_request(0), Some((4001, Some("bye".to_string()))));
        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert!(!h.manager.send(Payload::from("x")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_handle_close_reaches_handler_only() {
        let mut h = Harness::new(reconnecting(1000, 3));
        h.open_connected();
        h.manager.close(CLOSE_NORMAL, None);

        h.transport.events(0).close(CloseEvent::clean(1000, ""));
        let notifications = h.pump();
        assert!(matches!(notifications.as_slice(), [Notification::Close(c)] if c.code == 1000));
        assert!(!h.manager.is_reconnect_pending());
        assert_eq!(h.manager.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_retired_handle_reports_close() {
        let mut h = Harness::new(WebSocketConfig::default());
        h.open_connected();
        h.manager.close(CLOSE_NORMAL, None);
        h.manager.open();
        h.transport.events(1).open();
        h.pump();
        h.manager.close(4001, Some("done"));
        assert_eq!(h.transport.connections(), 2);

        // Both peers finish their handshakes after the second retirement
        h.transport.events(0).close(CloseEvent::clean(1000, ""));
        h.transport.events(1).close(CloseEvent::clean(4001, "done"));
        let notifications = h.pump();

        let codes: Vec<u16> = notifications
            .iter()
            .filter_map(|n| match n {
                Notification::Close(c) => Some(c.code),
                _ => None,
            })
            .collect();
        assert_eq!(codes, vec![1000, 4001]);
        assert_eq!(notifications.len(), 2);
        assert_eq!(h.manager.state(), ConnectionState::Closed);

        // A retired id forwards its close only once
        h.transport.events(0).close(CloseEvent::clean(1000, ""));
        assert!(h.pump().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_close_never_reconnects() {
        let mut h = Harness::new(reconnecting(1000, 3));
        h.open_connected();

        h.transport.events(0).close(CloseEvent::clean(1000, "done"));
        let notifications = h.pump();
        assert!(matches!(notifications.as_slice(), [Notification::Close(_)]));
        assert!(!h.manager.is_reconnect_pending());
        assert_eq!(h.manager.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclean_close_without_auto_reconnect() {
        let mut h = Harness::new(WebSocketConfig::default());
        h.open_connected();

        let notifications = h.drop_unclean();
        assert!(matches!(
            notifications.as_slice(),
            [Notification::Close(c)] if c.code == CLOSE_ABNORMAL
        ));
        assert!(!h.manager.is_reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_delays_double() {
        let mut h = Harness::new(reconnecting(1000, 5));
        h.open_connected();
        let base = h.manager.policy.current_delay();

        for n in 1..=3u32 {
            h.drop_unclean();
            assert!(h.manager.is_reconnect_pending());
            assert_eq!(h.manager.reconnect_attempts(), n);

            let waiting = Instant::now();
            h.next_event().await;
            assert_eq!(waiting.elapsed(), base * 2u32.pow(n - 1));
            assert_eq!(h.transport.connections(), n as usize + 1);
            assert_eq!(h.manager.state(), ConnectionState::Connecting);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_fires_fail_once() {
        let mut h = Harness::new(reconnecting(1000, 2));
        h.open_connected();

        assert!(!has_fail(&h.drop_unclean()));
        h.next_event().await;
        assert!(!has_fail(&h.drop_unclean()));
        h.next_event().await;
        assert_eq!(h.transport.connections(), 3);

        assert!(has_fail(&h.drop_unclean()));
        assert!(!h.manager.is_reconnect_pending());
        assert_eq!(h.manager.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_open_resets_attempts() {
        let mut h = Harness::new(reconnecting(1000, 5));
        h.open_connected();

        h.drop_unclean();
        h.next_event().await;
        h.drop_unclean();
        h.next_event().await;
        assert_eq!(h.manager.reconnect_attempts(), 2);

        h.transport.events(h.transport.latest()).open();
        h.pump();
        assert_eq!(h.manager.reconnect_attempts(), 0);
        assert!(h.manager.policy.current_delay() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_reconnect() {
        let mut h = Harness::new(reconnecting(1000, 3));
        h.open_connected();
        h.drop_unclean();
        assert!(h.manager.is_reconnect_pending());

        h.manager.close(CLOSE_NORMAL, None);
        assert!(!h.manager.is_reconnect_pending());
        assert_eq!(h.manager.reconnect_attempts(), 0);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(h.pump().is_empty());
        assert_eq!(h.transport.connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_does_not_change_state() {
        let mut h = Harness::new(reconnecting(1000, 3));
        h.open_connected();

        h.transport
            .events(0)
            .error(Error::Transport("boom".to_string()));
        let notifications = h.pump();
        assert!(matches!(notifications.as_slice(), [Notification::Error(_)]));
        assert_eq!(h.manager.state(), ConnectionState::Open);
        assert!(!h.manager.is_reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_is_swallowed() {
        let config = WebSocketConfig::builder()
            .ping_pong(PingPong::Interval(Duration::from_millis(1000)))
            .build()
            .expect("valid config");
        let mut h = Harness::new(config);
        h.open_connected();

        h.transport.events(0).message("pong");
        h.transport.events(0).message("pong!");
        h.transport.events(0).message(b"pong".to_vec());
        let notifications = h.pump();

        assert_eq!(notifications.len(), 2);
        assert!(matches!(
            &notifications[0],
            Notification::Message(Payload::Text(t)) if t == "pong!"
        ));
        assert!(matches!(&notifications[1], Notification::Message(Payload::Binary(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_sent_on_schedule() {
        let config = WebSocketConfig::builder()
            .ping_pong(Duration::from_millis(1000))
            .build()
            .expect("valid config");
        let mut h = Harness::new(config);
        let opened = Instant::now();
        h.open_connected();

        h.next_event().await;
        assert_eq!(opened.elapsed(), Duration::from_millis(1000));
        assert_eq!(h.transport.sent(0), vec![Payload::from("ping")]);
        assert!(h.manager.keepalive.awaiting_pong());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_event_stops_keepalive() {
        let config = WebSocketConfig::builder()
            .ping_pong(Duration::from_millis(1000))
            .build()
            .expect("valid config");
        let mut h = Harness::new(config);
        h.open_connected();
        assert!(h.manager.keepalive.is_pending());

        h.drop_unclean();
        assert!(!h.manager.keepalive.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_timeout_drops_connection() {
        let config = WebSocketConfig::builder()
            .auto_reconnect(true)
            .ping_pong(Duration::from_millis(1000))
            .pong_timeout(Duration::from_millis(500))
            .build()
            .expect("valid config");
        let mut h = Harness::new(config);
        h.open_connected();

        h.next_event().await; // ping
        let notifications = h.next_event().await; // pong deadline

        assert!(matches!(
            notifications.as_slice(),
            [
                Notification::Error(Error::HeartbeatTimeout { timeout_ms: 500 }),
                Notification::Close(c),
            ] if !c.was_clean
        ));
        assert_eq!(
            h.transport.close_request(0),
            Some((CLOSE_HEARTBEAT_TIMEOUT, Some("heartbeat timeout".to_string())))
        );
        assert_eq!(h.manager.state(), ConnectionState::Closed);
        assert!(h.manager.is_reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_url_change_applies_to_next_attempt() {
        let mut h = Harness::new(WebSocketConfig::default());
        h.manager.open();
        h.manager.set_url("ws://other.invalid".to_string());
        h.manager.open();

        assert_eq!(h.transport.url(0), "ws://test.invalid/feed");
        assert_eq!(h.transport.url(1), "ws://other.invalid");
        assert_eq!(h.manager.url(), "ws://other.invalid");
    }
}
