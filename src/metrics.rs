use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics for observability
///
/// Counters and gauges for monitoring a single connection. Use `snapshot()`
/// to get a point-in-time view of all metrics, or the individual getters for
/// specific values.
///
/// # Example
/// ```ignore
/// let metrics = ws.metrics();
///
/// println!("Reconnections: {}", metrics.reconnections());
/// println!("Messages received: {}", metrics.messages_received());
///
/// let snapshot = metrics.snapshot();
/// ```
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnections_total: AtomicU64,
    reconnect_attempts_total: AtomicU64,
    reconnect_failures_total: AtomicU64,
    messages_received_total: AtomicU64,
    messages_sent_total: AtomicU64,
    sends_rejected_total: AtomicU64,
    errors_total: AtomicU64,
    pings_sent_total: AtomicU64,
    pongs_received_total: AtomicU64,
    heartbeat_timeouts_total: AtomicU64,

    uptime: RwLock<Uptime>,
}

#[derive(Debug, Default)]
struct Uptime {
    connected_since: Option<Instant>,
    /// Accumulated time of sessions that have ended
    closed_sessions: Duration,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Getters ==========

    /// Get total connections established
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Get connections established by an automatic reconnect
    pub fn reconnections(&self) -> u64 {
        self.reconnections_total.load(Ordering::Relaxed)
    }

    /// Get total reconnect attempts started
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts_total.load(Ordering::Relaxed)
    }

    /// Get how often the reconnect budget was exhausted
    pub fn reconnect_failures(&self) -> u64 {
        self.reconnect_failures_total.load(Ordering::Relaxed)
    }

    /// Get total messages delivered to the handler
    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.load(Ordering::Relaxed)
    }

    /// Get total messages sent
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent_total.load(Ordering::Relaxed)
    }

    /// Get total sends rejected because the connection was not open
    pub fn sends_rejected(&self) -> u64 {
        self.sends_rejected_total.load(Ordering::Relaxed)
    }

    /// Get total errors
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Get total pings sent
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent_total.load(Ordering::Relaxed)
    }

    /// Get total pongs received
    pub fn pongs_received(&self) -> u64 {
        self.pongs_received_total.load(Ordering::Relaxed)
    }

    /// Get total heartbeat timeouts
    pub fn heartbeat_timeouts(&self) -> u64 {
        self.heartbeat_timeouts_total.load(Ordering::Relaxed)
    }

    /// Time since the current session opened (None if not connected)
    pub fn time_connected(&self) -> Option<Duration> {
        self.uptime.read().connected_since.map(|t| t.elapsed())
    }

    /// Total time spent connected across all sessions
    pub fn total_uptime(&self) -> Duration {
        let uptime = self.uptime.read();
        uptime.closed_sessions + uptime.connected_since.map_or(Duration::ZERO, |t| t.elapsed())
    }

    // ========== Recording methods (called internally) ==========

    /// Record an established connection and start the uptime clock
    pub(crate) fn record_connection(&self, is_reconnect: bool) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        if is_reconnect {
            self.reconnections_total.fetch_add(1, Ordering::Relaxed);
        }
        let mut uptime = self.uptime.write();
        if uptime.connected_since.is_none() {
            uptime.connected_since = Some(Instant::now());
        }
    }

    /// Stop the uptime clock
    pub(crate) fn record_disconnect(&self) {
        let mut uptime = self.uptime.write();
        if let Some(since) = uptime.connected_since.take() {
            uptime.closed_sessions += since.elapsed();
        }
    }

    pub(crate) fn record_reconnect_attempt(&self) {
        self.reconnect_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_failure(&self) {
        self.reconnect_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment message received counter
    pub(crate) fn record_message_received(&self) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment message sent counter
    pub(crate) fn record_message_sent(&self) {
        self.messages_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_rejected(&self) {
        self.sends_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment error counter
    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment ping counter
    pub(crate) fn record_ping(&self) {
        self.pings_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment pong counter
    pub(crate) fn record_pong(&self) {
        self.pongs_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_timeout(&self) {
        self.heartbeat_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all metrics for export
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Acquire),
            reconnections_total: self.reconnections_total.load(Ordering::Acquire),
            reconnect_attempts_total: self.reconnect_attempts_total.load(Ordering::Acquire),
            reconnect_failures_total: self.reconnect_failures_total.load(Ordering::Acquire),
            messages_received_total: self.messages_received_total.load(Ordering::Acquire),
            messages_sent_total: self.messages_sent_total.load(Ordering::Acquire),
            sends_rejected_total: self.sends_rejected_total.load(Ordering::Acquire),
            errors_total: self.errors_total.load(Ordering::Acquire),
            pings_sent_total: self.pings_sent_total.load(Ordering::Acquire),
            pongs_received_total: self.pongs_received_total.load(Ordering::Acquire),
            heartbeat_timeouts_total: self.heartbeat_timeouts_total.load(Ordering::Acquire),
            time_connected: self.time_connected(),
            total_uptime: self.total_uptime(),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub reconnections_total: u64,
    pub reconnect_attempts_total: u64,
    pub reconnect_failures_total: u64,
    pub messages_received_total: u64,
    pub messages_sent_total: u64,
    pub sends_rejected_total: u64,
    pub errors_total: u64,
    pub pings_sent_total: u64,
    pub pongs_received_total: u64,
    pub heartbeat_timeouts_total: u64,
    /// Duration of the current session (None if not connected)
    pub time_connected: Option<Duration>,
    pub total_uptime: Duration,
}
