use crate::config::KeepaliveConfig;
use crate::timer::TimerSlot;
use crate::transport::{Event, Payload};
use tokio::sync::mpsc;
use tokio::time::Duration;

/// What a keepalive expiry asks the manager to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeepaliveAction {
    /// Stale or cancelled timer
    Ignore,
    /// Send the ping sentinel now
    SendPing(Payload),
    /// The pong deadline passed
    PongOverdue(Duration),
}

/// Application-level heartbeat for a single connection.
///
/// Pings go out on a fixed schedule measured from connection open or from the
/// last pong, regardless of other traffic. The ping timer and the optional
/// pong deadline share one slot, so at most one keepalive timer is ever
/// pending.
#[derive(Debug)]
pub struct KeepaliveMonitor {
    config: KeepaliveConfig,
    timer: TimerSlot,
    /// Whether a ping was sent and no pong has arrived since
    awaiting_pong: bool,
}

impl KeepaliveMonitor {
    pub fn new(config: KeepaliveConfig) -> Self {
        Self {
            config,
            timer: TimerSlot::new(),
            awaiting_pong: false,
        }
    }

    /// Arm the ping timer. No-op when keepalive is disabled.
    pub(crate) fn start(&mut self, tx: &mpsc::UnboundedSender<Event>) {
        if !self.config.enabled {
            return;
        }
        self.awaiting_pong = false;
        self.timer
            .schedule(self.config.interval, tx, |token| Event::PingDue { token });
    }

    /// A pong arrived: slide the next ping a full interval forward.
    pub(crate) fn on_pong(&mut self, tx: &mpsc::UnboundedSender<Event>) {
        self.timer.cancel();
        self.start(tx);
    }

    /// Cancel any pending timer.
    pub fn stop(&mut self) {
        self.timer.cancel();
        self.awaiting_pong = false;
    }

    /// Handle a ping expiry. Arms the pong deadline when one is configured.
    pub(crate) fn on_ping_due(
        &mut self,
        token: u64,
        tx: &mpsc::UnboundedSender<Event>,
    ) -> KeepaliveAction {
        if !self.timer.fire(token) {
            return KeepaliveAction::Ignore;
        }

        if let Some(timeout) = self.config.pong_timeout {
            self.timer
                .schedule(timeout, tx, |token| Event::PongOverdue { token });
        }
        self.awaiting_pong = true;

        KeepaliveAction::SendPing(self.ping_payload())
    }

    /// Handle a pong deadline expiry.
    pub(crate) fn on_pong_overdue(&mut self, token: u64) -> KeepaliveAction {
        if !self.timer.fire(token) {
            return KeepaliveAction::Ignore;
        }
        self.awaiting_pong = false;

        match self.config.pong_timeout {
            Some(timeout) => KeepaliveAction::PongOverdue(timeout),
            None => KeepaliveAction::Ignore,
        }
    }

    /// Whether `payload` is exactly the pong sentinel
    pub fn is_pong(&self, payload: &Payload) -> bool {
        payload.as_text() == Some(self.config.pong_message.as_str())
    }

    pub fn ping_payload(&self) -> Payload {
        Payload::Text(self.config.ping_message.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn awaiting_pong(&self) -> bool {
        self.awaiting_pong
    }

    /// Time until the next keepalive timer expires
    pub fn time_until_next(&self) -> Option<Duration> {
        self.timer.remaining()
    }
}
