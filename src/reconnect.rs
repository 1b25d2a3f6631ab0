use crate::config::ReconnectConfig;
use crate::timer::TimerSlot;
use crate::transport::Event;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Outcome of [`ReconnectPolicy::attempt_step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnection is disabled; nothing was scheduled
    Disabled,
    /// A reconnect was scheduled
    Scheduled {
        /// 1-based attempt number
        attempt: u32,
        /// Delay before the attempt starts
        delay: Duration,
    },
    /// The attempt budget is used up
    Exhausted { attempts: u32 },
}

/// Decides whether and when to retry after an unclean close.
///
/// The base delay is drawn uniformly from `[0, base_interval)` on every reset
/// (not on every retry) and doubles after each consumed attempt, so clients
/// that drop together do not reconnect together. The delay itself is not
/// capped; only the number of attempts is.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts_used: u32,
    current_delay: Duration,
    timer: TimerSlot,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = jittered(config.base_interval);
        Self {
            config,
            attempts_used: 0,
            current_delay,
            timer: TimerSlot::new(),
        }
    }

    /// Reset counters after a successful open or an explicit close.
    pub fn reset(&mut self) {
        if !self.config.enabled {
            return;
        }
        self.attempts_used = 0;
        self.current_delay = jittered(self.config.base_interval);
    }

    /// React to one unclean close.
    pub(crate) fn attempt_step(&mut self, tx: &mpsc::UnboundedSender<Event>) -> ReconnectDecision {
        if !self.config.enabled {
            return ReconnectDecision::Disabled;
        }

        if self.attempts_used >= self.config.max_attempts {
            return ReconnectDecision::Exhausted {
                attempts: self.attempts_used,
            };
        }

        let delay = self.current_delay;
        self.timer
            .schedule(delay, tx, |token| Event::ReconnectDue { token });
        self.attempts_used += 1;
        self.current_delay = self.current_delay.saturating_mul(2);

        ReconnectDecision::Scheduled {
            attempt: self.attempts_used,
            delay,
        }
    }

    /// Consume a reconnect expiry. Returns `false` for a cancelled timer.
    pub(crate) fn fire(&mut self, token: u64) -> bool {
        self.timer.fire(token)
    }

    /// Cancel a pending reconnect. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.timer.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    /// Attempts consumed since the last reset
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Delay the next attempt would wait
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

/// Uniform random duration in `[0, upper)`
fn jittered(upper: Duration) -> Duration {
    let jittered = rand::random::<f64>() * upper.as_millis() as f64;
    Duration::from_millis(jittered as u64)
}
