use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

/// Stand-in deadline for delays too large to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A slot holding at most one pending single-shot timer.
///
/// Expiry is reported by sending an event built from the timer's token into
/// the manager's event channel. Scheduling replaces (and aborts) any pending
/// timer. An expiry that was already queued when the timer was cancelled is
/// recognized as stale through [`TimerSlot::fire`].
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    pending: Option<PendingTimer>,
    next_token: u64,
}

#[derive(Debug)]
struct PendingTimer {
    token: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot. Returns the token carried by the expiry event.
    pub fn schedule<E, F>(
        &mut self,
        delay: Duration,
        tx: &mpsc::UnboundedSender<E>,
        make_event: F,
    ) -> u64
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E,
    {
        self.cancel();

        self.next_token += 1;
        let token = self.next_token;
        // Deadline is fixed now, not when the task is first polled
        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or(now + FAR_FUTURE);
        let event = make_event(token);
        let tx = tx.clone();

        let task = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = tx.send(event);
        });

        self.pending = Some(PendingTimer {
            token,
            deadline,
            task,
        });
        token
    }

    /// Abort the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    /// Consume an expiry. Returns `false` if the token is stale.
    pub fn fire(&mut self, token: u64) -> bool {
        match &self.pending {
            Some(timer) if timer.token == token => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left until the pending timer expires
    pub fn remaining(&self) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|t| t.deadline.saturating_duration_since(Instant::now()))
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
