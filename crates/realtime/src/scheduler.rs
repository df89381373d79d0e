//! Cancellable retry timers.
//!
//! The state machine never sleeps. It asks a [`Scheduler`] for a timer and
//! later receives the matching [`TimerTicket`] back as an input.
//! [`TokioScheduler`] is the runtime implementation; [`ManualScheduler`]
//! runs on a virtual clock so retry logic can be driven step by step.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::types::RoomKey;

/// Identity of a retry timer. At most one timer per key is live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Next authentication attempt.
    AuthRetry,
    /// Next join attempt for one room.
    RoomRetry(RoomKey),
    /// Next step of the operation queue drain.
    QueueFlush,
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKey::AuthRetry => f.write_str("auth_retry"),
            TimerKey::RoomRetry(key) => write!(f, "room_retry:{key}"),
            TimerKey::QueueFlush => f.write_str("queue_flush"),
        }
    }
}

/// A fired (or firing) timer. `seq` distinguishes successive timers that
/// share a key, so a ticket for a replaced or cancelled timer is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTicket {
    pub key: TimerKey,
    pub seq: u64,
}

/// Clock plus cancellable timer handles.
pub trait Scheduler: Send {
    /// Starts a timer, replacing any live timer with the same key.
    fn schedule(&mut self, key: TimerKey, delay: Duration) -> TimerTicket;

    /// Cancels the live timer for `key`, if any.
    fn cancel(&mut self, key: &TimerKey);

    /// Cancels every live timer.
    fn cancel_all(&mut self);

    /// Returns `true` if a timer for `key` is live.
    fn is_pending(&self, key: &TimerKey) -> bool;

    /// Consumes a fired ticket. Returns `false` for stale tickets.
    fn fire(&mut self, ticket: &TimerTicket) -> bool;
}

/// Callback receiving tickets of elapsed timers.
pub type FireCallback = Arc<dyn Fn(TimerTicket) + Send + Sync>;

/// [`Scheduler`] backed by `tokio::time::sleep` tasks.
///
/// Elapsed timers are reported through the fire callback, which posts the
/// ticket back onto the owner's input channel.
pub struct TokioScheduler {
    on_fire: FireCallback,
    next_seq: u64,
    timers: HashMap<TimerKey, (u64, CancellationToken)>,
}

impl TokioScheduler {
    pub fn new(on_fire: FireCallback) -> Self {
        Self {
            on_fire,
            next_seq: 0,
            timers: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, key: TimerKey, delay: Duration) -> TimerTicket {
        self.cancel(&key);
        self.next_seq += 1;
        let ticket = TimerTicket {
            key: key.clone(),
            seq: self.next_seq,
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let on_fire = self.on_fire.clone();
        let fired = ticket.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => on_fire(fired),
            }
        });

        trace!(timer = %key, delay_ms = delay.as_millis() as u64, "timer scheduled");
        self.timers.insert(key, (ticket.seq, cancel));
        ticket
    }

    fn cancel(&mut self, key: &TimerKey) {
        if let Some((_, token)) = self.timers.remove(key) {
            token.cancel();
            trace!(timer = %key, "timer cancelled");
        }
    }

    fn cancel_all(&mut self) {
        for (_, (_, token)) in self.timers.drain() {
            token.cancel();
        }
    }

    fn is_pending(&self, key: &TimerKey) -> bool {
        self.timers.contains_key(key)
    }

    fn fire(&mut self, ticket: &TimerTicket) -> bool {
        match self.timers.get(&ticket.key) {
            Some((seq, _)) if *seq == ticket.seq => {
                self.timers.remove(&ticket.key);
                true
            }
            _ => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// [`Scheduler`] on a virtual clock. Time only moves through
/// [`advance`](ManualScheduler::advance).
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_seq: u64,
    /// key → (seq, deadline, requested delay)
    timers: HashMap<TimerKey, (u64, Duration, Duration)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Delay the live timer for `key` was scheduled with.
    pub fn delay_of(&self, key: &TimerKey) -> Option<Duration> {
        self.timers.get(key).map(|(_, _, delay)| *delay)
    }

    /// Number of live timers.
    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }

    /// Moves the clock forward and returns the tickets now due, earliest
    /// first. Tickets stay live until handed to [`Scheduler::fire`].
    pub fn advance(&mut self, by: Duration) -> Vec<TimerTicket> {
        self.now += by;
        let mut due: Vec<(Duration, TimerTicket)> = self
            .timers
            .iter()
            .filter(|(_, (_, deadline, _))| *deadline <= self.now)
            .map(|(key, (seq, deadline, _))| {
                (
                    *deadline,
                    TimerTicket {
                        key: key.clone(),
                        seq: *seq,
                    },
                )
            })
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.seq.cmp(&b.1.seq)));
        due.into_iter().map(|(_, ticket)| ticket).collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, key: TimerKey, delay: Duration) -> TimerTicket {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.timers.insert(key.clone(), (seq, self.now + delay, delay));
        TimerTicket { key, seq }
    }

    fn cancel(&mut self, key: &TimerKey) {
        self.timers.remove(key);
    }

    fn cancel_all(&mut self) {
        self.timers.clear();
    }

    fn is_pending(&self, key: &TimerKey) -> bool {
        self.timers.contains_key(key)
    }

    fn fire(&mut self, ticket: &TimerTicket) -> bool {
        match self.timers.get(&ticket.key) {
            Some((seq, deadline, _)) if *seq == ticket.seq && *deadline <= self.now => {
                self.timers.remove(&ticket.key);
                true
            }
            _ => false,
        }
    }
}
