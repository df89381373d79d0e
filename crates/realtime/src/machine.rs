//! Connection state machine.
//!
//! [`Machine`] owns every piece of connection state (phase, credential,
//! operation queue, room registry, listeners, timers) and is driven by
//! three kinds of input: caller commands, transport events and fired
//! timers. It never blocks and never sleeps, so it can be driven either by
//! the [`ConnectionManager`](crate::ConnectionManager) actor or directly
//! with a [`ManualScheduler`](crate::ManualScheduler) in tests.

use tracing::{debug, info, trace, warn};

use harborlink_protocol::RoomKind;

use crate::config::ManagerConfig;
use crate::dispatcher::{Dispatcher, Event};
use crate::error::TransportError;
use crate::queue::OperationQueue;
use crate::rooms::RoomRegistry;
use crate::scheduler::{Scheduler, TimerKey, TimerTicket};
use crate::transport::{Outbound, Transport, TransportEvent};
use crate::types::{
    ConnectionSnapshot, ConnectionState, OperationKind, QueuedOperation, RoomKey, RoomSubscription,
};

use ConnectionState::*;

pub struct Machine<T: Transport, S: Scheduler> {
    transport: T,
    scheduler: S,
    config: ManagerConfig,
    state: ConnectionState,
    credential: Option<String>,
    /// `false` once the caller disconnected or the transport gave up.
    /// Late transport events are dropped while unset.
    transport_open: bool,
    reconnect_attempts: u32,
    auth_retry_count: u32,
    queue: OperationQueue,
    rooms: RoomRegistry,
    dispatcher: Dispatcher,
}

impl<T: Transport, S: Scheduler> Machine<T, S> {
    pub fn new(transport: T, scheduler: S, config: ManagerConfig) -> Self {
        Self {
            transport,
            scheduler,
            config,
            state: Disconnected,
            credential: None,
            transport_open: false,
            reconnect_attempts: 0,
            auth_retry_count: 0,
            queue: OperationQueue::new(),
            rooms: RoomRegistry::new(),
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.state,
            is_authenticated: self.state == Authenticated,
            reconnect_attempts: self.reconnect_attempts,
            rooms: self.rooms.subscriptions(),
            given_up_rooms: self.rooms.given_up(),
            queued_operation_count: self.queue.len(),
            auth_retry_count: self.auth_retry_count,
        }
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    // --- Commands ---

    /// Opens the transport from `Disconnected` or `Error`. In any other
    /// state only the credential is recorded (and used right away when the
    /// link is up but unauthenticated).
    pub fn connect(&mut self, credential: Option<String>) {
        if let Some(credential) = credential {
            self.credential = Some(credential);
        }
        match self.state {
            Disconnected | Error => {
                info!("connecting");
                self.transport_open = true;
                self.set_state(Connecting);
                self.transport.open(self.credential.as_deref());
            }
            Connected if self.credential.is_some() => self.begin_authentication(),
            state => debug!(%state, "connect ignored"),
        }
    }

    /// Closes the transport, cancels every timer and drops queued
    /// operations. The room registry and the credential are kept.
    pub fn disconnect(&mut self) {
        self.transport_open = false;
        self.transport.close();
        self.scheduler.cancel_all();
        let dropped = self.queue.clear();
        self.rooms.reset_failures();
        self.reconnect_attempts = 0;
        self.auth_retry_count = 0;
        info!(
            dropped_operations = dropped,
            rooms = self.rooms.len(),
            "disconnected"
        );
        self.set_state(Disconnected);
    }

    /// Stores the credential and authenticates now if the link is up.
    pub fn authenticate(&mut self, credential: String) {
        self.credential = Some(credential);
        if self.state.is_link_up() {
            self.begin_authentication();
        } else {
            debug!(state = %self.state, "credential stored for next connect");
        }
    }

    /// Runs a join, leave or alert operation now, or queues it until the
    /// connection is authenticated.
    pub fn submit(&mut self, kind: OperationKind, payload: String) {
        match kind {
            OperationKind::JoinVessel => self.join_room(RoomKind::Vessel, payload),
            OperationKind::JoinArea => self.join_room(RoomKind::Area, payload),
            OperationKind::LeaveVessel => self.leave_room(RoomKind::Vessel, payload),
            OperationKind::LeaveArea => self.leave_room(RoomKind::Area, payload),
            OperationKind::MarkAlertRead | OperationKind::DismissAlert => {
                if self.must_queue() {
                    self.enqueue(kind, payload);
                } else {
                    self.run_direct(QueuedOperation::new(kind, payload));
                }
            }
        }
    }

    pub fn join_room(&mut self, kind: RoomKind, id: String) {
        if self.must_queue() {
            self.enqueue(OperationKind::join(kind), id);
            return;
        }
        let key = RoomKey::new(kind, &id);
        if self.rooms.is_given_up(&key) {
            debug!(room = %key, "rejoining given-up room");
            self.rooms.remove(&key);
        }
        if self.rooms.contains(&key) {
            debug!(room = %key, "already joined");
            return;
        }
        self.run_direct(QueuedOperation::new(OperationKind::join(kind), id));
    }

    /// Removes the room locally right away; the leave itself is sent now
    /// or queued like a join.
    pub fn leave_room(&mut self, kind: RoomKind, id: String) {
        let key = RoomKey::new(kind, &id);
        self.scheduler.cancel(&TimerKey::RoomRetry(key.clone()));
        let given_up = self.rooms.is_given_up(&key);
        let was_joined = self.rooms.remove(&key).is_some() && !given_up;

        if self.must_queue() {
            if was_joined || self.queue.contains(OperationKind::join(kind), &id) {
                self.enqueue(OperationKind::leave(kind), id);
            } else {
                debug!(room = %key, "leave of unknown room ignored");
            }
            return;
        }
        if !was_joined {
            debug!(room = %key, "leave of unknown room ignored");
            return;
        }
        self.run_direct(QueuedOperation::new(OperationKind::leave(kind), id));
    }

    // --- Inputs ---

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if !self.transport_open {
            debug!(event = event.name(), "transport closed, event ignored");
            return;
        }

        match &event {
            TransportEvent::Connect | TransportEvent::Reconnect { .. } => self.on_link_up(&event),
            TransportEvent::Disconnect { reason } => {
                info!(%reason, "transport disconnected");
                self.set_state(Disconnected);
            }
            TransportEvent::ConnectError { message } => {
                warn!(error = %message, "connect error");
                if matches!(
                    self.state,
                    Connecting | Connected | Authenticating | Authenticated
                ) {
                    self.set_state(Error);
                }
            }
            TransportEvent::ReconnectAttempt { attempt } => {
                debug!(attempt, "reconnect attempt");
                self.reconnect_attempts = *attempt;
                self.set_state(Reconnecting);
            }
            TransportEvent::ReconnectError { message } => {
                debug!(error = %message, "reconnect error");
            }
            TransportEvent::ReconnectFailed => {
                warn!(
                    attempts = self.reconnect_attempts,
                    "reconnection failed, giving up"
                );
                self.transport_open = false;
                self.set_state(Error);
            }
            TransportEvent::Authenticated { success: true } => self.on_authenticated(),
            TransportEvent::Authenticated { success: false } => {
                self.on_auth_rejected("authentication rejected")
            }
            TransportEvent::Unauthorized { message } => self.on_auth_rejected(message),
            TransportEvent::RoomJoined { room, kind } => {
                let key = RoomKey::new(*kind, room);
                debug!(room = %key, "room joined");
                self.rooms.clear_failures(&key);
                self.scheduler.cancel(&TimerKey::RoomRetry(key));
            }
            TransportEvent::RoomJoinError { room, kind, error } => {
                let keys = match kind {
                    Some(kind) => vec![RoomKey::new(*kind, room)],
                    None => self.rooms.keys_for_room(room),
                };
                for key in keys {
                    self.on_room_join_rejected(key, error);
                }
            }
            TransportEvent::Push { event, .. } => trace!(%event, "push event"),
        }

        self.dispatcher.dispatch(&Event::Transport(event));
    }

    /// Handles a fired timer. Stale tickets are ignored.
    pub fn handle_timer(&mut self, ticket: TimerTicket) {
        if !self.scheduler.fire(&ticket) {
            trace!(timer = %ticket.key, seq = ticket.seq, "stale timer ignored");
            return;
        }
        match ticket.key {
            TimerKey::AuthRetry => {
                if self.state == Connected && self.credential.is_some() {
                    info!(attempt = self.auth_retry_count, "retrying authentication");
                    self.begin_authentication();
                } else {
                    debug!(state = %self.state, "auth retry skipped");
                }
            }
            TimerKey::RoomRetry(key) => self.retry_room(key),
            TimerKey::QueueFlush => self.flush_next(),
        }
    }

    // --- Transitions ---

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(%from, %to, "state changed");

        if matches!(to, Disconnected | Error) {
            self.scheduler.cancel_all();
        }
        self.dispatcher.dispatch(&Event::StateChanged { from, to });
        if to == Authenticated {
            self.on_enter_authenticated();
        }
    }

    fn on_link_up(&mut self, event: &TransportEvent) {
        self.reconnect_attempts = 0;
        if self.state.is_link_up() {
            debug!(event = event.name(), "link already up");
            return;
        }
        info!(event = event.name(), "transport connected");
        self.set_state(Connected);
        if self.credential.is_some() {
            self.begin_authentication();
        }
    }

    fn begin_authentication(&mut self) {
        let Some(token) = self.credential.clone() else {
            return;
        };
        self.scheduler.cancel(&TimerKey::AuthRetry);
        match self.transport.emit(Outbound::Authenticate { token }) {
            Ok(()) => self.set_state(Authenticating),
            Err(e) => {
                warn!(error = %e, "failed to send authenticate");
                self.schedule_auth_retry();
            }
        }
    }

    fn on_authenticated(&mut self) {
        if !matches!(self.state, Connected | Authenticating) {
            debug!(state = %self.state, "unexpected authenticated ignored");
            return;
        }
        self.scheduler.cancel(&TimerKey::AuthRetry);
        self.auth_retry_count = 0;
        self.set_state(Authenticated);
    }

    fn on_auth_rejected(&mut self, message: &str) {
        if !matches!(self.state, Connected | Authenticating | Authenticated) {
            debug!(state = %self.state, "unexpected auth failure ignored");
            return;
        }
        warn!(%message, "authentication failed");
        self.set_state(Connected);
        self.schedule_auth_retry();
    }

    fn schedule_auth_retry(&mut self) {
        if self.credential.is_none() {
            return;
        }
        let delay = self.config.auth_backoff.delay(self.auth_retry_count);
        self.auth_retry_count += 1;
        info!(
            attempt = self.auth_retry_count,
            delay_ms = delay.as_millis() as u64,
            "authentication retry scheduled"
        );
        self.scheduler.schedule(TimerKey::AuthRetry, delay);
    }

    fn on_enter_authenticated(&mut self) {
        info!(
            queued = self.queue.len(),
            rooms = self.rooms.len(),
            "authenticated"
        );
        self.rooms.begin_session();
        for sub in self.rooms.subscriptions() {
            self.scheduler.cancel(&TimerKey::RoomRetry(sub.key()));
        }
        self.scheduler.cancel(&TimerKey::QueueFlush);
        self.flush_next();
    }

    // --- Queue ---

    fn must_queue(&self) -> bool {
        self.state != Authenticated || !self.queue.is_empty()
    }

    fn enqueue(&mut self, kind: OperationKind, payload: String) {
        if self.queue.enqueue(kind, payload.as_str()) {
            debug!(op = %kind, %payload, queued = self.queue.len(), "operation queued");
        } else {
            debug!(op = %kind, %payload, "duplicate operation ignored");
        }
    }

    /// Performs the head of the queue, then schedules the next step. Once
    /// the queue is empty the room registry is replayed.
    fn flush_next(&mut self) {
        if self.state != Authenticated {
            debug!(queued = self.queue.len(), "queue flush paused");
            return;
        }
        if let Some(op) = self.queue.pop_front() {
            if let Err(e) = self.perform(&op) {
                if !self.requeue_failed(op, e) {
                    return;
                }
            }
        }
        if self.queue.is_empty() {
            self.replay_rooms();
        } else {
            self.scheduler
                .schedule(TimerKey::QueueFlush, self.config.queue_flush_interval);
        }
    }

    fn run_direct(&mut self, op: QueuedOperation) {
        if let Err(e) = self.perform(&op) {
            if self.requeue_failed(op, e) && !self.queue.is_empty() {
                self.scheduler
                    .schedule(TimerKey::QueueFlush, self.config.queue_flush_interval);
            }
        }
    }

    /// Puts a failed operation back at the head of the queue. Returns
    /// `false` when draining should pause until the next authentication.
    ///
    /// A missing link does not count against the operation: it waits for
    /// the next session. Other send failures count, and the operation is
    /// dropped once `max_operation_retries` is reached.
    fn requeue_failed(&mut self, mut op: QueuedOperation, err: TransportError) -> bool {
        if matches!(err, TransportError::NotConnected) {
            debug!(op = %op.kind, payload = %op.payload, "link down, operation held for next session");
            self.queue.push_front(op);
            return false;
        }
        op.retries += 1;
        if op.retries >= self.config.max_operation_retries {
            warn!(
                op = %op.kind,
                payload = %op.payload,
                retries = op.retries,
                error = %err,
                "dropping operation after repeated send failures"
            );
            return true;
        }
        debug!(op = %op.kind, payload = %op.payload, retries = op.retries, error = %err, "send failed, operation requeued");
        self.queue.push_front(op);
        true
    }

    fn perform(&mut self, op: &QueuedOperation) -> Result<(), TransportError> {
        let id = op.payload.clone();
        match op.kind {
            OperationKind::JoinVessel => self.join_now(RoomKind::Vessel, id),
            OperationKind::JoinArea => self.join_now(RoomKind::Area, id),
            OperationKind::LeaveVessel => self.leave_now(RoomKind::Vessel, id),
            OperationKind::LeaveArea => self.leave_now(RoomKind::Area, id),
            OperationKind::MarkAlertRead => self.transport.emit(Outbound::MarkAlertRead { id }),
            OperationKind::DismissAlert => self.transport.emit(Outbound::DismissAlert { id }),
        }
    }

    fn join_now(&mut self, kind: RoomKind, id: String) -> Result<(), TransportError> {
        let key = RoomKey::new(kind, &id);
        if self.rooms.is_given_up(&key) {
            self.rooms.remove(&key);
        }
        if self.rooms.contains(&key) {
            debug!(room = %key, "already joined");
            return Ok(());
        }
        self.rooms.insert(RoomSubscription::new(kind, id.as_str()));
        match self.transport.emit(Outbound::JoinRoom { kind, id }) {
            Ok(()) => {
                self.rooms.mark_joined(&key);
                debug!(room = %key, "join sent");
                Ok(())
            }
            Err(e) => {
                self.rooms.remove(&key);
                Err(e)
            }
        }
    }

    fn leave_now(&mut self, kind: RoomKind, id: String) -> Result<(), TransportError> {
        let key = RoomKey::new(kind, &id);
        self.scheduler.cancel(&TimerKey::RoomRetry(key.clone()));
        self.rooms.remove(&key);
        self.transport.emit(Outbound::LeaveRoom { kind, id })?;
        debug!(room = %key, "leave sent");
        Ok(())
    }

    // --- Rooms ---

    /// Re-joins every registered room not yet joined in this session.
    fn replay_rooms(&mut self) {
        let pending = self.rooms.pending_replay();
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "replaying room subscriptions");
        for sub in pending {
            let key = sub.key();
            match self.transport.emit(Outbound::JoinRoom {
                kind: sub.kind,
                id: sub.room,
            }) {
                Ok(()) => self.rooms.mark_joined(&key),
                Err(e) => self.on_room_emit_failed(key, e),
            }
        }
    }

    /// Handles a join the server refused. Only these count towards
    /// `max_room_join_attempts`.
    fn on_room_join_rejected(&mut self, key: RoomKey, error: &str) {
        if !self.rooms.contains(&key) || self.rooms.is_given_up(&key) {
            debug!(room = %key, %error, "join error for inactive room ignored");
            return;
        }
        let failures = self.rooms.record_failure(&key);
        if failures >= self.config.max_room_join_attempts {
            warn!(room = %key, failures, %error, "room join failed, giving up");
            self.rooms.give_up(&key);
            self.scheduler.cancel(&TimerKey::RoomRetry(key));
            return;
        }
        let delay = self.config.room_backoff.delay(failures - 1);
        warn!(
            room = %key,
            failures,
            delay_ms = delay.as_millis() as u64,
            %error,
            "room join failed, retry scheduled"
        );
        self.scheduler.schedule(TimerKey::RoomRetry(key), delay);
    }

    /// Handles a join that never left the client. Nothing is counted: with
    /// the link down the room stays unjoined for this session and is
    /// replayed after the next authentication, otherwise the retry is
    /// rescheduled.
    fn on_room_emit_failed(&mut self, key: RoomKey, err: TransportError) {
        if matches!(err, TransportError::NotConnected) {
            debug!(room = %key, "link down, room join left for replay");
            return;
        }
        let delay = self.config.room_backoff.delay(self.rooms.failures(&key));
        debug!(
            room = %key,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "room join not sent, retry scheduled"
        );
        self.scheduler.schedule(TimerKey::RoomRetry(key), delay);
    }

    fn retry_room(&mut self, key: RoomKey) {
        if self.state != Authenticated {
            debug!(room = %key, state = %self.state, "room retry deferred to replay");
            return;
        }
        if self.rooms.is_given_up(&key) {
            return;
        }
        let Some(sub) = self.rooms.get(&key).cloned() else {
            return;
        };
        debug!(room = %key, "retrying room join");
        match self.transport.emit(Outbound::JoinRoom {
            kind: sub.kind,
            id: sub.room,
        }) {
            Ok(()) => self.rooms.mark_joined(&key),
            Err(e) => self.on_room_emit_failed(key, e),
        }
    }
}
