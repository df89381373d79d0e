//! Public handle to the connection manager.
//!
//! [`ConnectionManager::spawn`] moves a [`Machine`] into a single actor
//! task. Caller commands, transport events and fired timers all go through
//! one channel and are applied in arrival order; a snapshot of the state is
//! published on a `watch` channel after each one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::config::ManagerConfig;
use crate::dispatcher::{Event, Handler, HandlerId, payload_handler};
use crate::error::ManagerError;
use crate::machine::Machine;
use crate::scheduler::{TimerTicket, TokioScheduler};
use crate::transport::{Transport, TransportEvent};
use crate::types::{ConnectionSnapshot, ConnectionState, OperationKind, RoomSubscription};

enum Command {
    Connect(Option<String>),
    Disconnect,
    Authenticate(String),
    Operation(OperationKind, String),
    Subscribe {
        event: String,
        id: HandlerId,
        handler: Handler,
    },
    Unsubscribe {
        event: String,
        id: Option<HandlerId>,
    },
    /// Answered once every earlier input has been applied.
    Flush(oneshot::Sender<()>),
    Shutdown(Option<oneshot::Sender<()>>),
}

enum Input {
    Command(Command),
    Transport(TransportEvent),
    Timer(TimerTicket),
}

struct Inner {
    tx: mpsc::UnboundedSender<Input>,
    state_rx: watch::Receiver<ConnectionSnapshot>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = self.tx.send(Input::Command(Command::Shutdown(None)));
    }
}

/// Cloneable handle to a running connection manager.
///
/// The actor stops when [`shutdown`](Self::shutdown) is called or the last
/// handle is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Starts the manager over `transport`. Must be called inside a Tokio
    /// runtime.
    pub fn spawn<T: Transport>(mut transport: T, config: ManagerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let events_tx = tx.clone();
        transport.set_event_callback(Arc::new(move |event| {
            let _ = events_tx.send(Input::Transport(event));
        }));

        let timer_tx = tx.clone();
        let scheduler = TokioScheduler::new(Arc::new(move |ticket| {
            let _ = timer_tx.send(Input::Timer(ticket));
        }));

        let machine = Machine::new(transport, scheduler, config);
        let (state_tx, state_rx) = watch::channel(machine.snapshot());
        tokio::spawn(run_actor(machine, rx, state_tx));

        Self {
            inner: Arc::new(Inner { tx, state_rx }),
        }
    }

    /// Opens the connection, optionally with a bearer credential. Outside
    /// `Disconnected`/`Error` only the credential is recorded.
    pub fn connect(&self, credential: Option<&str>) -> Result<(), ManagerError> {
        if let Some(credential) = credential {
            require("credential", credential)?;
        }
        self.send(Command::Connect(credential.map(String::from)))
    }

    /// Closes the connection, cancels retries and drops queued operations.
    /// Room subscriptions are kept for the next connect.
    pub fn disconnect(&self) -> Result<(), ManagerError> {
        self.send(Command::Disconnect)
    }

    /// Stores a credential and authenticates now if the link is up.
    pub fn authenticate(&self, credential: &str) -> Result<(), ManagerError> {
        require("credential", credential)?;
        self.send(Command::Authenticate(credential.to_string()))
    }

    pub fn join_vessel_room(&self, vessel_id: &str) -> Result<(), ManagerError> {
        self.operation(OperationKind::JoinVessel, "vessel id", vessel_id)
    }

    pub fn leave_vessel_room(&self, vessel_id: &str) -> Result<(), ManagerError> {
        self.operation(OperationKind::LeaveVessel, "vessel id", vessel_id)
    }

    pub fn join_area_room(&self, area_id: &str) -> Result<(), ManagerError> {
        self.operation(OperationKind::JoinArea, "area id", area_id)
    }

    pub fn leave_area_room(&self, area_id: &str) -> Result<(), ManagerError> {
        self.operation(OperationKind::LeaveArea, "area id", area_id)
    }

    pub fn mark_alert_read(&self, alert_id: &str) -> Result<(), ManagerError> {
        self.operation(OperationKind::MarkAlertRead, "alert id", alert_id)
    }

    pub fn dismiss_alert(&self, alert_id: &str) -> Result<(), ManagerError> {
        self.operation(OperationKind::DismissAlert, "alert id", alert_id)
    }

    /// Registers a handler for an event name (a push topic, a lifecycle
    /// event, or `state_changed`).
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Result<Subscription, ManagerError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_handler(event, Arc::new(handler))
    }

    /// Registers a handler receiving the event data decoded as `P`.
    /// Events whose data does not decode are logged and skipped.
    pub fn subscribe_payload<P, F>(&self, event: &str, handler: F) -> Result<Subscription, ManagerError>
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) + Send + Sync + 'static,
    {
        self.subscribe_handler(event, payload_handler(handler))
    }

    /// Removes one handler, or all handlers for `event` when `id` is `None`.
    pub fn unsubscribe(&self, event: &str, id: Option<HandlerId>) -> Result<(), ManagerError> {
        self.send(Command::Unsubscribe {
            event: event.to_string(),
            id,
        })
    }

    pub fn status(&self) -> ConnectionState {
        self.inner.state_rx.borrow().status
    }

    pub fn state(&self) -> ConnectionSnapshot {
        self.inner.state_rx.borrow().clone()
    }

    pub fn rooms(&self) -> Vec<RoomSubscription> {
        self.inner.state_rx.borrow().rooms.clone()
    }

    /// Receiver that yields a new snapshot whenever the state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.state_rx.clone()
    }

    /// Resolves once every input sent before this call has been applied.
    pub async fn settled(&self) -> Result<(), ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx))?;
        rx.await.map_err(|_| ManagerError::Closed)
    }

    /// Disconnects and stops the actor. Safe to call more than once.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .inner
            .tx
            .send(Input::Command(Command::Shutdown(Some(tx))))
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    fn subscribe_handler(&self, event: &str, handler: Handler) -> Result<Subscription, ManagerError> {
        require("event name", event)?;
        let id = HandlerId::next();
        self.send(Command::Subscribe {
            event: event.to_string(),
            id,
            handler,
        })?;
        Ok(Subscription {
            event: event.to_string(),
            id,
            tx: self.inner.tx.clone(),
            active: AtomicBool::new(true),
        })
    }

    fn operation(&self, kind: OperationKind, what: &str, id: &str) -> Result<(), ManagerError> {
        require(what, id)?;
        self.send(Command::Operation(kind, id.to_string()))
    }

    fn send(&self, cmd: Command) -> Result<(), ManagerError> {
        self.inner
            .tx
            .send(Input::Command(cmd))
            .map_err(|_| ManagerError::Closed)
    }
}

/// A registered handler. Dropping it leaves the handler registered.
pub struct Subscription {
    event: String,
    id: HandlerId,
    tx: mpsc::UnboundedSender<Input>,
    active: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Removes the handler. Further calls do nothing.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            let _ = self.tx.send(Input::Command(Command::Unsubscribe {
                event: self.event.clone(),
                id: Some(self.id),
            }));
        }
    }
}

fn require(what: &str, value: &str) -> Result<(), ManagerError> {
    if value.trim().is_empty() {
        return Err(ManagerError::InvalidArgument(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}

async fn run_actor<T: Transport>(
    mut machine: Machine<T, TokioScheduler>,
    mut rx: mpsc::UnboundedReceiver<Input>,
    state_tx: watch::Sender<ConnectionSnapshot>,
) {
    while let Some(input) = rx.recv().await {
        let mut done = None;
        let mut stop = false;

        match input {
            Input::Command(Command::Shutdown(ack)) => {
                machine.disconnect();
                done = ack;
                stop = true;
            }
            Input::Command(Command::Flush(ack)) => done = Some(ack),
            Input::Command(cmd) => apply(&mut machine, cmd),
            Input::Transport(event) => machine.handle_transport_event(event),
            Input::Timer(ticket) => machine.handle_timer(ticket),
        }

        let snapshot = machine.snapshot();
        state_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        if let Some(done) = done {
            let _ = done.send(());
        }
        if stop {
            break;
        }
    }
    debug!("connection manager stopped");
}

fn apply<T: Transport>(machine: &mut Machine<T, TokioScheduler>, cmd: Command) {
    match cmd {
        Command::Connect(credential) => machine.connect(credential),
        Command::Disconnect => machine.disconnect(),
        Command::Authenticate(credential) => machine.authenticate(credential),
        Command::Operation(kind, id) => machine.submit(kind, id),
        Command::Subscribe { event, id, handler } => {
            machine.dispatcher_mut().subscribe_with_id(event, id, handler)
        }
        Command::Unsubscribe { event, id } => {
            let removed = machine.dispatcher_mut().unsubscribe(&event, id);
            debug!(%event, removed, "unsubscribed");
        }
        Command::Flush(_) | Command::Shutdown(_) => {}
    }
}
