#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use harborlink_realtime::{
    ConnectionManager, EventCallback, ManagerConfig, Outbound, RoomKind, Transport,
    TransportError, TransportEvent,
};

#[derive(Default)]
struct ScriptState {
    on_event: Option<EventCallback>,
    emitted: Vec<Outbound>,
    opens: Vec<Option<String>>,
    closes: usize,
    fail_emits: usize,
    link_down: bool,
}

/// Test-side view of a [`ScriptedTransport`]: inspect what the manager
/// sent and inject inbound events.
#[derive(Clone, Default)]
pub struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    pub fn inject(&self, event: TransportEvent) {
        let cb = self.0.lock().unwrap().on_event.clone();
        if let Some(cb) = cb {
            cb(event);
        }
    }

    pub fn emitted(&self) -> Vec<Outbound> {
        self.0.lock().unwrap().emitted.clone()
    }

    pub fn take_emitted(&self) -> Vec<Outbound> {
        std::mem::take(&mut self.0.lock().unwrap().emitted)
    }

    pub fn opens(&self) -> Vec<Option<String>> {
        self.0.lock().unwrap().opens.clone()
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }

    /// Rejects the next `n` emits with backpressure.
    pub fn fail_next_emits(&self, n: usize) {
        self.0.lock().unwrap().fail_emits = n;
    }

    /// While down, every emit fails as if the socket were gone.
    pub fn set_link_down(&self, down: bool) {
        self.0.lock().unwrap().link_down = down;
    }
}

/// Transport that records outbound frames and never touches the network.
pub struct ScriptedTransport(Script);

impl Transport for ScriptedTransport {
    fn set_event_callback(&mut self, cb: EventCallback) {
        self.0.0.lock().unwrap().on_event = Some(cb);
    }

    fn open(&mut self, credential: Option<&str>) {
        self.0.0.lock().unwrap().opens.push(credential.map(String::from));
    }

    fn close(&mut self) {
        self.0.0.lock().unwrap().closes += 1;
    }

    fn emit(&mut self, frame: Outbound) -> Result<(), TransportError> {
        let mut state = self.0.0.lock().unwrap();
        if state.link_down {
            return Err(TransportError::NotConnected);
        }
        if state.fail_emits > 0 {
            state.fail_emits -= 1;
            return Err(TransportError::Backpressure);
        }
        state.emitted.push(frame);
        Ok(())
    }
}

pub fn spawn_manager(config: ManagerConfig) -> (ConnectionManager, Script) {
    let script = Script::default();
    let mgr = ConnectionManager::spawn(ScriptedTransport(script.clone()), config);
    (mgr, script)
}

/// Lets virtual time pass (timers fire along the way), then waits for the
/// manager to apply everything that resulted.
pub async fn pass(mgr: &ConnectionManager, by: Duration) {
    tokio::time::sleep(by).await;
    mgr.settled().await.unwrap();
}

/// Injects an event and waits until the manager has applied it.
pub async fn deliver(mgr: &ConnectionManager, script: &Script, event: TransportEvent) {
    script.inject(event);
    mgr.settled().await.unwrap();
}

/// Drives `connect("tok")` through to `Authenticated`.
pub async fn connect_and_authenticate(mgr: &ConnectionManager, script: &Script) {
    mgr.connect(Some("tok")).unwrap();
    mgr.settled().await.unwrap();
    deliver(mgr, script, TransportEvent::Connect).await;
    deliver(mgr, script, TransportEvent::Authenticated { success: true }).await;
}

pub fn auth() -> Outbound {
    Outbound::Authenticate {
        token: "tok".into(),
    }
}

pub fn join(kind: RoomKind, id: &str) -> Outbound {
    Outbound::JoinRoom {
        kind,
        id: id.into(),
    }
}

pub fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}
