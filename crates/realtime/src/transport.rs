//! Transport seam: the events a transport raises and the frames it sends.

use std::sync::Arc;

use serde_json::{Value, json};

use harborlink_protocol::{
    AlertRequest, AuthenticateRequest, AuthenticatedPayload, Envelope, RoomJoinErrorPayload,
    RoomJoinedPayload, RoomKind, RoomRequest, UnauthorizedPayload, events,
};

use crate::error::TransportError;

/// Inbound event raised by a transport, either locally (lifecycle) or
/// decoded from a server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connect,
    Disconnect { reason: String },
    ConnectError { message: String },
    ReconnectAttempt { attempt: u32 },
    Reconnect { attempt: u32 },
    ReconnectError { message: String },
    ReconnectFailed,
    Authenticated { success: bool },
    Unauthorized { message: String },
    RoomJoined { room: String, kind: RoomKind },
    RoomJoinError {
        room: String,
        kind: Option<RoomKind>,
        error: String,
    },
    /// Domain push topic. The payload is opaque to the connection layer.
    Push { event: String, data: Value },
}

impl TransportEvent {
    /// Event name used for dispatch.
    pub fn name(&self) -> &str {
        match self {
            TransportEvent::Connect => events::CONNECT,
            TransportEvent::Disconnect { .. } => events::DISCONNECT,
            TransportEvent::ConnectError { .. } => events::CONNECT_ERROR,
            TransportEvent::ReconnectAttempt { .. } => events::RECONNECT_ATTEMPT,
            TransportEvent::Reconnect { .. } => events::RECONNECT,
            TransportEvent::ReconnectError { .. } => events::RECONNECT_ERROR,
            TransportEvent::ReconnectFailed => events::RECONNECT_FAILED,
            TransportEvent::Authenticated { .. } => events::AUTHENTICATED,
            TransportEvent::Unauthorized { .. } => events::UNAUTHORIZED,
            TransportEvent::RoomJoined { .. } => events::ROOM_JOINED,
            TransportEvent::RoomJoinError { .. } => events::ROOM_JOIN_ERROR,
            TransportEvent::Push { event, .. } => event,
        }
    }

    /// Event data in its wire shape, as handed to payload subscribers.
    pub fn data(&self) -> Value {
        match self {
            TransportEvent::Connect | TransportEvent::ReconnectFailed => Value::Null,
            TransportEvent::Disconnect { reason } => json!({ "reason": reason }),
            TransportEvent::ConnectError { message }
            | TransportEvent::ReconnectError { message }
            | TransportEvent::Unauthorized { message } => json!({ "message": message }),
            TransportEvent::ReconnectAttempt { attempt } | TransportEvent::Reconnect { attempt } => {
                json!({ "attempt": attempt })
            }
            TransportEvent::Authenticated { success } => json!({ "success": success }),
            TransportEvent::RoomJoined { room, kind } => json!({ "room": room, "type": kind }),
            TransportEvent::RoomJoinError { room, kind, error } => {
                json!({ "room": room, "type": kind, "error": error })
            }
            TransportEvent::Push { data, .. } => data.clone(),
        }
    }

    /// Decodes a server frame.
    ///
    /// Returns `Ok(None)` for frames carrying a lifecycle name, which only
    /// the transport itself may raise.
    pub fn from_envelope(env: &Envelope) -> Result<Option<Self>, serde_json::Error> {
        if events::is_lifecycle(&env.event) {
            return Ok(None);
        }
        let event = match env.event.as_str() {
            events::AUTHENTICATED => {
                let success = env
                    .parse_data::<AuthenticatedPayload>()?
                    .is_some_and(|p| p.success);
                TransportEvent::Authenticated { success }
            }
            events::UNAUTHORIZED => {
                let message = env
                    .parse_data::<UnauthorizedPayload>()?
                    .map(|p| p.message)
                    .unwrap_or_default();
                TransportEvent::Unauthorized { message }
            }
            events::ROOM_JOINED => match env.parse_data::<RoomJoinedPayload>()? {
                Some(p) => TransportEvent::RoomJoined {
                    room: p.room,
                    kind: p.kind,
                },
                None => return Ok(None),
            },
            events::ROOM_JOIN_ERROR => match env.parse_data::<RoomJoinErrorPayload>()? {
                Some(p) => TransportEvent::RoomJoinError {
                    room: p.room,
                    kind: p.kind,
                    error: p.error,
                },
                None => return Ok(None),
            },
            other => TransportEvent::Push {
                event: other.to_string(),
                data: env.data_value()?,
            },
        };
        Ok(Some(event))
    }
}

/// Frame the manager asks a transport to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Authenticate { token: String },
    JoinRoom { kind: RoomKind, id: String },
    LeaveRoom { kind: RoomKind, id: String },
    MarkAlertRead { id: String },
    DismissAlert { id: String },
}

impl Outbound {
    pub fn event(&self) -> &'static str {
        match self {
            Outbound::Authenticate { .. } => events::AUTHENTICATE,
            Outbound::JoinRoom { kind, .. } => kind.join_event(),
            Outbound::LeaveRoom { kind, .. } => kind.leave_event(),
            Outbound::MarkAlertRead { .. } => events::MARK_ALERT_READ,
            Outbound::DismissAlert { .. } => events::DISMISS_ALERT,
        }
    }

    /// Wraps the frame in an [`Envelope`] with a fresh id.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let event = self.event();
        match self {
            Outbound::Authenticate { token } => {
                Envelope::new(event, Some(&AuthenticateRequest { token }))
            }
            Outbound::JoinRoom { id, .. } | Outbound::LeaveRoom { id, .. } => {
                Envelope::new(event, Some(&RoomRequest { id }))
            }
            Outbound::MarkAlertRead { id } | Outbound::DismissAlert { id } => {
                Envelope::new(event, Some(&AlertRequest { id }))
            }
        }
    }
}

/// Callback receiving every inbound [`TransportEvent`].
pub type EventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// A bidirectional, message-oriented connection with its own bounded
/// reconnection loop.
///
/// Implementations report everything (lifecycle and server frames) through
/// the event callback. `emit` never blocks.
pub trait Transport: Send + 'static {
    /// Installs the callback that receives inbound events.
    fn set_event_callback(&mut self, cb: EventCallback);

    /// Opens the connection, replacing any previous one.
    fn open(&mut self, credential: Option<&str>);

    /// Closes the connection and stops reconnecting. No events follow.
    fn close(&mut self);

    /// Sends a frame on the live connection.
    fn emit(&mut self, frame: Outbound) -> Result<(), TransportError>;
}
