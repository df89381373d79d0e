//! Public types for the connection manager.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harborlink_protocol::RoomKind;
use harborlink_protocol::events;

/// Connection phase of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport is open.
    Disconnected,
    /// Transport open requested, waiting for `connect`.
    Connecting,
    /// Network-connected but not authenticated.
    Connected,
    /// `authenticate` sent, waiting for the server's verdict.
    Authenticating,
    /// Authenticated; operations are sent directly.
    Authenticated,
    /// Connection lost, the transport is retrying.
    Reconnecting,
    /// Connect failed or reconnection gave up. Terminal until `connect()`.
    Error,
}

impl ConnectionState {
    /// Returns `true` when the transport link is up (authenticated or not).
    pub fn is_link_up(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected
                | ConnectionState::Authenticating
                | ConnectionState::Authenticated
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key of a room: `"{kind}:{room}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(kind: RoomKind, room: &str) -> Self {
        Self(format!("{kind}:{room}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A room the client wants to be joined to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSubscription {
    pub room: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    pub joined_at: DateTime<Utc>,
}

impl RoomSubscription {
    pub fn new(kind: RoomKind, room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            kind,
            joined_at: Utc::now(),
        }
    }

    pub fn key(&self) -> RoomKey {
        RoomKey::new(self.kind, &self.room)
    }
}

/// Operation a caller can issue before the connection is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    JoinVessel,
    JoinArea,
    LeaveVessel,
    LeaveArea,
    MarkAlertRead,
    DismissAlert,
}

impl OperationKind {
    pub fn join(kind: RoomKind) -> Self {
        match kind {
            RoomKind::Vessel => OperationKind::JoinVessel,
            RoomKind::Area => OperationKind::JoinArea,
        }
    }

    pub fn leave(kind: RoomKind) -> Self {
        match kind {
            RoomKind::Vessel => OperationKind::LeaveVessel,
            RoomKind::Area => OperationKind::LeaveArea,
        }
    }

    /// Room kind for join/leave operations, `None` for alert operations.
    pub fn room_kind(self) -> Option<RoomKind> {
        match self {
            OperationKind::JoinVessel | OperationKind::LeaveVessel => Some(RoomKind::Vessel),
            OperationKind::JoinArea | OperationKind::LeaveArea => Some(RoomKind::Area),
            OperationKind::MarkAlertRead | OperationKind::DismissAlert => None,
        }
    }

    /// Event name this operation is emitted as.
    pub fn event(self) -> &'static str {
        match self {
            OperationKind::JoinVessel => events::JOIN_VESSEL_ROOM,
            OperationKind::JoinArea => events::JOIN_AREA_ROOM,
            OperationKind::LeaveVessel => events::LEAVE_VESSEL_ROOM,
            OperationKind::LeaveArea => events::LEAVE_AREA_ROOM,
            OperationKind::MarkAlertRead => events::MARK_ALERT_READ,
            OperationKind::DismissAlert => events::DISMISS_ALERT,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event())
    }
}

/// An operation waiting for authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub kind: OperationKind,
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
    /// Failed emit attempts so far.
    pub retries: u32,
}

impl QueuedOperation {
    pub fn new(kind: OperationKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            enqueued_at: Utc::now(),
            retries: 0,
        }
    }
}

/// Point-in-time view of the manager, as returned by `state()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub status: ConnectionState,
    pub is_authenticated: bool,
    pub reconnect_attempts: u32,
    pub rooms: Vec<RoomSubscription>,
    /// Rooms whose joins the server kept rejecting. They stay registered
    /// but are not rejoined until requested again.
    pub given_up_rooms: Vec<RoomSubscription>,
    pub queued_operation_count: usize,
    pub auth_retry_count: u32,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionState::Disconnected,
            is_authenticated: false,
            reconnect_attempts: 0,
            rooms: Vec::new(),
            given_up_rooms: Vec::new(),
            queued_operation_count: 0,
            auth_retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_key_format() {
        assert_eq!(RoomKey::new(RoomKind::Vessel, "V1").as_str(), "vessel:V1");
        assert_eq!(RoomKey::new(RoomKind::Area, "A2").to_string(), "area:A2");
        assert_ne!(
            RoomKey::new(RoomKind::Vessel, "X"),
            RoomKey::new(RoomKind::Area, "X")
        );
    }

    #[test]
    fn subscription_key_matches_kind_and_room() {
        let sub = RoomSubscription::new(RoomKind::Area, "A2");
        assert_eq!(sub.key(), RoomKey::new(RoomKind::Area, "A2"));
    }

    #[test]
    fn operation_kind_room_mapping() {
        assert_eq!(OperationKind::join(RoomKind::Vessel), OperationKind::JoinVessel);
        assert_eq!(OperationKind::leave(RoomKind::Area), OperationKind::LeaveArea);
        assert_eq!(OperationKind::LeaveVessel.room_kind(), Some(RoomKind::Vessel));
        assert_eq!(OperationKind::DismissAlert.room_kind(), None);
        assert_eq!(OperationKind::MarkAlertRead.event(), "mark_alert_read");
    }

    #[test]
    fn link_up_states() {
        assert!(ConnectionState::Connected.is_link_up());
        assert!(ConnectionState::Authenticating.is_link_up());
        assert!(ConnectionState::Authenticated.is_link_up());
        assert!(!ConnectionState::Reconnecting.is_link_up());
        assert!(!ConnectionState::Error.is_link_up());
    }

    #[test]
    fn connection_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Authenticating).unwrap(),
            "\"authenticating\""
        );
    }

    #[test]
    fn default_snapshot_is_disconnected() {
        let snap = ConnectionSnapshot::default();
        assert_eq!(snap.status, ConnectionState::Disconnected);
        assert!(!snap.is_authenticated);
        assert!(snap.rooms.is_empty());
    }
}
