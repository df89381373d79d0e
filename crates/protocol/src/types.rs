use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::events;

/// Kind of server-side subscription channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Vessel,
    Area,
}

impl RoomKind {
    /// Wire name of this kind (`vessel` / `area`).
    pub fn as_str(self) -> &'static str {
        match self {
            RoomKind::Vessel => "vessel",
            RoomKind::Area => "area",
        }
    }

    /// Event emitted to join a room of this kind.
    pub fn join_event(self) -> &'static str {
        match self {
            RoomKind::Vessel => events::JOIN_VESSEL_ROOM,
            RoomKind::Area => events::JOIN_AREA_ROOM,
        }
    }

    /// Event emitted to leave a room of this kind.
    pub fn leave_event(self) -> &'static str {
        match self {
            RoomKind::Vessel => events::LEAVE_VESSEL_ROOM,
            RoomKind::Area => events::LEAVE_AREA_ROOM,
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
