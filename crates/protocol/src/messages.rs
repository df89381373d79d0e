use serde::{Deserialize, Serialize};

use crate::types::RoomKind;

// --- Client → server ---

/// Data of the `authenticate` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub token: String,
}

/// Data of the room join/leave events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRequest {
    pub id: String,
}

/// Data of `mark_alert_read` and `dismiss_alert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub id: String,
}

// --- Server → client ---

/// Data of the `authenticated` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedPayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Data of the `unauthorized` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnauthorizedPayload {
    #[serde(default)]
    pub message: String,
}

/// Data of the `room_joined` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomJoinedPayload {
    pub room: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
}

/// Data of the `room_join_error` event.
///
/// Older servers omit `type`; the receiver then matches on the room id alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomJoinErrorPayload {
    pub room: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RoomKind>,
    #[serde(default)]
    pub error: String,
}
