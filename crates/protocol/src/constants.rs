use std::time::Duration;

/// Time to wait for a pong response (or any incoming frame).
///
/// Acts as a read deadline: if *nothing* arrives within this window the
/// connection is considered dead and the transport starts reconnecting.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send keepalive pings (must be well below [`WS_PONG_WAIT`]).
pub const WS_PING_PERIOD: Duration = Duration::from_secs(25);

/// Maximum inbound message size in bytes (4 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Capacity of the outbound frame buffer between the client and the write pump.
pub const WS_OUTBOUND_BUFFER: usize = 256;

/// Longest a single frame write (including the final close frame) may take
/// before the socket is treated as stalled.
pub const WS_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Event names carried in the `event` field of an [`Envelope`](crate::Envelope).
pub mod events {
    // Connection lifecycle (raised locally by the transport, never sent by the server).
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
    pub const RECONNECT_ATTEMPT: &str = "reconnect_attempt";
    pub const RECONNECT: &str = "reconnect";
    pub const RECONNECT_ERROR: &str = "reconnect_error";
    pub const RECONNECT_FAILED: &str = "reconnect_failed";

    // Authentication
    pub const AUTHENTICATE: &str = "authenticate";
    pub const AUTHENTICATED: &str = "authenticated";
    pub const UNAUTHORIZED: &str = "unauthorized";

    // Rooms
    pub const JOIN_VESSEL_ROOM: &str = "join_vessel_room";
    pub const LEAVE_VESSEL_ROOM: &str = "leave_vessel_room";
    pub const JOIN_AREA_ROOM: &str = "join_area_room";
    pub const LEAVE_AREA_ROOM: &str = "leave_area_room";
    pub const ROOM_JOINED: &str = "room_joined";
    pub const ROOM_JOIN_ERROR: &str = "room_join_error";

    // Alerts
    pub const MARK_ALERT_READ: &str = "mark_alert_read";
    pub const DISMISS_ALERT: &str = "dismiss_alert";

    // Domain push topics (payloads are opaque to the connection layer).
    pub const VESSEL_POSITION_UPDATE: &str = "vessel_position_update";
    pub const VESSEL_STATUS_CHANGE: &str = "vessel_status_change";
    pub const VESSEL_ALERT: &str = "vessel_alert";
    pub const AREA_ALERT: &str = "area_alert";
    pub const AREA_VESSEL_ENTERED: &str = "area_vessel_entered";
    pub const AREA_VESSEL_EXITED: &str = "area_vessel_exited";
    pub const ALERT_NOTIFICATION: &str = "alert_notification";
    pub const CREDIT_BALANCE_UPDATE: &str = "credit_balance_update";
    pub const SERVER_MESSAGE: &str = "server_message";

    // Raised locally on every connection state transition.
    pub const STATE_CHANGED: &str = "state_changed";

    /// Lifecycle names the server is not allowed to push.
    pub const LIFECYCLE: &[&str] = &[
        CONNECT,
        DISCONNECT,
        CONNECT_ERROR,
        RECONNECT_ATTEMPT,
        RECONNECT,
        RECONNECT_ERROR,
        RECONNECT_FAILED,
        STATE_CHANGED,
    ];

    /// Every known domain push topic.
    pub const PUSH_TOPICS: &[&str] = &[
        VESSEL_POSITION_UPDATE,
        VESSEL_STATUS_CHANGE,
        VESSEL_ALERT,
        AREA_ALERT,
        AREA_VESSEL_ENTERED,
        AREA_VESSEL_EXITED,
        ALERT_NOTIFICATION,
        CREDIT_BALANCE_UPDATE,
        SERVER_MESSAGE,
    ];

    /// Returns `true` for names reserved for locally raised lifecycle events.
    pub fn is_lifecycle(name: &str) -> bool {
        LIFECYCLE.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_period_below_pong_wait() {
        assert!(WS_PING_PERIOD < WS_PONG_WAIT);
    }

    #[test]
    fn lifecycle_names_are_reserved() {
        assert!(events::is_lifecycle("connect"));
        assert!(events::is_lifecycle("reconnect_failed"));
        assert!(events::is_lifecycle("state_changed"));
        assert!(!events::is_lifecycle("area_alert"));
        assert!(!events::is_lifecycle("authenticated"));
    }

    #[test]
    fn push_topics_do_not_overlap_lifecycle() {
        for topic in events::PUSH_TOPICS {
            assert!(!events::is_lifecycle(topic), "{topic} is reserved");
        }
    }
}
