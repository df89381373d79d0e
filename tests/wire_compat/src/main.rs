fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use harborlink_protocol::messages::*;
    use harborlink_protocol::{Envelope, RoomKind};
    use harborlink_realtime::{Outbound, TransportEvent};
    use serde_json::{Value, json};

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn load_fixture(name: &str) -> Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Envelopes are decoded from text: `data` is kept as raw JSON.
    fn load_envelope(name: &str) -> Envelope {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to decode envelope {name}: {e}"))
    }

    fn encode(env: &Envelope) -> Value {
        let text = serde_json::to_string(env).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    /// Decodes the fixture's `data` into `T`, re-encodes it and compares the
    /// JSON values.
    fn payload_roundtrip<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let data = load_fixture(name)["data"].clone();
        let parsed: T = serde_json::from_value(data.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed).unwrap();
        assert_eq!(data, reserialized, "payload mismatch for {name}");
        parsed
    }

    /// Checks that the client builds exactly the fixture's frame, ignoring the
    /// generated id.
    fn assert_outbound(frame: Outbound, name: &str) {
        let fixture = load_fixture(name);
        let env = frame.into_envelope().unwrap();
        let encoded = encode(&env);
        assert!(encoded["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(encoded["event"], fixture["event"], "event mismatch for {name}");
        assert_eq!(encoded["data"], fixture["data"], "data mismatch for {name}");
    }

    fn inbound(name: &str) -> Option<TransportEvent> {
        TransportEvent::from_envelope(&load_envelope(name)).unwrap()
    }

    // --- Envelope ---

    #[test]
    fn envelope_roundtrip_preserves_every_fixture() {
        for entry in fs::read_dir(fixtures_dir()).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            let fixture = load_fixture(&name);
            let env = load_envelope(&name);
            assert_eq!(encode(&env), fixture, "{name}");
        }
    }

    #[test]
    fn envelope_without_data_omits_field() {
        let env: Envelope = serde_json::from_str(r#"{"id":"x","event":"server_message"}"#).unwrap();
        assert!(env.data.is_none());
        assert_eq!(encode(&env), json!({ "id": "x", "event": "server_message" }));
    }

    // --- Client to server ---

    #[test]
    fn authenticate_frame() {
        let req: AuthenticateRequest = payload_roundtrip("authenticate.json");
        assert_outbound(Outbound::Authenticate { token: req.token }, "authenticate.json");
    }

    #[test]
    fn join_vessel_room_frame() {
        payload_roundtrip::<RoomRequest>("join_vessel_room.json");
        assert_outbound(
            Outbound::JoinRoom {
                kind: RoomKind::Vessel,
                id: "IMO9321483".into(),
            },
            "join_vessel_room.json",
        );
    }

    #[test]
    fn leave_area_room_frame() {
        payload_roundtrip::<RoomRequest>("leave_area_room.json");
        assert_outbound(
            Outbound::LeaveRoom {
                kind: RoomKind::Area,
                id: "NLRTM-anchorage".into(),
            },
            "leave_area_room.json",
        );
    }

    #[test]
    fn alert_frames() {
        payload_roundtrip::<AlertRequest>("mark_alert_read.json");
        payload_roundtrip::<AlertRequest>("dismiss_alert.json");
        assert_outbound(
            Outbound::MarkAlertRead {
                id: "alert-20417".into(),
            },
            "mark_alert_read.json",
        );
        assert_outbound(
            Outbound::DismissAlert {
                id: "alert-20418".into(),
            },
            "dismiss_alert.json",
        );
    }

    // --- Server to client ---

    #[test]
    fn authenticated_frame() {
        let payload: AuthenticatedPayload = payload_roundtrip("authenticated.json");
        assert_eq!(payload.user_id.as_deref(), Some("usr_4821"));
        assert_eq!(
            inbound("authenticated.json"),
            Some(TransportEvent::Authenticated { success: true })
        );
    }

    #[test]
    fn unauthorized_frame() {
        payload_roundtrip::<UnauthorizedPayload>("unauthorized.json");
        assert_eq!(
            inbound("unauthorized.json"),
            Some(TransportEvent::Unauthorized {
                message: "token expired".into()
            })
        );
    }

    #[test]
    fn room_joined_frame() {
        payload_roundtrip::<RoomJoinedPayload>("room_joined.json");
        assert_eq!(
            inbound("room_joined.json"),
            Some(TransportEvent::RoomJoined {
                room: "IMO9321483".into(),
                kind: RoomKind::Vessel,
            })
        );
    }

    #[test]
    fn room_join_error_frames() {
        payload_roundtrip::<RoomJoinErrorPayload>("room_join_error.json");
        payload_roundtrip::<RoomJoinErrorPayload>("room_join_error_untyped.json");
        assert_eq!(
            inbound("room_join_error.json"),
            Some(TransportEvent::RoomJoinError {
                room: "NLRTM-anchorage".into(),
                kind: Some(RoomKind::Area),
                error: "subscription limit reached".into(),
            })
        );
        assert_eq!(
            inbound("room_join_error_untyped.json"),
            Some(TransportEvent::RoomJoinError {
                room: "IMO9321483".into(),
                kind: None,
                error: "forbidden".into(),
            })
        );
    }

    #[test]
    fn push_payload_is_passed_through_untouched() {
        let fixture = load_fixture("vessel_position_update.json");
        let Some(TransportEvent::Push { event, data }) = inbound("vessel_position_update.json")
        else {
            panic!("expected a push event");
        };
        assert_eq!(event, "vessel_position_update");
        assert_eq!(data, fixture["data"]);
    }
}
